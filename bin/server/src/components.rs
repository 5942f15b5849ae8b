//! Shared layout and access-control components.

use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_router::NavigateOptions;
use leptos_router::hooks::use_navigate;
use scholar_index_session::{ClientRouteGuard, GuardStatus, Role};

use crate::session::use_session;

/// Full-viewport loading state.
#[component]
pub fn FullPageLoader() -> impl IntoView {
    view! {
        <div class="full-page-loader" role="status" aria-live="polite">
            <div class="spinner"></div>
            <span class="visually-hidden">"Loading..."</span>
        </div>
    }
}

/// Renders `children` only once the session has been checked.
///
/// Until the persisted session is applied the loader is shown, and server
/// rendering always emits the loader. Visitors who are signed out or hold
/// the wrong role are sent away without the children ever rendering.
/// An empty `roles` list admits any signed-in account.
#[component]
pub fn ProtectedRoute(#[prop(optional)] roles: Vec<Role>, children: ChildrenFn) -> impl IntoView {
    let session = use_session();
    let guard = ClientRouteGuard::new(roles, session.paths());
    let status = RwSignal::new(GuardStatus::Checking);
    let navigate = use_navigate();

    // Re-check whenever the identity changes, e.g. after a remote logout.
    Effect::new(move |_| {
        session.track();
        let Some(store) = session.store() else {
            return;
        };
        let guard = guard.clone();
        spawn_local(async move {
            status.set(guard.check(&store).await);
        });
    });

    Effect::new(move |_| {
        if let GuardStatus::Redirect(target) = status.get() {
            navigate(
                &target,
                NavigateOptions {
                    replace: true,
                    ..Default::default()
                },
            );
        }
    });

    view! {
        <Show
            when=move || status.with(|s| *s == GuardStatus::Allowed)
            fallback=|| view! { <FullPageLoader/> }
        >
            {children()}
        </Show>
    }
}

/// Header with navigation and the account menu.
#[component]
pub fn Header() -> impl IntoView {
    let session = use_session();

    view! {
        <header class="header">
            <div class="header-left">
                <a href="/" class="logo">"scholar-index"</a>
                <a href="/about">"About"</a>
            </div>
            <div class="header-right">
                {move || match session.identity() {
                    Some(identity) => view! { <AccountMenu role=identity.role() name=identity.display_name().to_string()/> }.into_any(),
                    None => view! { <a href="/login" class="login-button">"Sign in"</a> }.into_any(),
                }}
            </div>
        </header>
    }
}

#[component]
fn AccountMenu(role: Role, name: String) -> impl IntoView {
    let session = use_session();
    let on_logout = move |_| spawn_local(session.logout());

    view! {
        <div class="user-menu">
            <span class="user-name">{name}</span>
            <div class="user-dropdown">
                <a href=role.landing_path()>"Dashboard"</a>
                <button class="link-button" on:click=on_logout>"Sign out"</button>
            </div>
        </div>
    }
}
