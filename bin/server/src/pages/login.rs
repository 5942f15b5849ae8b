//! Sign-in and sign-up pages.

use leptos::ev::SubmitEvent;
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_router::hooks::{use_navigate, use_query_map};
use scholar_index_session::{LoginRequest, Role};

use crate::session::use_session;

/// Where to go after signing in.
///
/// Only same-site paths from the `redirect` parameter are honoured;
/// anything else lands on the role's dashboard.
#[must_use]
pub fn post_login_target(redirect: Option<&str>, role: Role) -> String {
    match redirect {
        Some(path) if is_same_site_path(path) => path.to_string(),
        _ => role.landing_path().to_string(),
    }
}

// Browsers treat `\` like `/`, so `/\host` is protocol-relative too.
fn is_same_site_path(path: &str) -> bool {
    let mut chars = path.chars();
    chars.next() == Some('/') && !matches!(chars.next(), Some('/' | '\\'))
}

/// Login page.
#[component]
pub fn LoginPage() -> impl IntoView {
    let session = use_session();
    let query = use_query_map();
    let navigate = use_navigate();

    let email = RwSignal::new(String::new());
    let password = RwSignal::new(String::new());
    let error = RwSignal::new(Option::<String>::None);
    let pending = RwSignal::new(false);

    let on_submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        let credentials = LoginRequest::new(email.get_untracked(), password.get_untracked());
        let redirect = query.with_untracked(|q| q.get("redirect"));
        let navigate = navigate.clone();
        pending.set(true);
        spawn_local(async move {
            match session.login(credentials).await {
                Ok(identity) => {
                    error.set(None);
                    let target = post_login_target(redirect.as_deref(), identity.role());
                    navigate(&target, Default::default());
                }
                Err(message) => error.set(Some(message)),
            }
            pending.set(false);
        });
    };

    view! {
        <div class="login-page">
            <form class="login-box" on:submit=on_submit>
                <h1>"Sign in to scholar-index"</h1>
                {move || error.get().map(|msg| view! { <p class="error">{msg}</p> })}
                <label for="email">"Email"</label>
                <input id="email" type="email" autocomplete="username" required bind:value=email/>
                <label for="password">"Password"</label>
                <input
                    id="password"
                    type="password"
                    autocomplete="current-password"
                    required
                    bind:value=password
                />
                <button type="submit" class="login-button" disabled=move || pending.get()>
                    {move || if pending.get() { "Signing in..." } else { "Sign in" }}
                </button>
                <p>"No account? " <a href="/signup">"Sign up"</a></p>
            </form>
        </div>
    }
}

/// Sign-up page.
#[component]
pub fn SignupPage() -> impl IntoView {
    view! {
        <div class="login-page">
            <div class="login-box">
                <h1>"Join scholar-index"</h1>
                <p>"Author accounts are created by your institution. Institutions can request access from the platform team."</p>
                <a href="/login" class="login-button">"Back to sign in"</a>
            </div>
        </div>
    }
}
