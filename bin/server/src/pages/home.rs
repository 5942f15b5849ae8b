//! Public pages.

use leptos::prelude::*;

use crate::session::use_session;

/// The home page component.
#[component]
pub fn HomePage() -> impl IntoView {
    let session = use_session();

    view! {
        <div class="home-page">
            <h1>"scholar-index"</h1>
            <p>"Indexing research papers, authors, institutions and journals."</p>
            {move || match session.identity() {
                Some(identity) => {
                    let greeting = format!("Welcome back, {}!", identity.display_name());
                    view! {
                        <div>
                            <p>{greeting}</p>
                            <a href=identity.role().landing_path() class="cta-button">"Open dashboard"</a>
                        </div>
                    }.into_any()
                }
                None => view! {
                    <a href="/login" class="cta-button">"Sign in"</a>
                }.into_any(),
            }}
        </div>
    }
}

/// About page.
#[component]
pub fn AboutPage() -> impl IntoView {
    view! {
        <div class="about-page">
            <h1>"About scholar-index"</h1>
            <p>"scholar-index is a research-indexing platform. Authors publish their work, institutions manage their affiliated authors and journals, and administrators curate the index."</p>
        </div>
    }
}

/// Shown when a signed-in account opens a panel its role does not grant.
#[component]
pub fn UnauthorizedPage() -> impl IntoView {
    let session = use_session();

    view! {
        <div class="unauthorized-page">
            <h1>"Access denied"</h1>
            <p>"Your account does not have access to this panel."</p>
            {move || {
                let target = session
                    .identity()
                    .map_or("/", |identity| identity.role().landing_path());
                view! { <a href=target class="cta-button">"Go to your dashboard"</a> }
            }}
        </div>
    }
}
