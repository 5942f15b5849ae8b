//! Main Leptos application component and routing.

use leptos::prelude::*;
use leptos_meta::{Title, provide_meta_context};
use leptos_router::{
    components::{Route, Router, Routes},
    path,
};

use crate::components::Header;
use crate::pages::{
    AboutPage, AdminDashboard, AuthorDashboard, HomePage, InstitutionDashboard, LoginPage,
    SignupPage, UnauthorizedPage,
};
use crate::session::SessionContext;

/// The main application component.
#[component]
pub fn App() -> impl IntoView {
    provide_meta_context();
    let session = SessionContext::provide();

    // Effects only run in the browser, after hydration.
    Effect::new(move |_| session.rehydrate());

    view! {
        <Title text="scholar-index"/>
        <Router>
            <Header/>
            <main class="container">
                <Routes fallback=|| "Page not found.".into_view()>
                    <Route path=path!("/") view=HomePage/>
                    <Route path=path!("/about") view=AboutPage/>
                    <Route path=path!("/login") view=LoginPage/>
                    <Route path=path!("/signup") view=SignupPage/>
                    <Route path=path!("/unauthorized") view=UnauthorizedPage/>
                    <Route path=path!("/admin/dashboard") view=AdminDashboard/>
                    <Route path=path!("/institution/dashboard") view=InstitutionDashboard/>
                    <Route path=path!("/author/dashboard") view=AuthorDashboard/>
                </Routes>
            </main>
        </Router>
    }
}
