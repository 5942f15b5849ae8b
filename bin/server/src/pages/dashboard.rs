//! Role dashboards.
//!
//! Each dashboard sits behind a `ProtectedRoute` and shows the panel
//! summary fetched on the server with the visitor's cookies. The author
//! dashboard also lists papers through the browser HTTP client.

use leptos::prelude::*;
use scholar_index_session::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::components::ProtectedRoute;
use crate::session::use_session;

/// Headline numbers for a panel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryData {
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
}

/// Backend path of the summary for a panel.
#[must_use]
pub fn summary_path(role: Role) -> String {
    format!("/{}/summary", role.as_str())
}

/// Server function returning the summary for a panel.
#[server]
pub async fn panel_summary(role: Role) -> Result<SummaryData, ServerFnError> {
    use scholar_index_session::ApiRequest;

    crate::backend::fetch_json(ApiRequest::get(summary_path(role))).await
}

#[component]
fn SummaryPanel(role: Role) -> impl IntoView {
    let summary = Resource::new(|| (), move |_| panel_summary(role));

    view! {
        <Suspense fallback=move || view! { <p>"Loading..."</p> }>
            {move || {
                summary.get().map(|result| match result {
                    Ok(summary) => view! {
                        <section class="summary">
                            {summary.headline.map(|h| view! { <p class="headline">{h}</p> })}
                            <div class="stats">
                                {summary.counts.into_iter().map(|(label, count)| view! {
                                    <div class="stat">
                                        <span class="stat-value">{count}</span>
                                        <span class="stat-label">{label}</span>
                                    </div>
                                }).collect_view()}
                            </div>
                        </section>
                    }.into_any(),
                    Err(e) => view! {
                        <p class="error">"Failed to load summary: " {e.to_string()}</p>
                    }.into_any(),
                })
            }}
        </Suspense>
    }
}

/// Administrator dashboard.
#[component]
pub fn AdminDashboard() -> impl IntoView {
    view! {
        <ProtectedRoute roles=vec![Role::Admin]>
            <div class="dashboard">
                <h1>"Administration"</h1>
                <SummaryPanel role=Role::Admin/>
            </div>
        </ProtectedRoute>
    }
}

/// Institution dashboard.
#[component]
pub fn InstitutionDashboard() -> impl IntoView {
    view! {
        <ProtectedRoute roles=vec![Role::Institution]>
            <div class="dashboard">
                <h1>"Institution"</h1>
                <SummaryPanel role=Role::Institution/>
            </div>
        </ProtectedRoute>
    }
}

/// A paper as listed on the author dashboard.
#[derive(Clone, Debug, Deserialize)]
pub struct PaperSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Author dashboard.
#[component]
pub fn AuthorDashboard() -> impl IntoView {
    view! {
        <ProtectedRoute roles=vec![Role::Author]>
            <div class="dashboard">
                <h1>"My research"</h1>
                <SummaryPanel role=Role::Author/>
                <PaperList/>
            </div>
        </ProtectedRoute>
    }
}

#[component]
fn PaperList() -> impl IntoView {
    let session = use_session();
    let papers = LocalResource::new(move || async move {
        match session.client() {
            Some(client) => client
                .get_json::<Vec<PaperSummary>>("/author/papers")
                .await
                .map_err(|e| e.user_message().to_string()),
            None => Ok(Vec::new()),
        }
    });

    view! {
        <section class="papers">
            <h2>"Papers"</h2>
            <Suspense fallback=move || view! { <p>"Loading..."</p> }>
                {move || {
                    papers.get().map(|result| match result {
                        Ok(papers) if papers.is_empty() => view! {
                            <p>"No papers yet."</p>
                        }.into_any(),
                        Ok(papers) => view! {
                            <ul class="paper-list">
                                {papers.into_iter().map(|paper| view! {
                                    <li>
                                        <span class="paper-title">{paper.title}</span>
                                        {paper.status.map(|s| view! { <span class="badge">{s}</span> })}
                                    </li>
                                }).collect_view()}
                            </ul>
                        }.into_any(),
                        Err(message) => view! { <p class="error">{message}</p> }.into_any(),
                    })
                }}
            </Suspense>
        </section>
    }
}
