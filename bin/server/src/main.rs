#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() {
    use axum::Router;
    use leptos::prelude::*;
    use leptos_axum::{LeptosRoutes, generate_route_list};
    use scholar_index_server::{
        app::App, backend::BackendState, config::ServerConfig, edge::EdgeState,
        edge::edge_guard,
    };
    use scholar_index_session::{EdgeGuard, RoutePolicy};
    use std::sync::Arc;
    use tower_http::services::ServeDir;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!(api_base_url = %config.api_base_url, "Loaded configuration");

    let backend = Arc::new(BackendState::new(&config));
    let edge = EdgeState::new(
        EdgeGuard::new(RoutePolicy::default(), config.routes.clone()),
        config.session.access_cookie.clone(),
    );

    let conf = get_configuration(None).expect("failed to get leptos configuration");
    let leptos_options = conf.leptos_options;
    let addr = leptos_options.site_addr;
    let routes = generate_route_list(App);

    // Endpoints and guard routes reach the browser through the page.
    match config.browser_config_json() {
        Ok(json) => {
            let _ = BROWSER_CONFIG.set(json);
        }
        Err(e) => {
            tracing::warn!(error = %e, "browser falls back to default client configuration");
        }
    }

    let app = Router::new()
        .leptos_routes_with_context(
            &leptos_options,
            routes,
            {
                let guard_paths = config.routes.clone();
                move || provide_context(guard_paths.clone())
            },
            {
                let leptos_options = leptos_options.clone();
                move || shell(leptos_options.clone())
            },
        )
        .fallback(leptos_axum::file_and_error_handler::<LeptosOptions, _>(
            shell,
        ))
        .nest_service("/pkg", ServeDir::new("target/site/pkg"))
        // Backend access for server functions
        .layer(axum::Extension(backend))
        // Role gating before anything renders
        .layer(axum::middleware::from_fn_with_state(edge, edge_guard))
        .with_state(leptos_options);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[cfg(feature = "ssr")]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

/// Client configuration JSON written into every page.
#[cfg(feature = "ssr")]
static BROWSER_CONFIG: std::sync::OnceLock<String> = std::sync::OnceLock::new();

#[cfg(feature = "ssr")]
fn shell(options: leptos::prelude::LeptosOptions) -> impl leptos::prelude::IntoView {
    use leptos::prelude::*;
    use leptos_meta::*;
    use scholar_index_server::app::App;

    let browser_config = BROWSER_CONFIG.get().cloned();

    view! {
        <!DOCTYPE html>
        <html lang="en">
            <head>
                <meta charset="utf-8"/>
                <meta name="viewport" content="width=device-width, initial-scale=1"/>
                {browser_config.map(|json| view! { <meta name="scholar-index-config" content=json/> })}
                <link rel="stylesheet" href="/pkg/scholar-index.css"/>
                <AutoReload options=options.clone()/>
                <HydrationScripts options/>
                <MetaTags/>
            </head>
            <body>
                <App/>
            </body>
        </html>
    }
}

#[cfg(not(feature = "ssr"))]
fn main() {
    // This main function is only used for WASM builds
    // The actual hydration happens in lib.rs
}
