use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use realtime_api::config::Config;
use realtime_api::directory::http::HttpDirectory;
use realtime_api::directory::{MemoryDirectory, UserDirectory};
use realtime_api::gateway::presence::spawn_presence_writer;
use realtime_api::gateway::Gateway;
use realtime_api::AppState;

/// How long pending presence writes may take to flush after shutdown.
const PRESENCE_FLUSH_WINDOW: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let directory: Arc<dyn UserDirectory> = match &config.directory_url {
        Some(url) => {
            tracing::info!(directory_url = %url, "using HTTP user directory");
            Arc::new(HttpDirectory::new(url, &config.internal_api_key))
        }
        None => {
            tracing::warn!("DIRECTORY_URL not set, using in-memory user directory");
            Arc::new(MemoryDirectory::new())
        }
    };

    let cors = cors_layer(config.client_url.as_deref());

    let (state, presence_writes) = AppState::new(config, directory.clone());
    let writer = spawn_presence_writer(presence_writes, directory);
    let gateway = state.gateway.clone();

    let app = Router::new()
        .merge(realtime_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "realtime-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(gateway.clone()))
        .await
        .expect("server error");

    // The gateway owns the presence sender; dropping the last handle lets the
    // writer drain and finish.
    drop(gateway);
    if tokio::time::timeout(PRESENCE_FLUSH_WINDOW, writer).await.is_err() {
        tracing::warn!("presence writer did not flush before shutdown");
    }
}

fn cors_layer(client_url: Option<&str>) -> CorsLayer {
    let origin = match client_url.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(_)) => {
            tracing::warn!("CLIENT_URL is not a valid origin, allowing any origin");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal(gateway: Arc<Gateway>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
    gateway.shutdown();
}
