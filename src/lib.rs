pub mod appresult;
pub mod config;
pub mod logging;
pub mod rooms;

use std::future::Future;

use axum::{extract::FromRef, http::Method, Router};
use tokio::net::TcpListener;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing::info;

pub use appresult::{AppError, AppResult};
use config::{AllowedOrigins, Config};
use rooms::Relay;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub relay: Relay,
}

pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
    match origins {
        AllowedOrigins::Any => cors.allow_origin(Any),
        AllowedOrigins::List(origins) => cors.allow_origin(origins.clone()),
    }
}

pub fn app(relay: Relay, config: &Config) -> Router {
    Router::new()
        .merge(rooms::router())
        .with_state(AppState { relay })
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve_until<F>(listener: TcpListener, relay: Relay, config: &Config, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "relay listening");
    axum::serve(listener, app(relay, config))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
