pub mod msg;
pub mod relay;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use relay::{ConnId, Outbox, Presence, Relay};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::relay_ws))
}
