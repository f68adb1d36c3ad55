//! Real-time hub for a supervisor/student thread: chat, WebRTC signaling relay
//! and call bookkeeping, plus the HTTP endpoints the browser client needs
//! around it.

mod calls;
mod error;
mod history;
mod hub;
mod ice;
mod msg;
mod signal;
mod upload;
mod ws;

pub mod groups;
pub mod protocol;
pub mod throttle;

pub use calls::spawn_stale_call_sweeper;
pub use error::HubError;
pub use history::{HistoryItem, clamp_take};
pub use hub::{Caller, CommHub};
pub use msg::{MAX_MESSAGE_CHARS, normalize_text};
pub use upload::UploadResponse;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::{AppState, config::Config, session::require_session};

// room for the multipart framing and the small text fields
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(config: &Config) -> Router<AppState> {
    let uploads = &config.uploads;

    // stored attachments go to signed-in users only
    let stored_files = Router::new()
        .nest_service(&uploads.public_path, ServeDir::new(&uploads.dir))
        .route_layer(middleware::from_fn(require_session));

    Router::new()
        .route("/hubs/comm", get(ws::comm_ws))
        .route("/api/threads/{thread_id}/messages", get(history::thread_history))
        .route(
            "/api/attachments",
            post(upload::upload_attachment).layer(DefaultBodyLimit::max(uploads.max_bytes + FORM_OVERHEAD_BYTES)),
        )
        .route("/api/ice-servers", get(ice::ice_servers))
        .merge(stored_files)
}
