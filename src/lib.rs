pub mod attachment;
pub mod comm;
pub mod config;
pub mod db;
pub mod gate;
pub mod session;

use std::sync::Arc;

use axum::{
    extract::{FromRef, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;

pub use comm::router;

use crate::{comm::CommHub, config::Config};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: CommHub,
    pub config: Arc<Config>,
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    Unauthenticated,
    Forbidden,
    /// The request itself was refused; the message goes back to the client.
    Rejected(StatusCode, String),
    Internal(anyhow::Error),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Rejected(StatusCode::BAD_REQUEST, msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated").into_response(),
            Self::Forbidden => (StatusCode::FORBIDDEN, "not allowed").into_response(),
            Self::Rejected(status, msg) => (status, msg).into_response(),
            Self::Internal(err) => {
                tracing::error!(error = %err, backtrace = %err.backtrace(), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::Rejected(err.status(), err.body_text())
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(std::io::Error);
