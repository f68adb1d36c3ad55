use axum::{extract::Request, middleware::Next, response::Response};
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer, cookie::SameSite};

use crate::{AppError, AppResult, config::Config};

/// Session key under which the login flow stores the opaque user identity.
pub const USER_ID: &str = "user_id";

pub async fn current_user(session: &Session) -> Result<Option<String>, tower_sessions::session::Error> {
    session.get::<String>(USER_ID).await
}

pub async fn require_user(session: &Session) -> AppResult<String> {
    current_user(session).await?.ok_or(AppError::Unauthenticated)
}

/// Route middleware refusing requests that carry no signed-in user.
pub async fn require_session(session: Session, req: Request, next: Next) -> AppResult<Response> {
    require_user(&session).await?;
    Ok(next.run(req).await)
}

pub fn session_layer(config: &Config) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.session.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session.idle_minutes)))
}
