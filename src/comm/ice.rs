use std::sync::Arc;

use axum::{Json, debug_handler, extract::State};
use serde::Serialize;
use tower_sessions::Session;

use crate::{
    AppResult, AppState,
    config::{Config, IceServer},
    session::require_user,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceConfig {
    pub ice_servers: Vec<IceServer>,
}

#[debug_handler(state = AppState)]
pub async fn ice_servers(State(config): State<Arc<Config>>, session: Session) -> AppResult<Json<IceConfig>> {
    require_user(&session).await?;

    Ok(Json(IceConfig {
        ice_servers: config.ice_servers.clone(),
    }))
}
