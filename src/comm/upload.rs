//! `POST /api/attachments`
//!
//! Stores one file under `uploads.dir` and hands back a token the client then
//! sends as an ordinary chat message. Nothing here touches the hub.

use std::{path::PathBuf, sync::Arc};

use axum::{
    Json, debug_handler,
    extract::{Multipart, State, multipart::Field},
    http::StatusCode,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::{fs, io::AsyncWriteExt};
use tower_sessions::Session;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    AppError, AppResult, AppState,
    attachment::Attachment,
    config::{Config, UploadSettings},
    db::ThreadId,
    gate,
    session::require_user,
};

const MAX_NAME_CHARS: usize = 120;
const MAX_EXT_CHARS: usize = 10;
const FALLBACK_NAME: &str = "file";
const FALLBACK_EXT: &str = "bin";

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub attachment: Attachment,
    pub token: String,
}

#[derive(Debug)]
struct StoredFile {
    path: PathBuf,
    stored_name: String,
    original_name: String,
    content_type: String,
    size: u64,
}

#[derive(Debug, Default)]
struct UploadForm {
    thread_id: Option<ThreadId>,
    file: Option<StoredFile>,
    duration_ms: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
}

impl UploadForm {
    async fn discard(self) {
        if let Some(file) = self.file {
            remove_quietly(&file.path).await;
        }
    }
}

#[debug_handler(state = AppState)]
pub async fn upload_attachment(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    session: Session,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let user_id = require_user(&session).await?;

    let mut form = UploadForm::default();
    if let Err(e) = read_form(&mut multipart, &db_pool, &user_id, &config.uploads, &mut form).await {
        form.discard().await;
        return Err(e);
    }

    // only ever set after the gate admitted the caller
    let Some(thread_id) = form.thread_id else {
        form.discard().await;
        return Err(AppError::bad_request("missing threadId"));
    };

    let UploadForm {
        file,
        duration_ms,
        width,
        height,
        ..
    } = form;
    let Some(file) = file else {
        return Err(AppError::bad_request("missing file"));
    };

    let attachment = Attachment {
        content_type: file.content_type,
        url: public_url(&config.uploads.public_path, &file.stored_name),
        original_name: file.original_name,
        size: file.size,
        duration_ms,
        width,
        height,
    };
    let token = attachment.encode();

    info!(thread_id, user_id = %user_id, stored = %file.stored_name, size = file.size, "upload: stored");
    Ok(Json(UploadResponse { attachment, token }))
}

/// Reads the form. The gate runs as soon as `threadId` is parsed, before any
/// later file field is written.
async fn read_form(
    multipart: &mut Multipart,
    db_pool: &SqlitePool,
    user_id: &str,
    uploads: &UploadSettings,
    form: &mut UploadForm,
) -> AppResult<()> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "threadId" => {
                let thread_id = number(field, &name).await?;
                admit(db_pool, thread_id, user_id).await?;
                form.thread_id = Some(thread_id);
            }
            "durationMs" => form.duration_ms = optional_number(field, &name).await?,
            "width" => form.width = optional_number(field, &name).await?,
            "height" => form.height = optional_number(field, &name).await?,
            "file" => {
                if form.file.is_some() {
                    return Err(AppError::bad_request("only one file per upload"));
                }
                form.file = Some(store_file(field, uploads).await?);
            }
            other => debug!(field = other, "upload: ignoring unknown field"),
        }
    }

    Ok(())
}

async fn admit(db_pool: &SqlitePool, thread_id: ThreadId, user_id: &str) -> AppResult<()> {
    if gate::is_participant(db_pool, thread_id, user_id, true).await? {
        return Ok(());
    }

    debug!(thread_id, user_id = %user_id, "upload: gate refused");
    Err(AppError::Forbidden)
}

async fn store_file(mut field: Field<'_>, uploads: &UploadSettings) -> AppResult<StoredFile> {
    let content_type = field.content_type().unwrap_or("application/octet-stream").to_owned();
    if !uploads.allows(&content_type) {
        return Err(AppError::Rejected(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("content type {content_type} is not accepted"),
        ));
    }

    let original_name = sanitize_name(field.file_name());
    let ext = extension(&original_name).unwrap_or_else(|| FALLBACK_EXT.to_owned());
    let stored_name = format!("{}.{ext}", Uuid::now_v7());
    let path = uploads.dir.join(&stored_name);

    let mut out = fs::File::create(&path).await?;
    let copied = copy_limited(&mut field, &mut out, uploads.max_bytes as u64).await;
    drop(out);

    let size = match copied {
        Ok(size) => size,
        Err(e) => {
            remove_quietly(&path).await;
            return Err(e);
        }
    };
    if size == 0 {
        remove_quietly(&path).await;
        return Err(AppError::bad_request("empty file"));
    }

    Ok(StoredFile {
        path,
        stored_name,
        original_name,
        content_type,
        size,
    })
}

async fn copy_limited(field: &mut Field<'_>, out: &mut fs::File, max_bytes: u64) -> AppResult<u64> {
    let mut size: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        size += chunk.len() as u64;
        if size > max_bytes {
            return Err(AppError::Rejected(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("file exceeds {max_bytes} bytes"),
            ));
        }
        out.write_all(&chunk).await?;
    }
    out.flush().await?;

    Ok(size)
}

async fn number<T: std::str::FromStr>(field: Field<'_>, name: &str) -> AppResult<T> {
    optional_number(field, name)
        .await?
        .ok_or_else(|| AppError::bad_request(format!("{name} is empty")))
}

async fn optional_number<T: std::str::FromStr>(field: Field<'_>, name: &str) -> AppResult<Option<T>> {
    let text = field.text().await?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    text.parse()
        .map(Some)
        .map_err(|_| AppError::bad_request(format!("{name} is not a number")))
}

async fn remove_quietly(path: &std::path::Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "upload: could not remove partial file");
    }
}

fn public_url(public_path: &str, stored_name: &str) -> String {
    format!("{}/{stored_name}", public_path.trim_end_matches('/'))
}

/// Last path component of the client's file name, without control characters.
/// Token delimiters become `_`, so the name reads the same in the response and
/// in the decoded token.
pub fn sanitize_name(file_name: Option<&str>) -> String {
    let base = file_name
        .unwrap_or_default()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if matches!(c, '|' | '[' | ']') { '_' } else { c })
        .take(MAX_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        FALLBACK_NAME.to_owned()
    } else {
        cleaned.to_owned()
    }
}

/// Lowercased extension if it is short and plain alphanumeric.
pub fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXT_CHARS {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    Some(ext.to_ascii_lowercase())
}
