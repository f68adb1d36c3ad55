use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "comm.toml";

const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "audio/webm",
    "audio/ogg",
    "audio/mpeg",
    "audio/mp4",
    "video/webm",
    "video/mp4",
    "application/pdf",
];

/// Load config from `$COMM_CONFIG` (or `comm.toml`) plus env overrides.
pub fn load_config() -> anyhow::Result<Config> {
    let path = std::env::var("COMM_CONFIG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_config_from_path(&path)
}

pub fn load_config_from_path(path: &Path) -> anyhow::Result<Config> {
    let file_cfg = read_toml_if_exists(path)
        .with_context(|| format!("read config from {}", path.display()))?
        .unwrap_or_default();

    let mut cfg = Config::from_file(file_cfg);
    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub database_url: String,
    pub session: SessionSettings,
    /// Origins allowed by CORS; empty means no CORS layer at all.
    pub allowed_origins: Vec<String>,
    pub hub: HubSettings,
    pub uploads: UploadSettings,
    pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub idle_minutes: i64,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Minimum spacing between two accepted chat sends on one connection.
    pub send_interval: Duration,
    /// Queued outbound frames per connection before fan-out starts dropping.
    pub outbox_capacity: usize,
    /// Open calls older than this are closed by the sweeper. `None` disables it.
    pub stale_call_after: Option<Duration>,
    pub sweep_every: Duration,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub dir: PathBuf,
    pub public_path: String,
    pub max_bytes: usize,
    pub allowed_content_types: Vec<String>,
}

impl UploadSettings {
    pub fn allows(&self, content_type: &str) -> bool {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(essence))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file(FileConfig::default())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    bind: Option<String>,
    database_url: Option<String>,
    #[serde(default)]
    allowed_origins: Vec<String>,

    #[serde(default)]
    session: FileSessionSettings,

    #[serde(default)]
    hub: FileHubSettings,

    #[serde(default)]
    uploads: FileUploadSettings,

    ice_servers: Option<Vec<IceServer>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileSessionSettings {
    idle_minutes: Option<i64>,
    secure_cookies: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileHubSettings {
    send_interval_ms: Option<u64>,
    outbox_capacity: Option<usize>,
    stale_call_after_minutes: Option<u64>,
    sweep_every_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileUploadSettings {
    dir: Option<String>,
    public_path: Option<String>,
    max_bytes: Option<usize>,
    allowed_content_types: Option<Vec<String>>,
}

impl Config {
    fn from_file(file: FileConfig) -> Self {
        let public_path = file
            .uploads
            .public_path
            .map(|p| format!("/{}", p.trim().trim_matches('/')))
            .filter(|p| p.len() > 1)
            .unwrap_or_else(|| "/uploads".to_owned());

        Self {
            bind: file.bind.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| "0.0.0.0:8080".to_owned()),
            database_url: file
                .database_url
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "sqlite://comm.db".to_owned()),
            session: SessionSettings {
                idle_minutes: file.session.idle_minutes.filter(|m| *m > 0).unwrap_or(60),
                secure_cookies: file.session.secure_cookies.unwrap_or(false),
            },
            allowed_origins: file.allowed_origins.into_iter().filter(|s| !s.trim().is_empty()).collect(),
            hub: HubSettings {
                send_interval: Duration::from_millis(file.hub.send_interval_ms.unwrap_or(1000)),
                outbox_capacity: file.hub.outbox_capacity.filter(|c| *c > 0).unwrap_or(256),
                stale_call_after: stale_after(file.hub.stale_call_after_minutes.unwrap_or(240)),
                sweep_every: Duration::from_secs(file.hub.sweep_every_secs.filter(|s| *s > 0).unwrap_or(300)),
            },
            uploads: UploadSettings {
                dir: file
                    .uploads
                    .dir
                    .filter(|s| !s.trim().is_empty())
                    .map_or_else(|| PathBuf::from("uploads"), PathBuf::from),
                public_path,
                max_bytes: file.uploads.max_bytes.filter(|b| *b > 0).unwrap_or(10 * 1024 * 1024),
                allowed_content_types: file.uploads.allowed_content_types.unwrap_or_else(|| {
                    DEFAULT_ALLOWED_CONTENT_TYPES.iter().map(|s| s.to_string()).collect()
                }),
            },
            ice_servers: file.ice_servers.unwrap_or_else(|| {
                vec![IceServer {
                    urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                    username: None,
                    credential: None,
                }]
            }),
        }
    }
}

fn stale_after(minutes: u64) -> Option<Duration> {
    (minutes > 0).then(|| Duration::from_secs(minutes * 60))
}

fn parse_env_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
            Ok(Some(cfg))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow!(e).context("read config file")),
    }
}

fn env_string(key: &str) -> Option<String> {
    dotenv::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn apply_env_overrides(cfg: &mut Config) -> anyhow::Result<()> {
    if let Some(v) = env_string("COMM_BIND") {
        cfg.bind = v;
        info!("config: bind overridden by env");
    }

    if let Some(v) = env_string("DATABASE_URL") {
        cfg.database_url = v;
        info!("config: database_url overridden by env");
    }

    if let Some(minutes) = env_string("COMM_SESSION_IDLE_MINUTES").and_then(|v| v.parse::<i64>().ok()) {
        if minutes > 0 {
            cfg.session.idle_minutes = minutes;
            info!(minutes, "config: session idle_minutes overridden by env");
        }
    }

    if let Some(secure) = env_string("COMM_SECURE_COOKIES").and_then(|v| parse_env_bool(&v)) {
        cfg.session.secure_cookies = secure;
        info!(secure, "config: secure_cookies overridden by env");
    }

    if let Some(v) = env_string("COMM_ALLOWED_ORIGINS") {
        cfg.allowed_origins = v
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        info!(origins = cfg.allowed_origins.len(), "config: allowed_origins overridden by env");
    }

    if let Some(ms) = env_string("COMM_SEND_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
        cfg.hub.send_interval = Duration::from_millis(ms);
        info!(ms, "config: hub send_interval overridden by env");
    }

    if let Some(minutes) = env_string("COMM_STALE_CALL_AFTER_MINUTES").and_then(|v| v.parse::<u64>().ok()) {
        cfg.hub.stale_call_after = stale_after(minutes);
        info!(minutes, "config: hub stale_call_after overridden by env");
    }

    if let Some(v) = env_string("COMM_UPLOADS_DIR") {
        cfg.uploads.dir = PathBuf::from(v);
        info!("config: uploads dir overridden by env");
    }

    if let Some(max_bytes) = env_string("COMM_UPLOAD_MAX_BYTES").and_then(|v| v.parse::<usize>().ok()) {
        if max_bytes > 0 {
            cfg.uploads.max_bytes = max_bytes;
            info!(max_bytes, "config: uploads max_bytes overridden by env");
        }
    }

    if let Some(v) = env_string("COMM_ICE_SERVERS") {
        cfg.ice_servers = serde_json::from_str(&v).context("parse COMM_ICE_SERVERS as JSON")?;
        info!(servers = cfg.ice_servers.len(), "config: ice_servers overridden by env");
    }

    if cfg.hub.send_interval.is_zero() {
        warn!("config: hub send_interval is zero; chat sends are not rate limited");
    }

    Ok(())
}
