pub mod calls;
pub mod messages;
pub mod profiles;
pub mod threads;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

pub type ProfileId = i64;
pub type ThreadId = i64;
pub type MessageId = i64;
pub type CallId = i64;

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(db_pool).await
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Thread {
    pub id: ThreadId,
    pub supervisor_profile_id: ProfileId,
    pub student_profile_id: ProfileId,
    pub enabled: bool,
    pub created_at: OffsetDateTime,

    // unique: supervisor_profile_id, student_profile_id
}

/// A thread resolved down to the account identities of its two members.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ThreadParticipants {
    pub thread_id: ThreadId,
    pub supervisor_user_id: String,
    pub student_user_id: String,
    pub enabled: bool,
}

impl ThreadParticipants {
    pub fn includes(&self, user_id: &str) -> bool {
        self.supervisor_user_id == user_id || self.student_user_id == user_id
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub sender_user_id: String,
    pub text: String,
    pub sent_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CallSession {
    pub id: CallId,
    pub thread_id: ThreadId,
    #[sqlx(try_from = "String")]
    pub kind: MediaKind,
    pub started_by_user_id: String,
    pub started_at: OffsetDateTime,
    pub ended_at: Option<OffsetDateTime>,
}

impl CallSession {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    #[serde(alias = "audio")]
    Audio,
    #[serde(alias = "video")]
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        use MediaKind::*;
        match self {
            Audio => "audio",
            Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown media kind {0:?}")]
pub struct UnknownMediaKind(pub String);

impl FromStr for MediaKind {
    type Err = UnknownMediaKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            _ => Err(UnknownMediaKind(s.to_owned())),
        }
    }
}

impl TryFrom<String> for MediaKind {
    type Error = UnknownMediaKind;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
