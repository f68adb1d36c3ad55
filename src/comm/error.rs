/// Why a hub invocation was refused.
///
/// The `Display` text is what the caller sees in the completion frame.
/// Throttled sends and harmless no-ops are not errors and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("unauthenticated")]
    Unauthenticated,

    /// Not a participant, thread disabled, or thread missing.
    #[error("not allowed")]
    NotAllowed,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error")]
    Store(#[from] sqlx::Error),
}
