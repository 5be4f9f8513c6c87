/// Core error type for the event-correlation engine.
///
/// Adapter crates map their platform errors into this type so every workflow
/// can decide consistently between "log and skip" and "tell the invoking user".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// A platform request did not complete.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A configured channel id is unset or does not resolve to a usable channel.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// An expected structural pattern is absent (mentions, numeric prefix, ...).
    #[error("malformed state: {0}")]
    MalformedState(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A history scan aborted before reaching its boundary.
    #[error("scan failed: {0}")]
    ScanFailed(String),

    #[error("a prompt is already pending for this user in this channel")]
    PromptPending,

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
