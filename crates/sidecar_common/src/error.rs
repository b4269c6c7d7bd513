//! Error types for the sidecar.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SidecarError {
    /// Malformed heartbeat body. Surfaced to the game process as a 400.
    #[error("invalid heartbeat request: {0}")]
    Validation(String),

    /// Cluster API could not be reached, timed out, or answered with a
    /// server-side or throttling status.
    #[error("cluster transport error: {0}")]
    Transport(String),

    /// Cluster API refused the request itself (bad value, forbidden). Sending
    /// it again will not help.
    #[error("cluster API rejected request: {0}")]
    Rejected(String),

    /// The GameServer resource this sidecar belongs to does not exist.
    #[error("game server resource not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SidecarError {
    /// HTTP status code the heartbeat endpoint answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            SidecarError::Validation(_) => 400,
            SidecarError::Transport(_)
            | SidecarError::Rejected(_)
            | SidecarError::NotFound(_)
            | SidecarError::Config(_)
            | SidecarError::Json(_)
            | SidecarError::Internal(_) => 500,
        }
    }

    /// Transient failures are retried implicitly by the next heartbeat.
    pub fn is_transient(&self) -> bool {
        matches!(self, SidecarError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, SidecarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(SidecarError::Validation("x".into()).status_code(), 400);
        assert_eq!(SidecarError::Transport("x".into()).status_code(), 500);
        assert_eq!(SidecarError::NotFound("gs".into()).status_code(), 500);
        assert_eq!(SidecarError::Rejected("422".into()).status_code(), 500);
    }

    #[test]
    fn test_only_transport_is_transient() {
        assert!(SidecarError::Transport("timeout".into()).is_transient());
        assert!(!SidecarError::NotFound("gs".into()).is_transient());
        assert!(!SidecarError::Rejected("422".into()).is_transient());
        assert!(!SidecarError::Validation("bad".into()).is_transient());
    }
}
