//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Longest render detail shown to the user before it is cut off.
pub const USER_DETAIL_LIMIT: usize = 60;

/// Errors that can occur while capturing messages
#[derive(Error, Debug)]
pub enum Error {
    /// The reference message of a window capture is not in the conversation
    #[error("Anchor message not found: {0}")]
    AnchorNotFound(String),

    /// The selection predicate matched no message
    #[error("Capture target not found: {0}")]
    TargetNotFound(String),

    /// Cloning or staging the messages failed
    #[error("Failed to prepare capture: {0}")]
    PreparationFailure(String),

    /// The rasterizer rejected the staged container
    #[error("Rendering failed: {0}")]
    RenderFailure(String),

    /// The image could not be handed to the download sink
    #[error("Export failed: {0}")]
    ExportFailure(String),

    /// Invalid configuration or request
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Text suitable for a user-facing alert. Render details are truncated.
    pub fn user_message(&self) -> String {
        match self {
            Error::RenderFailure(detail) => {
                format!("Rendering failed: {}", truncate_detail(detail, USER_DETAIL_LIMIT))
            }
            other => other.to_string(),
        }
    }
}

fn truncate_detail(detail: &str, limit: usize) -> String {
    if detail.chars().count() <= limit {
        return detail.to_string();
    }
    let mut out: String = detail.chars().take(limit).collect();
    out.push_str("...");
    out
}
