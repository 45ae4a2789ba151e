//! Error types for the wire protocol

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
