//! Request and input size limits.
//!
//! # Responsibilities
//! - Cap request body size before parsing (413 Payload Too Large)
//! - Cap individual string fields and file names during sanitization
//!
//! # Design Decisions
//! - Limits checked before JSON parsing (early rejection)
//! - Caps are counted in characters, not bytes, for text fields

use axum::body::{Body, Bytes};
use futures_util::StreamExt;

/// Default maximum request body size.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Maximum length of a sanitized string field.
pub const MAX_STRING_CHARS: usize = 10_000;

/// Maximum length of a sanitized file name.
pub const MAX_FILE_NAME_CHARS: usize = 255;

/// Why a request body could not be buffered.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Read(String),
}

/// Buffer a request body, refusing anything over `limit` bytes.
pub async fn read_body_limited(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BodyError::Read(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}
