//! Object fetch collaborator
//!
//! Retrieves an uploaded object and decodes it to text. Decoding is strict
//! UTF-8 first; on failure the bytes are decoded with replacement characters
//! and the result is flagged as lossy instead of failing the batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod local;
pub mod s3;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Container (bucket) and object (key) naming one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub container: String,
    pub object: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.object)
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("object not found: {0}")]
    NotFound(ObjectRef),

    #[error("failed to fetch {object}: {message}")]
    Storage { object: ObjectRef, message: String },
}

/// Decoded object content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedText {
    pub text: String,
    /// Invalid UTF-8 was replaced with U+FFFD
    pub lossy: bool,
}

/// Strict UTF-8, falling back to lossy replacement. A leading byte-order mark
/// is dropped so it does not end up in the first column name.
pub fn decode_text(bytes: Vec<u8>) -> FetchedText {
    let (text, lossy) = match String::from_utf8(bytes) {
        Ok(text) => (text, false),
        Err(e) => (String::from_utf8_lossy(e.as_bytes()).into_owned(), true),
    };
    let text = match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    };
    FetchedText { text, lossy }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch_text(&self, object: &ObjectRef) -> Result<FetchedText, FetchError>;
}
