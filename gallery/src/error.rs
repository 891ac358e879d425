use thiserror::Error;

use crate::kv::KVError;
use crate::types::PersonId;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery: person {0} not found")]
    NotFound(PersonId),

    #[error("gallery: name must be non-empty")]
    EmptyName,

    #[error("gallery: enrollment requires at least one image")]
    NoImages,

    #[error("gallery: image {0} is empty")]
    EmptyImage(usize),

    #[error("gallery: annotation text must be non-empty")]
    EmptyText,

    #[error("gallery: corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("gallery: storage unavailable: {0}")]
    Storage(#[from] KVError),
}

impl GalleryError {
    /// Returns true if the store itself failed, as opposed to the request
    /// being invalid.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GalleryError::Storage(_) | GalleryError::Corrupt { .. })
    }
}
