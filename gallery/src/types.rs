use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier assigned at enrollment.
pub type PersonId = u64;

/// An enrolled person. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
}

/// A reference photo owned by a person.
#[derive(Clone, PartialEq, Eq)]
pub struct GalleryImage {
    pub owner_id: PersonId,

    /// Store-wide write sequence; unique per image and increasing in
    /// enrollment order.
    pub seq: u64,

    pub bytes: Vec<u8>,
}

impl GalleryImage {
    pub fn image_ref(&self) -> ImageRef {
        ImageRef {
            owner_id: self.owner_id,
            seq: self.seq,
        }
    }
}

impl fmt::Debug for GalleryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GalleryImage")
            .field("owner_id", &self.owner_id)
            .field("seq", &self.seq)
            .field("bytes_len", &self.bytes.len())
            .finish()
    }
}

/// Identifies a reference photo without carrying its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub owner_id: PersonId,
    pub seq: u64,
}

/// A free-text note about a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub owner_id: PersonId,
    pub text: String,
}

/// A person together with all of their annotations, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: PersonId,
    pub name: String,
    pub annotations: Vec<String>,
}
