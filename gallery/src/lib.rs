//! Gallery of enrolled people.
//!
//! Each person owns a set of reference photos and an append-only list of
//! annotations. Everything lives in a [`KVStore`]; the on-disk backend is
//! [`RedbStore`], tests use [`MemoryStore`].
//!
//! # Key Layout
//!
//! ```text
//! person:{id}              → msgpack Person
//! img:{id}:{seq}           → raw image bytes
//! note:{id}:{seq}          → msgpack Annotation
//! meta:next_person         → last allocated person id
//! meta:next_seq            → last allocated image/annotation sequence
//! ```
//!
//! Ids and sequences are zero-padded so a prefix scan returns records in
//! enrollment order.

mod error;
pub mod keys;
mod kv;
mod memory;
mod redb_store;
mod store;
mod types;

pub use error::GalleryError;
pub use kv::{KVError, KVResult, KVStore};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use store::GalleryStore;
pub use types::{Annotation, GalleryImage, ImageRef, Person, PersonId, PersonRecord};
