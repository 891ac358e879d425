//! Face identification against an enrolled gallery.
//!
//! # Architecture
//!
//! 1. [`FaceEmbedder::embed`]: image bytes -> face embedding vector
//! 2. [`EmbeddingMatcher::identify`]: probe embedding vs. every gallery
//!    photo -> closest [`MatchResult`] by [`cosine_distance`]
//! 3. [`IdentificationPolicy::accept`]: [`MatchResult`] -> [`Decision`]
//!
//! The embedding model is a black box. [`HttpFaceEmbedder`] talks to a
//! remote representation service; [`BlockingEmbedder`] wraps an in-process
//! [`FaceModel`] and runs it on the blocking thread pool.

mod cosine;
mod embedder;
mod error;
mod http;
mod matcher;
mod policy;

pub use cosine::cosine_distance;
pub use embedder::{BlockingEmbedder, FaceEmbedder, FaceModel};
pub use error::{EmbedError, MatchError};
pub use http::{DEFAULT_DETECTOR, DEFAULT_MODEL, HttpEmbedderConfig, HttpFaceEmbedder};
pub use matcher::{Candidate, EmbeddingMatcher, MatchResult, MatcherConfig};
pub use policy::{AcceptedIdentity, Decision, IdentificationPolicy, Rejection, DEFAULT_THRESHOLD};
