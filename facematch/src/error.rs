use roastbooth_gallery::GalleryError;
use thiserror::Error;

/// Errors returned by a [`crate::FaceEmbedder`].
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The image was decoded but contains no detectable face.
    #[error("embed: no face detected")]
    NoFace,

    /// The embedding service could not be reached or failed server-side.
    #[error("embed: service unavailable: {0}")]
    Unavailable(String),

    /// The embedding service refused the request.
    #[error("embed: rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response did not contain an embedding.
    #[error("embed: malformed response: {0}")]
    Malformed(String),

    #[error("embed: model error: {0}")]
    Model(String),
}

/// Errors returned by [`crate::EmbeddingMatcher::identify`].
#[derive(Debug, Error)]
pub enum MatchError {
    /// No face in the probe. Distinct from a confident non-match.
    #[error("match: no face detected in probe")]
    NoFaceDetected,

    #[error("match: {0}")]
    Embedder(#[from] EmbedError),

    #[error("match: {0}")]
    Gallery(#[from] GalleryError),
}
