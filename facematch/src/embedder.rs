use std::sync::Arc;

use crate::error::EmbedError;

/// Turns an image into the embedding of the face it contains.
///
/// Implementations must be safe for concurrent use (Send + Sync).
/// An image with no detectable face yields [`EmbedError::NoFace`]; when an
/// image holds several faces the implementation picks the primary one.
#[async_trait::async_trait]
pub trait FaceEmbedder: Send + Sync {
    async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError>;

    /// Name of the underlying model, for logs.
    fn model(&self) -> &str;
}

/// Synchronous, CPU-bound face model running in process.
///
/// Wrap it in [`BlockingEmbedder`] to use it as a [`FaceEmbedder`].
pub trait FaceModel: Send + Sync {
    fn extract(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError>;

    fn name(&self) -> &str;
}

/// Runs a [`FaceModel`] on tokio's blocking pool so inference never stalls
/// the async workers.
pub struct BlockingEmbedder<M> {
    model: Arc<M>,
}

impl<M: FaceModel + 'static> BlockingEmbedder<M> {
    pub fn new(model: M) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

#[async_trait::async_trait]
impl<M: FaceModel + 'static> FaceEmbedder for BlockingEmbedder<M> {
    async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        let model = self.model.clone();
        let image = image.to_vec();
        tokio::task::spawn_blocking(move || model.extract(&image))
            .await
            .map_err(|e| EmbedError::Model(format!("inference task failed: {e}")))?
    }

    fn model(&self) -> &str {
        self.model.name()
    }
}
