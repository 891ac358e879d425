use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use parking_lot::RwLock;
use roastbooth_gallery::{GalleryError, GalleryStore, ImageRef, KVError, PersonId};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cosine::cosine_distance;
use crate::embedder::FaceEmbedder;
use crate::error::{EmbedError, MatchError};

/// Controls matcher behavior.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Maximum number of embedding calls in flight across all requests.
    /// Default: available parallelism.
    pub workers: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
        }
    }
}

/// The closest gallery photo to a probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub owner_id: PersonId,

    /// Cosine distance in `[0, 2]`. Lower is closer.
    pub distance: f32,
}

/// Outcome of a nearest-match scan over the gallery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchResult {
    Match(Candidate),
    /// The gallery is empty or none of its photos contain a face.
    NoMatch,
}

/// Finds the enrolled person whose reference photo is closest to a probe.
///
/// Reference embeddings are computed on first use and cached by photo
/// sequence number; gallery photos never change once written, so a photo's
/// bytes are only read from the gallery on a cache miss. A reference photo
/// in which the model finds no face is cached as unusable and skipped.
///
/// Thread-safe: all methods can be called concurrently. Embedding calls
/// from every caller share one semaphore of [`MatcherConfig::workers`]
/// permits.
pub struct EmbeddingMatcher {
    gallery: Arc<GalleryStore>,
    embedder: Arc<dyn FaceEmbedder>,
    permits: Arc<Semaphore>,
    workers: usize,
    references: RwLock<HashMap<u64, Option<Arc<[f32]>>>>,
}

impl EmbeddingMatcher {
    pub fn new(
        gallery: Arc<GalleryStore>,
        embedder: Arc<dyn FaceEmbedder>,
        cfg: MatcherConfig,
    ) -> Self {
        let workers = cfg.workers.max(1);
        Self {
            gallery,
            embedder,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            references: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the gallery photo closest to `probe`.
    ///
    /// An empty gallery yields [`MatchResult::NoMatch`] without embedding
    /// the probe. A probe without a face fails with
    /// [`MatchError::NoFaceDetected`]. Equal distances resolve to the photo
    /// scanned first, i.e. the earliest enrolled person.
    pub async fn identify(&self, probe: &[u8]) -> Result<MatchResult, MatchError> {
        let images = self.gallery.image_refs()?;
        if images.is_empty() {
            debug!("match: gallery is empty");
            return Ok(MatchResult::NoMatch);
        }

        let probe_emb = match self.embed(probe).await {
            Ok(emb) => emb,
            Err(EmbedError::NoFace) => return Err(MatchError::NoFaceDetected),
            Err(e) => return Err(e.into()),
        };

        let references: Vec<(PersonId, Option<Arc<[f32]>>)> = stream::iter(images)
            .map(|img| async move {
                let emb = self.reference(img).await?;
                Ok::<_, MatchError>((img.owner_id, emb))
            })
            .buffered(self.workers)
            .try_collect()
            .await?;

        let mut best: Option<Candidate> = None;
        for (owner_id, emb) in references {
            let Some(emb) = emb else {
                continue;
            };
            let distance = cosine_distance(&probe_emb, &emb);
            if distance.is_nan() {
                continue;
            }
            if best.is_none_or(|b| distance < b.distance) {
                best = Some(Candidate { owner_id, distance });
            }
        }

        match best {
            Some(candidate) => {
                debug!(
                    person_id = candidate.owner_id,
                    distance = candidate.distance,
                    "match: best candidate"
                );
                Ok(MatchResult::Match(candidate))
            }
            None => Ok(MatchResult::NoMatch),
        }
    }

    /// Embeds every gallery photo not yet cached. Returns the number of
    /// photos usable for matching.
    pub async fn warm_up(&self) -> Result<usize, MatchError> {
        let images = self.gallery.image_refs()?;
        let usable = stream::iter(images)
            .map(|img| async move { self.reference(img).await })
            .buffer_unordered(self.workers)
            .try_fold(0usize, |n, emb| async move { Ok(n + usize::from(emb.is_some())) })
            .await?;
        Ok(usable)
    }

    /// Returns the number of cached reference embeddings.
    pub fn cached_references(&self) -> usize {
        self.references.read().len()
    }

    pub fn embedder_model(&self) -> &str {
        self.embedder.model()
    }

    async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EmbedError::Model("matcher worker pool closed".to_string()))?;
        self.embedder.embed(image).await
    }

    async fn reference(&self, img: ImageRef) -> Result<Option<Arc<[f32]>>, MatchError> {
        let cached = self.references.read().get(&img.seq).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let gallery = self.gallery.clone();
        let bytes = tokio::task::spawn_blocking(move || gallery.image(img))
            .await
            .map_err(|e| {
                GalleryError::Storage(KVError::Storage(format!("image load task failed: {e}")))
            })??;

        let emb = match self.embed(&bytes).await {
            Ok(v) => Some(Arc::<[f32]>::from(v)),
            Err(EmbedError::NoFace) => {
                warn!(
                    person_id = img.owner_id,
                    seq = img.seq,
                    "match: no face in reference photo, skipping"
                );
                None
            }
            Err(e) => return Err(e.into()),
        };
        self.references.write().insert(img.seq, emb.clone());
        Ok(emb)
    }
}
