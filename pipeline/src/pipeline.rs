use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures::StreamExt;
use roastbooth_facematch::{
    Decision, EmbedError, EmbeddingMatcher, IdentificationPolicy, MatchError,
};
use roastbooth_gallery::{GalleryError, GalleryStore};
use roastbooth_roast::{
    AudioStream, ContextAssembler, ProviderError, SpeechSynthesizer, TextGenerator,
};
use tracing::info;

use crate::outcome::Outcome;
use crate::stage::{FailureKind, Stage, Tracker};

/// One finished [`Pipeline::run`]: the outcome plus the request's stage
/// history. For [`Outcome::Audio`] the history keeps moving while the
/// stream is drained.
#[derive(Debug)]
pub struct Run {
    pub outcome: Outcome,
    pub tracker: Tracker,
}

/// Sequences identification, prompt assembly, generation and synthesis for
/// one probe at a time. Requests share nothing but the gallery and the
/// matcher's embedding pool, so `run` can be called concurrently.
pub struct Pipeline {
    gallery: Arc<GalleryStore>,
    matcher: Arc<EmbeddingMatcher>,
    policy: IdentificationPolicy,
    assembler: ContextAssembler,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    next_request: AtomicU64,
}

impl Pipeline {
    pub fn new(
        gallery: Arc<GalleryStore>,
        matcher: Arc<EmbeddingMatcher>,
        policy: IdentificationPolicy,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            gallery,
            matcher,
            policy,
            assembler: ContextAssembler::new(),
            generator,
            synthesizer,
            next_request: AtomicU64::new(1),
        }
    }

    pub fn gallery(&self) -> &Arc<GalleryStore> {
        &self.gallery
    }

    pub fn matcher(&self) -> &Arc<EmbeddingMatcher> {
        &self.matcher
    }

    pub fn policy(&self) -> &IdentificationPolicy {
        &self.policy
    }

    /// Runs the probe through the pipeline.
    ///
    /// The probe is dropped as soon as identification finishes. Nothing is
    /// retried; a failure at any stage stops the request there.
    pub async fn run(&self, probe: Bytes) -> Run {
        let tracker = Tracker::new(self.next_request.fetch_add(1, Ordering::Relaxed));
        let outcome = self.execute(probe, &tracker).await;
        Run { outcome, tracker }
    }

    async fn execute(&self, probe: Bytes, tracker: &Tracker) -> Outcome {
        tracker.advance(Stage::Identifying);
        let matched = self.matcher.identify(&probe).await;
        drop(probe);

        let result = match matched {
            Ok(result) => result,
            Err(MatchError::NoFaceDetected) => {
                tracker.fail(FailureKind::NoFaceDetected, &"no face in probe");
                return Outcome::NoFace;
            }
            Err(MatchError::Embedder(e)) => return fail(tracker, embed_failure(&e), &e),
            Err(MatchError::Gallery(e)) => return storage_failure(tracker, &e),
        };

        let identity = match self.policy.accept(&result) {
            Decision::Accepted(identity) => identity,
            Decision::Rejected(rejection) => {
                info!(request = tracker.request_id(), ?rejection, "pipeline: probe rejected");
                tracker.advance(Stage::Rejected);
                return Outcome::Rejected(rejection);
            }
        };
        tracker.advance(Stage::Identified);

        let person = match self.gallery.person(identity.person_id) {
            Ok(p) => p,
            Err(e) => return storage_failure(tracker, &e),
        };
        let annotations = match self.gallery.annotations_of(identity.person_id) {
            Ok(a) => a,
            Err(e) => return storage_failure(tracker, &e),
        };
        info!(
            request = tracker.request_id(),
            person_id = person.id,
            name = %person.name,
            distance = identity.distance,
            "pipeline: identified"
        );

        tracker.advance(Stage::Assembling);
        let request = self.assembler.build_prompt(&person, annotations);

        tracker.advance(Stage::Generating);
        let generated = match self.generator.generate(&request).await {
            Ok(g) => g,
            Err(e) => return provider_failure(tracker, &e),
        };

        tracker.advance(Stage::Synthesizing);
        let stream = match self.synthesizer.synthesize(&generated.text).await {
            Ok(s) => s,
            Err(e) => return provider_failure(tracker, &e),
        };

        tracker.advance(Stage::Streaming);
        Outcome::Audio {
            person,
            text: generated.text,
            media_type: self.synthesizer.media_type().to_string(),
            stream: track_stream(stream, tracker.clone()),
        }
    }
}

/// Records `Failed(Cancelled)` if the audio stream is dropped before it
/// reached a terminal stage.
struct CancelGuard(Tracker);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.0.current().is_terminal() {
            self.0
                .fail(FailureKind::Cancelled, &"audio stream dropped before completion");
        }
    }
}

/// Forwards the audio chunks unchanged and records `Done` once the
/// provider stream is exhausted, or `Failed` on the first error item.
/// Dropping the returned stream early drops the provider stream with it.
fn track_stream(mut stream: AudioStream, tracker: Tracker) -> AudioStream {
    let guard = CancelGuard(tracker.clone());
    Box::pin(async_stream::stream! {
        let _guard = guard;
        let mut failed = false;
        while let Some(item) = stream.next().await {
            if let Err(e) = &item {
                tracker.fail(FailureKind::from(e.kind()), e);
                failed = true;
            }
            yield item;
            if failed {
                break;
            }
        }
        if !failed {
            tracker.advance(Stage::Done);
        }
    })
}

fn embed_failure(e: &EmbedError) -> FailureKind {
    match e {
        EmbedError::NoFace => FailureKind::NoFaceDetected,
        EmbedError::Unavailable(_) => FailureKind::ProviderUnavailable,
        EmbedError::Rejected { .. } | EmbedError::Model(_) => FailureKind::ProviderRejected,
        EmbedError::Malformed(_) => FailureKind::MalformedResponse,
    }
}

fn fail(tracker: &Tracker, kind: FailureKind, cause: &dyn std::fmt::Display) -> Outcome {
    tracker.fail(kind, cause);
    Outcome::Failed {
        kind,
        message: cause.to_string(),
    }
}

fn provider_failure(tracker: &Tracker, e: &ProviderError) -> Outcome {
    fail(tracker, FailureKind::from(e.kind()), e)
}

fn storage_failure(tracker: &Tracker, e: &GalleryError) -> Outcome {
    fail(tracker, FailureKind::StorageUnavailable, e)
}
