use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use roastbooth_roast::ProviderErrorKind;
use tracing::{debug, warn};

/// Why a request ended in [`Stage::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NoFaceDetected,
    ProviderUnavailable,
    ProviderRejected,
    MalformedResponse,
    StorageUnavailable,
    /// The caller dropped the audio stream before it finished.
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NoFaceDetected => "no_face",
            FailureKind::ProviderUnavailable => "provider_unavailable",
            FailureKind::ProviderRejected => "provider_rejected",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::StorageUnavailable => "storage_unavailable",
            FailureKind::Cancelled => "cancelled",
        }
    }

    /// Returns true if resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::ProviderUnavailable | FailureKind::StorageUnavailable
        )
    }
}

impl From<ProviderErrorKind> for FailureKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::Unavailable => FailureKind::ProviderUnavailable,
            ProviderErrorKind::Rejected => FailureKind::ProviderRejected,
            ProviderErrorKind::Malformed => FailureKind::MalformedResponse,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a request in the pipeline.
///
/// ```text
/// Received -> Identifying -> Rejected
///                         -> Identified -> Assembling -> Generating
///                            -> Synthesizing -> Streaming -> Done
/// ```
///
/// Any non-terminal stage may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Identifying,
    Rejected,
    Identified,
    Assembling,
    Generating,
    Synthesizing,
    Streaming,
    Done,
    Failed(FailureKind),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Rejected | Stage::Failed(_))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Received => f.write_str("received"),
            Stage::Identifying => f.write_str("identifying"),
            Stage::Rejected => f.write_str("rejected"),
            Stage::Identified => f.write_str("identified"),
            Stage::Assembling => f.write_str("assembling"),
            Stage::Generating => f.write_str("generating"),
            Stage::Synthesizing => f.write_str("synthesizing"),
            Stage::Streaming => f.write_str("streaming"),
            Stage::Done => f.write_str("done"),
            Stage::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// Stage history of one request.
///
/// Cloning yields a handle to the same history; the audio stream keeps one
/// so that draining it can record the final transition.
#[derive(Debug, Clone)]
pub struct Tracker {
    request_id: u64,
    history: Arc<Mutex<Vec<Stage>>>,
}

impl Tracker {
    pub(crate) fn new(request_id: u64) -> Self {
        debug!(request = request_id, stage = %Stage::Received, "pipeline: stage");
        Self {
            request_id,
            history: Arc::new(Mutex::new(vec![Stage::Received])),
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// The most recent stage.
    pub fn current(&self) -> Stage {
        let history = self.history.lock();
        // The history starts with Received and only grows.
        history.last().copied().unwrap_or(Stage::Received)
    }

    pub fn history(&self) -> Vec<Stage> {
        self.history.lock().clone()
    }

    /// Records a transition. Transitions out of a terminal stage are
    /// ignored.
    pub(crate) fn advance(&self, stage: Stage) {
        let mut history = self.history.lock();
        if history.last().is_some_and(Stage::is_terminal) {
            return;
        }
        history.push(stage);
        drop(history);
        debug!(request = self.request_id, stage = %stage, "pipeline: stage");
    }

    pub(crate) fn fail(&self, kind: FailureKind, cause: &dyn fmt::Display) {
        warn!(request = self.request_id, kind = %kind, error = %cause, "pipeline: failed");
        self.advance(Stage::Failed(kind));
    }
}
