use std::fmt;

use roastbooth_facematch::Rejection;
use roastbooth_gallery::Person;
use roastbooth_roast::AudioStream;
use serde::Serialize;

use crate::stage::FailureKind;

pub const NO_FACE_MESSAGE: &str = "No faces detected";
pub const NO_MATCH_MESSAGE: &str = "No matching roastee found";

/// What the caller gets back for one probe.
pub enum Outcome {
    /// The probe was identified and audio is ready to stream.
    Audio {
        person: Person,
        text: String,
        media_type: String,
        stream: AudioStream,
    },
    /// No face was found in the probe.
    NoFace,
    /// A face was found but nobody in the gallery is close enough.
    Rejected(Rejection),
    Failed { kind: FailureKind, message: String },
}

/// JSON body describing a non-audio [`Outcome`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeReport {
    pub outcome: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl Outcome {
    pub fn is_audio(&self) -> bool {
        matches!(self, Outcome::Audio { .. })
    }

    /// Returns the report for a non-audio outcome, `None` for audio.
    pub fn report(&self) -> Option<OutcomeReport> {
        let report = match self {
            Outcome::Audio { .. } => return None,
            Outcome::NoFace => OutcomeReport {
                outcome: FailureKind::NoFaceDetected.as_str(),
                message: NO_FACE_MESSAGE.to_string(),
                retryable: None,
            },
            Outcome::Rejected(Rejection::NoMatch) => OutcomeReport {
                outcome: "no_match",
                message: NO_MATCH_MESSAGE.to_string(),
                retryable: None,
            },
            Outcome::Rejected(Rejection::TooDistant {
                distance,
                threshold,
                ..
            }) => OutcomeReport {
                outcome: "rejected",
                message: format!(
                    "{NO_MATCH_MESSAGE} (closest distance {distance:.3}, threshold {threshold:.3})"
                ),
                retryable: None,
            },
            Outcome::Failed { kind, message } => OutcomeReport {
                outcome: kind.as_str(),
                message: message.clone(),
                retryable: Some(kind.is_retryable()),
            },
        };
        Some(report)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Audio {
                person,
                text,
                media_type,
                ..
            } => f
                .debug_struct("Audio")
                .field("person", person)
                .field("text", text)
                .field("media_type", media_type)
                .finish_non_exhaustive(),
            Outcome::NoFace => f.write_str("NoFace"),
            Outcome::Rejected(r) => f.debug_tuple("Rejected").field(r).finish(),
            Outcome::Failed { kind, message } => f
                .debug_struct("Failed")
                .field("kind", kind)
                .field("message", message)
                .finish(),
        }
    }
}
