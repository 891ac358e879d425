//! Request orchestration: probe in, roast audio (or a typed reason why
//! not) out.
//!
//! [`Pipeline::run`] drives each request through an explicit [`Stage`]
//! machine whose history is observable through the returned [`Tracker`].
//! Matching and policy failures stop the request before any provider is
//! called, so a rejected probe never produces partial audio.

mod outcome;
mod pipeline;
mod stage;

pub use outcome::{NO_FACE_MESSAGE, NO_MATCH_MESSAGE, Outcome, OutcomeReport};
pub use pipeline::{Pipeline, Run};
pub use stage::{FailureKind, Stage, Tracker};
