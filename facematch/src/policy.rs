use roastbooth_gallery::PersonId;

use crate::matcher::MatchResult;

/// Default maximum cosine distance still accepted as the same person.
pub const DEFAULT_THRESHOLD: f32 = 0.4;

/// A match close enough to be treated as an identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedIdentity {
    pub person_id: PersonId,
    pub distance: f32,
}

/// Why a probe was not identified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// Nothing in the gallery to compare against.
    NoMatch,
    /// The best candidate was not strictly closer than the threshold.
    TooDistant {
        person_id: PersonId,
        distance: f32,
        threshold: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Accepted(AcceptedIdentity),
    Rejected(Rejection),
}

/// Accepts a [`MatchResult`] iff its distance is strictly below the
/// threshold. Pure; holds no state beyond the threshold.
#[derive(Debug, Clone, Copy)]
pub struct IdentificationPolicy {
    threshold: f32,
}

impl IdentificationPolicy {
    /// Panics if `threshold` is not a positive finite number.
    pub fn new(threshold: f32) -> Self {
        assert!(
            threshold.is_finite() && threshold > 0.0,
            "facematch: threshold must be positive and finite, got {threshold}"
        );
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn accept(&self, result: &MatchResult) -> Decision {
        match *result {
            MatchResult::NoMatch => Decision::Rejected(Rejection::NoMatch),
            MatchResult::Match(c) if c.distance < self.threshold => {
                Decision::Accepted(AcceptedIdentity {
                    person_id: c.owner_id,
                    distance: c.distance,
                })
            }
            MatchResult::Match(c) => Decision::Rejected(Rejection::TooDistant {
                person_id: c.owner_id,
                distance: c.distance,
                threshold: self.threshold,
            }),
        }
    }
}

impl Default for IdentificationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
