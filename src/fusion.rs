//! Selection of the per-frame track set that gets published.

use crate::consistency::ConsistencyScorer;
use crate::error::{Error, Result};
use crate::track_set::TrackSet;
use crate::ContinuityTracker;

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionMode {
    /// Publish the tracked primary output; the secondary is only scored.
    #[default]
    PrimaryOnly,
    /// Once the secondary agrees well enough with the primary, its extra
    /// boxes join the primary set before tracking.
    ValidateAndFuse,
}

impl FromStr for FusionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary-only" => Ok(FusionMode::PrimaryOnly),
            "validate-and-fuse" => Ok(FusionMode::ValidateAndFuse),
            other => Err(Error::MalformedRecord(format!(
                "unknown fusion mode `{}`",
                other
            ))),
        }
    }
}

impl fmt::Display for FusionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionMode::PrimaryOnly => f.write_str("primary-only"),
            FusionMode::ValidateAndFuse => f.write_str("validate-and-fuse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionPolicy {
    pub mode: FusionMode,
    pub scorer: ConsistencyScorer,
    /// Agreement the secondary needs before its boxes are trusted.
    pub min_agreement: f32,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            mode: FusionMode::PrimaryOnly,
            scorer: ConsistencyScorer::default(),
            min_agreement: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutcome {
    /// Tracker output, carries identities.
    pub tracks: TrackSet,
    /// Share of primary boxes confirmed by the secondary model.
    pub agreement: Option<f32>,
    /// Secondary boxes merged into the primary set.
    pub fused: usize,
}

impl FusionPolicy {
    pub fn new(mode: FusionMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Steps `tracker` exactly once with the selected set for `frame_id`.
    pub fn fuse<T: ContinuityTracker + ?Sized>(
        &self,
        frame_id: u64,
        primary: &TrackSet,
        secondary: Option<&TrackSet>,
        tracker: &mut T,
    ) -> Result<FusionOutcome> {
        let agreement = match secondary {
            Some(secondary) if !primary.is_empty() => {
                let score = self.scorer.score(primary, secondary)?;
                tracing::debug!(frame_id, agreement = score, "secondary model agreement");
                Some(score)
            }
            _ => None,
        };

        let mut fused = 0;
        let selected = match (self.mode, secondary, agreement) {
            (FusionMode::ValidateAndFuse, Some(secondary), Some(score))
                if score >= self.min_agreement =>
            {
                let extra = self.scorer.unmatched(primary, secondary);
                fused = extra.len();
                primary.extend_from(secondary, &extra)?
            }
            (FusionMode::ValidateAndFuse, Some(_), Some(score)) => {
                tracing::warn!(
                    frame_id,
                    agreement = score,
                    min_agreement = self.min_agreement,
                    "secondary model disagrees, publishing primary only"
                );
                primary.without_ids()
            }
            _ => primary.without_ids(),
        };

        let tracks = tracker.step(frame_id, &selected)?;

        Ok(FusionOutcome {
            tracks,
            agreement,
            fused,
        })
    }
}
