pub mod bbox;
pub mod consistency;
pub mod error;
pub mod frame;
pub mod fusion;
pub mod model;
pub mod normalizer;
pub mod pipeline;
pub mod publisher;
pub mod retry;
pub mod stream;
pub mod telemetry;
pub mod tracker;
pub mod tracklet;

mod circular_queue;
mod track_set;

pub use consistency::ConsistencyScorer;
pub use error::{Error, Result};
pub use frame::{Cursor, Frame, FrameRecord};
pub use fusion::{FusionMode, FusionOutcome, FusionPolicy};
pub use normalizer::{normalize, RawOutput};
pub use pipeline::{Pipeline, PipelineConfig, StepOutcome};
pub use publisher::{PublishedFrame, Publisher, TrackedObject};
pub use track_set::TrackSet;
pub use tracker::{SortConfig, SortTracker};

/// Stateful assignment of identities that stay stable across frames.
///
/// `step` must see frames in strictly increasing `frame_id` order, once each.
pub trait ContinuityTracker {
    type Track;

    /// Forgets every identity; the next `step` behaves like a fresh tracker's first.
    fn reset(&mut self);

    /// Returns `tracks` with `ids` populated, objects in input order.
    fn step(&mut self, frame_id: u64, tracks: &TrackSet) -> Result<TrackSet>;

    /// Identity table; empty slots are free for reuse.
    fn internal_tracks(&self) -> &[Option<Self::Track>];

    #[inline]
    fn alive_tracks(&self) -> usize {
        self.internal_tracks().iter().filter(|t| t.is_some()).count()
    }
}

impl<T: ContinuityTracker + ?Sized> ContinuityTracker for &mut T {
    type Track = T::Track;

    fn reset(&mut self) {
        (**self).reset()
    }

    fn step(&mut self, frame_id: u64, tracks: &TrackSet) -> Result<TrackSet> {
        (**self).step(frame_id, tracks)
    }

    fn internal_tracks(&self) -> &[Option<Self::Track>] {
        (**self).internal_tracks()
    }
}
