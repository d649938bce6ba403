use crate::bbox::{BBox, Ltrb};
use crate::error::{Error, Result};
use crate::track_set::TrackSet;
use crate::ContinuityTracker;

use munkres::{solve_assignment, WeightMatrix};
use nalgebra as na;
use ndarray::{Array1, Array2};

/// Cost assigned to padding cells of the square assignment matrix.
const NO_MATCH_COST: f32 = 100000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortConfig {
    /// Minimal IoU between a predicted track box and a detection for a match.
    pub iou_threshold: f32,
    /// Frames a track survives without a matching detection.
    pub max_age: u64,
    /// Weight of the newest displacement in the velocity estimate.
    pub velocity_smoothing: f32,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_age: 30,
            velocity_smoothing: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: i64,
    pub bbox: BBox<Ltrb>,
    /// Center displacement per frame, in px.
    pub velocity: na::Vector2<f32>,
    pub hits_count: u32,
    pub last_frame: u64,
}

impl Participant {
    fn new(id: i64, frame_id: u64, bbox: BBox<Ltrb>) -> Self {
        Self {
            id,
            bbox,
            velocity: na::Vector2::zeros(),
            hits_count: 1,
            last_frame: frame_id,
        }
    }

    /// Box extrapolated to `frame_id` at constant velocity.
    pub fn prediction(&self, frame_id: u64) -> BBox<Ltrb> {
        let dt = frame_id.saturating_sub(self.last_frame) as f32;
        let c = self.bbox.as_xywh();
        let center = na::Point2::new(c.cx(), c.cy()) + self.velocity * dt;

        BBox::xywh(center.x, center.y, c.width(), c.height()).as_ltrb()
    }

    fn update(&mut self, frame_id: u64, bbox: BBox<Ltrb>, smoothing: f32) {
        let dt = frame_id.saturating_sub(self.last_frame).max(1) as f32;
        let displacement = (bbox.center() - self.bbox.center()) / dt;

        self.velocity = if self.hits_count == 1 {
            displacement
        } else {
            self.velocity * (1.0 - smoothing) + displacement * smoothing
        };

        self.bbox = bbox;
        self.hits_count += 1;
        self.last_frame = frame_id;
    }
}

/// IoU association of motion-predicted tracks, solved with the Hungarian
/// algorithm. Every detection leaves a step with an identity: matched ones
/// inherit the track's, unmatched ones open a new track.
pub struct SortTracker {
    config: SortConfig,
    slots: Vec<Option<Participant>>,
    next_id: i64,
    last_frame: Option<u64>,
}

impl SortTracker {
    pub fn new(config: SortConfig) -> Self {
        Self {
            config,
            slots: Vec::with_capacity(64),
            next_id: 1,
            last_frame: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Returns `(slot, detection)` pairs.
    fn assignment(&self, frame_id: u64, dets: &[BBox<Ltrb>]) -> Vec<(usize, usize)> {
        let live: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].is_some())
            .collect();

        if live.is_empty() || dets.is_empty() {
            return Vec::new();
        }

        let predictions: Vec<BBox<Ltrb>> = live
            .iter()
            .filter_map(|&i| self.slots[i].as_ref())
            .map(|p| p.prediction(frame_id))
            .collect();

        let n = live.len().max(dets.len());
        let costs = Array2::from_shape_fn((n, n), |(r, c)| {
            if r < predictions.len() && c < dets.len() {
                1.0 - predictions[r].iou(&dets[c])
            } else {
                NO_MATCH_COST
            }
        });

        let mut mat = WeightMatrix::from_row_vec(n, costs.iter().copied().collect());
        match solve_assignment(&mut mat) {
            Ok(positions) => positions
                .into_iter()
                .filter(|p| p.row < live.len() && p.column < dets.len())
                .filter(|p| 1.0 - costs[[p.row, p.column]] >= self.config.iou_threshold)
                .map(|p| (live[p.row], p.column))
                .collect(),
            Err(err) => {
                tracing::warn!(frame_id, ?err, "assignment could not be solved");
                Vec::new()
            }
        }
    }

    fn insert(&mut self, participant: Participant) {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(participant),
            None => self.slots.push(Some(participant)),
        }
    }
}

impl Default for SortTracker {
    fn default() -> Self {
        Self::new(SortConfig::default())
    }
}

impl ContinuityTracker for SortTracker {
    type Track = Participant;

    fn reset(&mut self) {
        self.slots.clear();
        self.next_id = 1;
        self.last_frame = None;
    }

    fn step(&mut self, frame_id: u64, tracks: &TrackSet) -> Result<TrackSet> {
        if let Some(last) = self.last_frame {
            if frame_id <= last {
                return Err(Error::FrameOrder {
                    last,
                    got: frame_id,
                });
            }
        }

        let dets: Vec<BBox<Ltrb>> = tracks.iter_bboxes().collect();
        let matched = self.assignment(frame_id, &dets);
        let mut ids = Array1::<i64>::zeros(dets.len());
        let mut assigned = vec![false; dets.len()];

        for &(slot, det) in &matched {
            if let Some(p) = self.slots[slot].as_mut() {
                p.update(frame_id, dets[det], self.config.velocity_smoothing);
                ids[det] = p.id;
                assigned[det] = true;
            }
        }

        let max_age = self.config.max_age;
        for slot in self.slots.iter_mut() {
            let expired = matches!(slot, Some(p) if frame_id - p.last_frame > max_age);
            if expired {
                *slot = None;
            }
        }

        for (det, bbox) in dets.iter().enumerate() {
            if !assigned[det] {
                let id = self.next_id;
                self.next_id += 1;
                self.insert(Participant::new(id, frame_id, *bbox));
                ids[det] = id;
            }
        }

        self.last_frame = Some(frame_id);

        tracks.without_ids().with_ids(ids)
    }

    #[inline]
    fn internal_tracks(&self) -> &[Option<Participant>] {
        &self.slots
    }
}
