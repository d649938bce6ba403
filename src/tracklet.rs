//! Per-object midpoint histories rebuilt from published frames.

use crate::circular_queue::CircularQueue;
use crate::publisher::PublishedFrame;

use nalgebra as na;
use std::collections::BTreeMap;

/// Center of an `(x1, y1, x2, y2, ..)` box.
pub fn midpoint(bbox: &[f32]) -> Option<na::Point2<f32>> {
    match bbox {
        [x1, y1, x2, y2, ..] => Some(na::Point2::new((x1 + x2) / 2.0, (y1 + y2) / 2.0)),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Tracklet {
    pub object_id: i64,
    pub last_frame: u64,
    points: CircularQueue<na::Point2<f32>>,
}

impl Tracklet {
    /// Oldest first.
    pub fn points(&self) -> impl Iterator<Item = &na::Point2<f32>> {
        self.points.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Tracklets keyed by object id, each keeping its latest `max_points` midpoints.
#[derive(Debug, Clone)]
pub struct TrackletBook {
    tracklets: BTreeMap<i64, Tracklet>,
    max_points: usize,
}

impl TrackletBook {
    pub fn new(max_points: usize) -> Self {
        Self {
            tracklets: BTreeMap::new(),
            max_points,
        }
    }

    pub fn ingest(&mut self, frame: &PublishedFrame) {
        if frame.frame_id == 0 {
            self.tracklets.clear();
        }

        for obj in &frame.tracking_info {
            let Some(point) = midpoint(&obj.bbox) else {
                tracing::warn!(object_id = obj.object_id, "object without a usable box");
                continue;
            };

            let max_points = self.max_points;
            let tracklet = self
                .tracklets
                .entry(obj.object_id)
                .or_insert_with(|| Tracklet {
                    object_id: obj.object_id,
                    last_frame: frame.frame_id,
                    points: CircularQueue::with_capacity(max_points),
                });

            tracklet.points.push(point);
            tracklet.last_frame = frame.frame_id;
        }
    }

    /// Drops tracklets not seen for more than `max_gap` frames.
    pub fn prune(&mut self, current_frame: u64, max_gap: u64) {
        self.tracklets
            .retain(|_, t| current_frame.saturating_sub(t.last_frame) <= max_gap);
    }

    pub fn get(&self, object_id: i64) -> Option<&Tracklet> {
        self.tracklets.get(&object_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tracklet> {
        self.tracklets.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracklets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracklets.is_empty()
    }
}
