//! Typed serialization of tracked frames to the output log.

use crate::error::{Error, Result};
use crate::frame::Cursor;
use crate::stream::TrackSink;
use crate::track_set::TrackSet;

use serde_derive::{Deserialize, Serialize};

pub const DEFAULT_MAXLEN: usize = 3000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackedObject {
    #[serde(rename = "objectId")]
    pub object_id: i64,
    #[serde(rename = "object_bbox")]
    pub bbox: Vec<f32>,
    pub class: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PublishedFrame {
    #[serde(rename = "frameId")]
    pub frame_id: u64,
    pub tracking_info: Vec<TrackedObject>,
}

impl PublishedFrame {
    /// Zips identities with boxes; every object gets `class`.
    pub fn from_tracks(frame_id: u64, tracks: &TrackSet, class: &str) -> Result<Self> {
        let tracking_info = match tracks.ids() {
            Some(ids) => ids
                .iter()
                .zip(tracks.bboxes().outer_iter())
                .map(|(&object_id, bbox)| TrackedObject {
                    object_id,
                    bbox: bbox.to_vec(),
                    class: class.to_string(),
                })
                .collect(),
            None if tracks.is_empty() => Vec::new(),
            None => return Err(Error::MissingIdentities(tracks.len())),
        };

        Ok(Self {
            frame_id,
            tracking_info,
        })
    }
}

pub struct Publisher<K> {
    sink: K,
    class: String,
    maxlen: usize,
}

impl<K: TrackSink> Publisher<K> {
    pub fn new(sink: K, class: impl Into<String>, maxlen: usize) -> Self {
        Self {
            sink,
            class: class.into(),
            maxlen,
        }
    }

    #[inline]
    pub fn sink(&self) -> &K {
        &self.sink
    }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    #[inline]
    pub fn class(&self) -> &str {
        &self.class
    }

    #[inline]
    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    /// Appends the frame under `ref_id`, the cursor of the input record that
    /// produced it.
    pub fn publish(
        &mut self,
        ref_id: &Cursor,
        frame_id: u64,
        tracks: &TrackSet,
    ) -> Result<PublishedFrame> {
        let frame = PublishedFrame::from_tracks(frame_id, tracks, &self.class)?;
        let tracking = serde_json::to_string(&frame)?;
        let id = self.sink.append(ref_id, &tracking, self.maxlen)?;

        tracing::trace!(%ref_id, %id, frame_id, objects = frame.tracking_info.len(), "published");

        Ok(frame)
    }
}
