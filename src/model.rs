//! Detection/tracking model boundary.

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::normalizer::RawOutput;

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Maps a frame to per-category rows, `[x1, y1, x2, y2, score]` or
/// `[id, x1, y1, x2, y2, score]`.
pub trait TrackingModel {
    fn infer(&mut self, frame: &Frame) -> Result<RawOutput>;
}

impl<M: TrackingModel + ?Sized> TrackingModel for Box<M> {
    fn infer(&mut self, frame: &Frame) -> Result<RawOutput> {
        (**self).infer(frame)
    }
}

/// Where a model comes from and where it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub config: PathBuf,
    pub checkpoint: Option<PathBuf>,
    pub device: String,
}

impl ModelSpec {
    pub fn new(config: impl Into<PathBuf>) -> Self {
        Self {
            config: config.into(),
            checkpoint: None,
            device: "cuda:0".to_string(),
        }
    }
}

/// Replays precomputed outputs from a detections dump, one frame per line:
/// `<frameId>:<json array of per-category rows>`. Frames missing from the
/// dump produce no detections.
#[derive(Debug, Default)]
pub struct ReplayModel {
    frames: HashMap<u64, RawOutput>,
}

impl ReplayModel {
    pub fn open(spec: &ModelSpec) -> Result<Self> {
        if spec.checkpoint.is_some() {
            tracing::debug!(config = ?spec.config, "replay model ignores checkpoint");
        }
        tracing::info!(config = ?spec.config, device = %spec.device, "loading replay model");

        Self::from_path(&spec.config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut frames = HashMap::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (frame_id, rows) = line.split_once(':').ok_or_else(|| {
                Error::MalformedRecord(format!("line {}: expected `:`", lineno + 1))
            })?;

            let frame_id: u64 = frame_id.trim().parse().map_err(|_| {
                Error::MalformedRecord(format!("line {}: parse frame id failed", lineno + 1))
            })?;

            let rows: Vec<Vec<Vec<f32>>> = serde_json::from_str(rows)?;
            frames.insert(frame_id, RawOutput::from_rows(rows)?);
        }

        Ok(Self { frames })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl TrackingModel for ReplayModel {
    fn infer(&mut self, frame: &Frame) -> Result<RawOutput> {
        Ok(self
            .frames
            .get(&frame.frame_id)
            .cloned()
            .unwrap_or_default())
    }
}
