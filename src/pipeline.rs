//! Pull loop tying the input log, models, fusion and publication together.

use crate::error::{Error, Result};
use crate::frame::{Cursor, FrameRecord};
use crate::fusion::FusionPolicy;
use crate::model::TrackingModel;
use crate::normalizer::normalize;
use crate::publisher::{PublishedFrame, Publisher, DEFAULT_MAXLEN};
use crate::retry::RetryPolicy;
use crate::stream::{FrameSource, TrackSink};
use crate::telemetry::{NoopTelemetry, Span, Telemetry};
use crate::track_set::TrackSet;
use crate::ContinuityTracker;

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Class label attached to every published object.
    pub class_id: String,
    /// Output log retention bound.
    pub maxlen: usize,
    /// Longest wait for a new input record.
    pub block: Duration,
    /// Target `(height, width)` for model masks.
    pub mask_shape: Option<(usize, usize)>,
    pub fusion: FusionPolicy,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            class_id: "PERSON".to_string(),
            maxlen: DEFAULT_MAXLEN,
            block: Duration::from_millis(1000),
            mask_shape: None,
            fusion: FusionPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub enum StepOutcome {
    /// No new record arrived within the block timeout.
    Idle,
    Published {
        ref_id: Cursor,
        frame: PublishedFrame,
        agreement: Option<f32>,
    },
    /// The record could not be processed; nothing was published for it.
    Skipped { ref_id: Cursor, error: Error },
}

/// Tracked frame whose publication failed on the transport.
struct Pending {
    ref_id: Cursor,
    frame_id: u64,
    tracks: TrackSet,
    agreement: Option<f32>,
}

pub struct Pipeline<S, K, T> {
    config: PipelineConfig,
    source: S,
    publisher: Publisher<K>,
    tracker: T,
    primary: Box<dyn TrackingModel>,
    secondary: Option<Box<dyn TrackingModel>>,
    telemetry: Box<dyn Telemetry>,
    cursor: Cursor,
    pending: Option<Pending>,
}

impl<S, K, T> Pipeline<S, K, T>
where
    S: FrameSource,
    K: TrackSink,
    T: ContinuityTracker,
{
    /// Fails when the output log does not answer.
    pub fn new(
        config: PipelineConfig,
        source: S,
        mut sink: K,
        tracker: T,
        primary: Box<dyn TrackingModel>,
    ) -> Result<Self> {
        sink.ping()?;

        let publisher = Publisher::new(sink, config.class_id.clone(), config.maxlen);

        Ok(Self {
            config,
            source,
            publisher,
            tracker,
            primary,
            secondary: None,
            telemetry: Box::new(NoopTelemetry),
            cursor: Cursor::origin(),
            pending: None,
        })
    }

    pub fn with_secondary(mut self, model: Box<dyn TrackingModel>) -> Self {
        self.secondary = Some(model);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    #[inline]
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    #[inline]
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    #[inline]
    pub fn sink(&self) -> &K {
        self.publisher.sink()
    }

    #[inline]
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Runs until the retry policy gives up on the transport.
    pub fn run(&mut self) -> Result<()> {
        let mut failures = 0;

        loop {
            match self.step() {
                Ok(_) => failures = 0,
                Err(err) if err.is_transport() => {
                    failures += 1;

                    match self.config.retry.delay(failures) {
                        Some(delay) => {
                            tracing::error!(%err, attempt = failures, ?delay, "stream connection failed");
                            std::thread::sleep(delay);
                        }
                        None => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One loop iteration: at most one record is read and fully processed.
    ///
    /// Transport failures are returned with the cursor left in place, so the
    /// same record is read again. A tracked frame whose publication failed is
    /// re-published before anything new is read.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if let Some(pending) = self.pending.take() {
            // time only this attempt, not the backoff since the failed one
            self.telemetry.start(Span::BoundingBoxes);
            return self.flush(pending);
        }

        let next = self.source.read_after(&self.cursor, self.config.block)?;
        let Some((ref_id, record)) = next else {
            return Ok(StepOutcome::Idle);
        };

        match record.and_then(|record| self.track(record)) {
            Ok((frame_id, tracks, agreement)) => self.flush(Pending {
                ref_id,
                frame_id,
                tracks,
                agreement,
            }),
            Err(err) if err.is_transport() => Err(err),
            Err(error) => {
                tracing::error!(%ref_id, %error, "frame dropped");
                self.cursor = ref_id.clone();
                Ok(StepOutcome::Skipped { ref_id, error })
            }
        }
    }

    fn track(&mut self, record: FrameRecord) -> Result<(u64, TrackSet, Option<f32>)> {
        let frame_id = record.frame_id;
        self.telemetry.frame(frame_id);

        if record.is_restart() {
            tracing::info!("stream restart, resetting tracker");
            self.tracker.reset();
        }

        tracing::debug!(
            frame_id,
            alive_tracks = self.tracker.alive_tracks(),
            "processing frame"
        );

        let frame = record.decode()?;

        self.telemetry.start(Span::ModelRun);
        let primary = self.primary.infer(&frame)?;
        let secondary = match self.secondary.as_mut() {
            Some(model) => Some(model.infer(&frame)?),
            None => None,
        };
        self.telemetry.end(Span::ModelRun);

        self.telemetry.start(Span::BoundingBoxes);
        let mask_shape = self.config.mask_shape;
        let primary = normalize(&primary, mask_shape)?;
        let secondary = match secondary {
            Some(raw) => Some(normalize(&raw, mask_shape)?),
            None => None,
        };

        let outcome = self.config.fusion.fuse(
            frame_id,
            &primary,
            secondary.as_ref(),
            &mut self.tracker,
        )?;

        Ok((frame_id, outcome.tracks, outcome.agreement))
    }

    fn flush(&mut self, pending: Pending) -> Result<StepOutcome> {
        match self
            .publisher
            .publish(&pending.ref_id, pending.frame_id, &pending.tracks)
        {
            Ok(frame) => {
                self.telemetry.end(Span::BoundingBoxes);
                self.telemetry.sample_resources();
                self.cursor = pending.ref_id.clone();

                Ok(StepOutcome::Published {
                    ref_id: pending.ref_id,
                    frame,
                    agreement: pending.agreement,
                })
            }
            Err(err) if err.is_transport() => {
                self.pending = Some(pending);
                Err(err)
            }
            Err(error) => {
                tracing::error!(ref_id = %pending.ref_id, %error, "frame dropped");
                self.cursor = pending.ref_id.clone();

                Ok(StepOutcome::Skipped {
                    ref_id: pending.ref_id,
                    error,
                })
            }
        }
    }
}
