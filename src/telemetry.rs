//! Per-frame timing hooks. None of them influence control flow.

use crate::circular_queue::CircularQueue;

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Span {
    /// Model inference for one frame, all models.
    ModelRun,
    /// Normalization through publication.
    BoundingBoxes,
}

impl Span {
    fn index(self) -> usize {
        match self {
            Span::ModelRun => 0,
            Span::BoundingBoxes => 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Span::ModelRun => "model_run_latency",
            Span::BoundingBoxes => "bounding_boxes_latency",
        }
    }
}

pub trait Telemetry {
    /// Marks that `frame_id` entered processing.
    fn frame(&mut self, _frame_id: u64) {}

    fn start(&mut self, span: Span);

    fn end(&mut self, span: Span);

    /// Post-frame resource usage sample.
    fn sample_resources(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    #[inline]
    fn start(&mut self, _span: Span) {}

    #[inline]
    fn end(&mut self, _span: Span) {}
}

/// Mean over the last `n` samples.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: CircularQueue<Duration>,
    sum: Duration,
}

impl LatencyWindow {
    pub fn new(n: usize) -> Self {
        Self {
            samples: CircularQueue::with_capacity(n.max(1)),
            sum: Duration::ZERO,
        }
    }

    pub fn push(&mut self, sample: Duration) {
        self.sum += sample;

        if let Some(evicted) = self.samples.push(sample) {
            self.sum -= evicted;
        }
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.sum / self.samples.len() as u32)
        }
    }

    #[inline]
    pub fn last(&self) -> Option<Duration> {
        self.samples.latest().copied()
    }
}

/// Logs span latencies and their rolling means through `tracing`.
#[derive(Debug)]
pub struct TracingTelemetry {
    started: [Option<Instant>; 2],
    windows: [LatencyWindow; 2],
    frames: u64,
    since: Instant,
    report_every: u64,
}

impl TracingTelemetry {
    pub fn new(window: usize, report_every: u64) -> Self {
        Self {
            started: [None, None],
            windows: [LatencyWindow::new(window), LatencyWindow::new(window)],
            frames: 0,
            since: Instant::now(),
            report_every: report_every.max(1),
        }
    }

    pub fn window(&self, span: Span) -> &LatencyWindow {
        &self.windows[span.index()]
    }
}

impl Default for TracingTelemetry {
    fn default() -> Self {
        Self::new(100, 100)
    }
}

impl Telemetry for TracingTelemetry {
    fn frame(&mut self, frame_id: u64) {
        self.frames += 1;
        tracing::trace!(frame_id, "frame");
    }

    fn start(&mut self, span: Span) {
        self.started[span.index()] = Some(Instant::now());
    }

    fn end(&mut self, span: Span) {
        if let Some(start) = self.started[span.index()].take() {
            let elapsed = start.elapsed();
            self.windows[span.index()].push(elapsed);
            tracing::debug!(span = span.name(), ?elapsed, "latency");
        }
    }

    fn sample_resources(&mut self) {
        if self.frames % self.report_every != 0 {
            return;
        }

        let secs = self.since.elapsed().as_secs_f32();
        let fps = if secs > 0.0 {
            self.report_every as f32 / secs
        } else {
            0.0
        };
        self.since = Instant::now();

        tracing::info!(
            frames = self.frames,
            fps,
            model_run = ?self.window(Span::ModelRun).mean(),
            bounding_boxes = ?self.window(Span::BoundingBoxes).mean(),
            "throughput"
        );
    }
}
