use anyhow::Context;
use clap::Parser;
use fusetrack::consistency::{ConsistencyScorer, DEFAULT_TOLERANCE};
use fusetrack::model::{ModelSpec, ReplayModel};
use fusetrack::retry::RetryPolicy;
use fusetrack::stream::{RedisStream, Trim};
use fusetrack::telemetry::TracingTelemetry;
use fusetrack::{FusionMode, FusionPolicy, Pipeline, PipelineConfig, SortConfig, SortTracker};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Multi-model track reconciliation: reads frames from a Redis stream,
/// tracks objects and publishes identities to an output stream.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Primary model config
    config: PathBuf,

    /// Input stream key for incoming frames
    #[arg(long, default_value = "camera:0")]
    input_stream: String,

    /// Class label of the tracked objects
    #[arg(long = "classId", alias = "class-id", default_value = "PERSON")]
    class_id: String,

    /// Output stream key for tracklets
    #[arg(long, default_value = "camera:0:mot")]
    output_stream: String,

    /// Model checkpoint file
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Device used for inference
    #[arg(long, default_value = "cuda:0")]
    device: String,

    /// Redis URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis: String,

    /// Maximum length of the output stream
    #[arg(long, default_value_t = 3000)]
    maxlen: usize,

    /// Let Redis trim the output stream lazily (`MAXLEN ~`)
    #[arg(long)]
    approximate_trim: bool,

    /// Config of a secondary model validated against the primary
    #[arg(long)]
    additional_model: Option<PathBuf>,

    /// primary-only or validate-and-fuse
    #[arg(long, default_value = "primary-only")]
    fusion_mode: FusionMode,

    /// Per-coordinate tolerance (px) when comparing model outputs
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f32,

    /// Agreement needed before secondary boxes are fused
    #[arg(long, default_value_t = 0.5)]
    min_agreement: f32,

    /// Block timeout of a single stream read, ms (0 polls without blocking)
    #[arg(long, default_value_t = 1000)]
    block_ms: u64,

    #[arg(long, default_value_t = 100)]
    retry_initial_ms: u64,

    #[arg(long, default_value_t = 5000)]
    retry_max_ms: u64,

    /// Consecutive connection failures before giving up (unbounded if unset)
    #[arg(long)]
    retry_attempts: Option<u32>,

    /// Frames a track survives without detections
    #[arg(long, default_value_t = 30)]
    max_age: u64,

    #[arg(long, default_value_t = 0.3)]
    iou_threshold: f32,
}

impl Args {
    fn model_spec(&self, config: &Path) -> ModelSpec {
        ModelSpec {
            config: config.to_path_buf(),
            checkpoint: self.checkpoint.clone(),
            device: self.device.clone(),
        }
    }

    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            class_id: self.class_id.clone(),
            maxlen: self.maxlen,
            block: Duration::from_millis(self.block_ms),
            mask_shape: None,
            fusion: FusionPolicy {
                mode: self.fusion_mode,
                scorer: ConsistencyScorer::new(self.tolerance),
                min_agreement: self.min_agreement,
            },
            retry: RetryPolicy {
                initial: Duration::from_millis(self.retry_initial_ms),
                max: Duration::from_millis(self.retry_max_ms),
                factor: 2.0,
                max_attempts: self.retry_attempts,
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fusetrack=info")),
        )
        .init();

    let args = Args::parse();

    let trim = if args.approximate_trim {
        Trim::Approximate
    } else {
        Trim::Exact
    };

    let source = RedisStream::connect(&args.redis, &args.input_stream, &args.output_stream, trim)
        .with_context(|| format!("Redis unavailable at {}", args.redis))?;
    let sink = RedisStream::connect(&args.redis, &args.input_stream, &args.output_stream, trim)
        .with_context(|| format!("Redis unavailable at {}", args.redis))?;

    let primary = ReplayModel::open(&args.model_spec(&args.config))
        .with_context(|| format!("loading model {}", args.config.display()))?;

    let tracker = SortTracker::new(SortConfig {
        iou_threshold: args.iou_threshold,
        max_age: args.max_age,
        ..Default::default()
    });

    let mut pipeline = Pipeline::new(
        args.pipeline_config(),
        source,
        sink,
        tracker,
        Box::new(primary),
    )
    .context("Redis unavailable")?
    .with_telemetry(Box::new(TracingTelemetry::default()));

    if let Some(path) = &args.additional_model {
        let secondary = ReplayModel::open(&args.model_spec(path))
            .with_context(|| format!("loading additional model {}", path.display()))?;
        pipeline = pipeline.with_secondary(Box::new(secondary));
    }

    tracing::info!(
        input = %args.input_stream,
        output = %args.output_stream,
        class = %args.class_id,
        fusion = %args.fusion_mode,
        "tracking"
    );

    pipeline.run().context("giving up on Redis connection")?;

    Ok(())
}
