//! End-to-end tests of the frame → track → publish loop over in-memory streams.

use fusetrack::model::ReplayModel;
use fusetrack::retry::RetryPolicy;
use fusetrack::stream::{FrameSource, MemoryStream, TrackSink};
use fusetrack::telemetry::{Span, Telemetry};
use fusetrack::{
    ContinuityTracker, Cursor, Error, FrameRecord, FusionMode, FusionPolicy, Pipeline,
    PipelineConfig, PublishedFrame, Result, SortTracker, StepOutcome,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

fn png() -> Vec<u8> {
    let img = image::RgbImage::new(16, 16);
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn model(dump: &str) -> Box<ReplayModel> {
    Box::new(ReplayModel::from_reader(dump.as_bytes()).unwrap())
}

fn config() -> PipelineConfig {
    PipelineConfig {
        block: Duration::ZERO,
        retry: RetryPolicy::immediate(3),
        ..Default::default()
    }
}

fn published(sink: &MemoryStream) -> Vec<(Cursor, PublishedFrame)> {
    sink.entries()
        .map(|e| {
            (
                Cursor::new(e.get_str("refId").unwrap()),
                serde_json::from_str(e.get_str("tracking").unwrap()).unwrap(),
            )
        })
        .collect()
}

/// Memory stream whose first `failures` operations fail on the transport.
#[derive(Default)]
struct Flaky {
    inner: MemoryStream,
    read_failures: u32,
    append_failures: u32,
    unreachable: bool,
}

impl FrameSource for Flaky {
    fn read_after(
        &mut self,
        after: &Cursor,
        timeout: Duration,
    ) -> Result<Option<(Cursor, Result<FrameRecord>)>> {
        if self.read_failures > 0 {
            self.read_failures -= 1;
            return Err(Error::Transport("connection reset".into()));
        }
        self.inner.read_after(after, timeout)
    }
}

impl TrackSink for Flaky {
    fn append(&mut self, ref_id: &Cursor, tracking: &str, maxlen: usize) -> Result<Cursor> {
        if self.append_failures > 0 {
            self.append_failures -= 1;
            return Err(Error::Transport("broken pipe".into()));
        }
        self.inner.append(ref_id, tracking, maxlen)
    }

    fn ping(&mut self) -> Result<()> {
        if self.unreachable {
            Err(Error::Transport("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_single_box_is_published_with_identity() {
    let mut source = MemoryStream::new();
    let input_id = source.add_frame(0, png());

    let mut pipeline = Pipeline::new(
        config(),
        source,
        MemoryStream::new(),
        SortTracker::default(),
        model("0:[[[0,0,10,10,0.9]]]"),
    )
    .unwrap();

    let outcome = pipeline.step().unwrap();
    assert!(matches!(outcome, StepOutcome::Published { .. }));
    assert_eq!(pipeline.cursor(), &input_id);

    let out = published(pipeline.sink());
    assert_eq!(out.len(), 1);

    let (ref_id, frame) = &out[0];
    assert_eq!(ref_id, &input_id);
    assert_eq!(frame.frame_id, 0);
    assert_eq!(frame.tracking_info.len(), 1);
    assert_eq!(frame.tracking_info[0].bbox, vec![0.0, 0.0, 10.0, 10.0, 0.9]);
    assert_eq!(frame.tracking_info[0].class, "PERSON");
    assert_eq!(frame.tracking_info[0].object_id, 1);

    assert!(matches!(pipeline.step().unwrap(), StepOutcome::Idle));
}

#[test]
fn test_identities_survive_across_frames() {
    let dump = "\
1:[[[0,0,40,80,0.9],[200,0,240,80,0.8]]]
2:[[[203,0,243,80,0.8],[3,0,43,80,0.9]]]
3:[[[6,0,46,80,0.9],[206,0,246,80,0.8]]]
";
    let mut source = MemoryStream::new();
    for f in 1..=3 {
        source.add_frame(f, png());
    }

    let mut pipeline = Pipeline::new(
        config(),
        source,
        MemoryStream::new(),
        SortTracker::default(),
        model(dump),
    )
    .unwrap();

    for _ in 0..3 {
        pipeline.step().unwrap();
    }

    let frames: Vec<_> = published(pipeline.sink()).into_iter().map(|(_, f)| f).collect();
    let id_of = |frame: &PublishedFrame, left: f32| {
        frame
            .tracking_info
            .iter()
            .find(|o| (o.bbox[0] - left).abs() < 1.0)
            .map(|o| o.object_id)
            .unwrap()
    };

    assert_eq!(id_of(&frames[0], 0.0), id_of(&frames[1], 3.0));
    assert_eq!(id_of(&frames[1], 3.0), id_of(&frames[2], 6.0));
    assert_eq!(id_of(&frames[0], 200.0), id_of(&frames[2], 206.0));
    assert_ne!(id_of(&frames[0], 0.0), id_of(&frames[0], 200.0));
    assert_eq!(pipeline.tracker().alive_tracks(), 2);
}

#[test]
fn test_restart_frame_resets_identities() {
    let dump = "\
0:[[[0,0,10,10,0.9]]]
1:[[[500,500,510,510,0.9]]]
";
    let mut source = MemoryStream::new();
    source.add_frame(0, png());
    source.add_frame(1, png());
    source.add_frame(0, png());

    let mut pipeline = Pipeline::new(
        config(),
        source,
        MemoryStream::new(),
        SortTracker::default(),
        model(dump),
    )
    .unwrap();

    for _ in 0..3 {
        assert!(matches!(
            pipeline.step().unwrap(),
            StepOutcome::Published { .. }
        ));
    }

    let frames: Vec<_> = published(pipeline.sink()).into_iter().map(|(_, f)| f).collect();
    assert_eq!(frames[0].tracking_info[0].object_id, 1);
    assert_eq!(frames[1].tracking_info[0].object_id, 2);
    assert_eq!(frames[2], frames[0]);
}

#[test]
fn test_retention_keeps_newest_maxlen() {
    let maxlen = 5;
    let mut source = MemoryStream::new();
    let inputs: Vec<Cursor> = (1..=maxlen as u64 + 1)
        .map(|f| source.add_frame(f, png()))
        .collect();

    let mut pipeline = Pipeline::new(
        PipelineConfig {
            maxlen,
            ..config()
        },
        source,
        MemoryStream::new(),
        SortTracker::default(),
        model(""),
    )
    .unwrap();

    for _ in 0..=maxlen {
        pipeline.step().unwrap();
    }

    let refs: Vec<Cursor> = published(pipeline.sink())
        .into_iter()
        .map(|(r, _)| r)
        .collect();
    assert_eq!(refs.len(), maxlen);
    assert_eq!(refs, inputs[1..].to_vec());
    assert!(refs.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_empty_primary_publishes_empty_info() {
    let mut source = MemoryStream::new();
    source.add_frame(4, png());

    let mut pipeline = Pipeline::new(
        config(),
        source,
        MemoryStream::new(),
        SortTracker::default(),
        model("4:[[]]"),
    )
    .unwrap();

    match pipeline.step().unwrap() {
        StepOutcome::Published { frame, .. } => {
            assert_eq!(frame.frame_id, 4);
            assert!(frame.tracking_info.is_empty());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_transport_failure_keeps_cursor() {
    let mut source = Flaky {
        read_failures: 1,
        ..Default::default()
    };
    let first = source.inner.add_frame(0, png());

    let mut pipeline = Pipeline::new(
        config(),
        source,
        MemoryStream::new(),
        SortTracker::default(),
        model("0:[[[0,0,10,10,0.9]]]"),
    )
    .unwrap();

    let err = pipeline.step().unwrap_err();
    assert!(err.is_transport());
    assert_eq!(pipeline.cursor(), &Cursor::origin());
    assert!(pipeline.sink().is_empty());

    match pipeline.step().unwrap() {
        StepOutcome::Published { ref_id, .. } => assert_eq!(ref_id, first),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_failed_publication_is_retried_without_restepping() {
    let mut source = MemoryStream::new();
    let first = source.add_frame(1, png());
    source.add_frame(2, png());

    let sink = Flaky {
        append_failures: 2,
        ..Default::default()
    };

    let mut pipeline = Pipeline::new(
        config(),
        source,
        sink,
        SortTracker::default(),
        model("1:[[[0,0,10,10,0.9]]]\n2:[[[1,1,11,11,0.9]]]"),
    )
    .unwrap();

    assert!(pipeline.step().unwrap_err().is_transport());
    assert!(pipeline.step().unwrap_err().is_transport());
    assert_eq!(pipeline.cursor(), &Cursor::origin());

    match pipeline.step().unwrap() {
        StepOutcome::Published { ref_id, frame, .. } => {
            assert_eq!(ref_id, first);
            assert_eq!(frame.tracking_info[0].object_id, 1);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    match pipeline.step().unwrap() {
        StepOutcome::Published { frame, .. } => {
            assert_eq!(frame.frame_id, 2);
            assert_eq!(frame.tracking_info[0].object_id, 1);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    assert_eq!(pipeline.sink().inner.len(), 2);
}

#[test]
fn test_bad_shapes_drop_only_that_frame() {
    let mut source = MemoryStream::new();
    let bad = source.add_frame(1, png());
    source.add(vec![("frameId".to_string(), b"two".to_vec())]);
    source.add_frame(3, vec![0, 1, 2]);
    source.add_frame(4, png());

    let mut pipeline = Pipeline::new(
        config(),
        source,
        MemoryStream::new(),
        SortTracker::default(),
        model("1:[[[1,2,3,4,5,6,7]]]\n4:[[[0,0,10,10,0.9]]]"),
    )
    .unwrap();

    match pipeline.step().unwrap() {
        StepOutcome::Skipped { ref_id, error } => {
            assert_eq!(ref_id, bad);
            assert!(matches!(error, Error::UnsupportedBoxShape(7)));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(pipeline.cursor(), &bad);

    assert!(matches!(
        pipeline.step().unwrap(),
        StepOutcome::Skipped {
            error: Error::MalformedRecord(_),
            ..
        }
    ));
    assert!(matches!(
        pipeline.step().unwrap(),
        StepOutcome::Skipped {
            error: Error::ImageDecode(_),
            ..
        }
    ));
    assert!(matches!(
        pipeline.step().unwrap(),
        StepOutcome::Published { .. }
    ));

    assert_eq!(published(pipeline.sink()).len(), 1);
}

#[test]
fn test_run_gives_up_after_bounded_retries() {
    let source = Flaky {
        read_failures: u32::MAX,
        ..Default::default()
    };

    let mut pipeline = Pipeline::new(
        config(),
        source,
        MemoryStream::new(),
        SortTracker::default(),
        model(""),
    )
    .unwrap();

    let err = pipeline.run().unwrap_err();
    assert!(err.is_transport());
    assert_eq!(pipeline.source_mut().read_failures, u32::MAX - 4);
}

#[test]
fn test_unreachable_output_fails_startup() {
    let sink = Flaky {
        unreachable: true,
        ..Default::default()
    };

    let result = Pipeline::new(
        config(),
        MemoryStream::new(),
        sink,
        SortTracker::default(),
        model(""),
    );
    assert!(matches!(result, Err(Error::Transport(_))));
}

#[test]
fn test_secondary_model_is_scored_and_fused() {
    let mut source = MemoryStream::new();
    source.add_frame(1, png());

    let primary = "1:[[[0,0,10,10,0.9]]]";
    let secondary = "1:[[[2,2,12,12,0.8],[300,300,340,380,0.7]]]";

    let build = |mode: FusionMode, source: MemoryStream| {
        Pipeline::new(
            PipelineConfig {
                fusion: FusionPolicy::new(mode),
                ..config()
            },
            source,
            MemoryStream::new(),
            SortTracker::default(),
            model(primary),
        )
        .unwrap()
        .with_secondary(model(secondary))
    };

    let mut only = build(FusionMode::PrimaryOnly, source.clone());
    match only.step().unwrap() {
        StepOutcome::Published {
            frame, agreement, ..
        } => {
            assert_eq!(agreement, Some(1.0));
            assert_eq!(frame.tracking_info.len(), 1);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let mut fused = build(FusionMode::ValidateAndFuse, source);
    match fused.step().unwrap() {
        StepOutcome::Published { frame, .. } => {
            assert_eq!(frame.tracking_info.len(), 2);
            assert_eq!(
                frame.tracking_info[1].bbox,
                vec![300.0, 300.0, 340.0, 380.0, 0.7]
            );
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Start(Span),
    End(Span),
}

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<Event>>>);

impl Telemetry for Recorder {
    fn start(&mut self, span: Span) {
        self.0.borrow_mut().push(Event::Start(span));
    }

    fn end(&mut self, span: Span) {
        self.0.borrow_mut().push(Event::End(span));
    }
}

#[test]
fn test_republish_restarts_latency_span() {
    let mut source = MemoryStream::new();
    source.add_frame(1, png());

    let sink = Flaky {
        append_failures: 1,
        ..Default::default()
    };
    let recorder = Recorder::default();

    let mut pipeline = Pipeline::new(
        config(),
        source,
        sink,
        SortTracker::default(),
        model("1:[[[0,0,10,10,0.9]]]"),
    )
    .unwrap()
    .with_telemetry(Box::new(recorder.clone()));

    assert!(pipeline.step().unwrap_err().is_transport());
    assert_eq!(
        recorder.0.borrow().last(),
        Some(&Event::Start(Span::BoundingBoxes))
    );

    recorder.0.borrow_mut().clear();
    assert!(matches!(
        pipeline.step().unwrap(),
        StepOutcome::Published { .. }
    ));
    assert_eq!(
        *recorder.0.borrow(),
        vec![
            Event::Start(Span::BoundingBoxes),
            Event::End(Span::BoundingBoxes)
        ]
    );
}
