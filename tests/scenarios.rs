use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use till_audit::detector::scripted::{ScriptedDetection, ScriptedFrame};
use till_audit::error::Error;
use till_audit::{
    live_feed, ClassNames, Detection, Detector, Frame, FrameSource, IterSource, ScriptedDetector,
    Session, StreamEvent, TillConfig, TrackerConfig,
};

const APPLE: u32 = 47;
const ORANGE: u32 = 49;

fn det(bbox: [f32; 4], class_id: u32) -> ScriptedDetection {
    ScriptedDetection { bbox, confidence: 0.9, class_id, feature: None }
}

fn script(frames: Vec<Vec<ScriptedDetection>>) -> ScriptedDetector {
    ScriptedDetector::new(
        ClassNames::coco(),
        frames
            .into_iter()
            .enumerate()
            .map(|(i, detections)| ScriptedFrame { frame: i as u64, detections }),
    )
}

fn blank_frames(n: usize) -> IterSource<std::vec::IntoIter<RgbImage>> {
    IterSource::new(vec![RgbImage::new(200, 100); n])
}

fn config(n_init: u32) -> TillConfig {
    TillConfig {
        tracker: TrackerConfig { n_init, ..Default::default() },
        annotate: false,
        ..Default::default()
    }
}

#[test]
fn apple_survives_a_short_gap() -> anyhow::Result<()> {
    let mut frames = vec![];
    for k in 0..5 {
        let x = 10.0 + k as f32;
        frames.push(vec![det([x, 10.0, x + 40.0, 50.0], APPLE)]);
    }
    frames.extend(vec![vec![]; 3]);
    frames.push(vec![det([20.0, 10.0, 60.0, 50.0], APPLE)]);

    let mut session = Session::new(script(frames), config(1))?;
    let mut seen = vec![];

    {
        let mut stream = session.stream(blank_frames(9));
        while let Some(event) = stream.next() {
            if let StreamEvent::Processed(processed) = event? {
                seen.push(processed.tracked.iter().map(|t| t.track_id).collect::<Vec<_>>());
            }
        }
    }

    assert_eq!(seen.len(), 9);
    let id = seen[0][0];
    for (i, ids) in seen.iter().enumerate() {
        if (5..8).contains(&i) {
            assert!(ids.is_empty(), "frame {} should report nothing", i + 1);
        } else {
            assert_eq!(ids, &vec![id], "frame {}", i + 1);
        }
    }

    let agg = session.aggregator();
    assert_eq!(agg.frame_count(), 9);
    assert_eq!(agg.appearance_count("apple"), 6);
    assert_eq!(agg.identities("apple").cloned().unwrap_or_default().into_iter().collect::<Vec<_>>(), vec![id]);

    let summary = session.final_summary();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary.rows()[0].total_unique_items, 1);
    assert_eq!(summary.rows()[0].frame_presence, "66.67");
    Ok(())
}

#[test]
fn two_apples_side_by_side_are_two_items() -> anyhow::Result<()> {
    let frames = vec![
        vec![det([10.0, 10.0, 50.0, 50.0], APPLE), det([120.0, 10.0, 160.0, 50.0], APPLE)];
        3
    ];

    let mut session = Session::new(script(frames), config(3))?;
    let mut reported = vec![];

    {
        let stream = session.stream(blank_frames(3));
        for event in stream {
            if let StreamEvent::Processed(p) = event? {
                reported.push(p.tracked.len());
            }
        }
    }

    assert_eq!(reported, vec![0, 0, 2]);
    assert_eq!(session.final_summary().rows()[0].total_unique_items, 2);
    assert_eq!(session.aggregator().snapshot().get("apple"), Some(&2));
    Ok(())
}

#[test]
fn identities_are_unique_and_counts_monotonic() -> anyhow::Result<()> {
    let mut frames = vec![];
    for f in 0..60u32 {
        let mut dets = vec![];
        for obj in 0..4u32 {
            // Each item blinks out now and then.
            if (f + obj) % 7 == 0 {
                continue;
            }
            let x = 5.0 + 45.0 * obj as f32 + (f as f32) * 0.5 * (obj + 1) as f32;
            let class_id = if obj % 2 == 0 { APPLE } else { ORANGE };
            dets.push(det([x, 20.0, x + 30.0, 60.0], class_id));
        }
        frames.push(dets);
    }

    let mut session = Session::new(script(frames), config(2))?;
    let mut last: BTreeMap<String, usize> = BTreeMap::new();

    let mut stream = session.stream(IterSource::new(vec![RgbImage::new(400, 100); 60]));
    while let Some(event) = stream.next() {
        let processed = match event? {
            StreamEvent::Processed(p) => p,
            StreamEvent::Skipped(_) => unreachable!("stride is 1"),
        };

        let ids: HashSet<_> = processed.tracked.iter().map(|t| t.track_id).collect();
        assert_eq!(ids.len(), processed.tracked.len(), "duplicate identity in output");

        for (label, &count) in &processed.snapshot {
            assert!(count >= last.get(label).copied().unwrap_or(0));
        }
        for (label, &count) in &last {
            assert!(processed.snapshot.get(label).copied().unwrap_or(0) >= count);
        }
        last = processed.snapshot;

        let agg = stream.session().aggregator();
        for label in last.keys() {
            assert!(agg.appearance_count(label) <= agg.frame_count());
        }
    }

    let summary = stream.finish()?;
    for row in summary.rows() {
        let pct: f64 = row.frame_presence.parse()?;
        assert!((0.0..=100.0).contains(&pct));
    }
    Ok(())
}

#[test]
fn skipped_frames_pass_through_untouched() -> anyhow::Result<()> {
    let images: Vec<_> = (0..10u8).map(|i| RgbImage::from_pixel(64, 64, Rgb([i * 20, 0, 0]))).collect();
    let frames = vec![vec![det([8.0, 8.0, 40.0, 40.0], APPLE)]; 10];

    let config = TillConfig {
        tracker: TrackerConfig { n_init: 1, ..Default::default() },
        frame_stride: 2,
        annotate: true,
        ..Default::default()
    };
    let mut session = Session::new(script(frames), config)?;

    let mut skipped = 0;
    let mut processed = 0;
    {
        let stream = session.stream(IterSource::new(images.clone()));
        for event in stream {
            match event? {
                StreamEvent::Skipped(frame) => {
                    assert_eq!(frame.index % 2, 0);
                    assert_eq!(frame.image, images[frame.index as usize]);
                    skipped += 1;
                }
                StreamEvent::Processed(p) => {
                    assert_eq!(p.frame.index % 2, 1);
                    assert_ne!(p.frame.image, images[p.frame.index as usize], "processed frames are annotated");
                    processed += 1;
                }
            }
        }
    }

    assert_eq!((skipped, processed), (5, 5));
    assert_eq!(session.aggregator().frame_count(), 5);
    assert_eq!(session.aggregator().appearance_count("apple"), 5);
    Ok(())
}

#[test]
fn new_stream_resets_statistics_and_identities() -> anyhow::Result<()> {
    let frames = vec![vec![det([10.0, 10.0, 50.0, 50.0], APPLE)]; 4];
    let mut session = Session::new(script(frames), config(1))?;

    session.stream(blank_frames(4)).finish()?;
    assert_eq!(session.aggregator().frame_count(), 4);

    session.reset();
    assert!(session.final_summary().is_empty());
    assert!(session.aggregator().snapshot().is_empty());

    let summary = session.stream(blank_frames(2)).finish()?;
    assert_eq!(session.aggregator().frame_count(), 2);
    assert_eq!(summary.rows()[0].frame_presence, "100.00");
    assert_eq!(session.aggregator().identities("apple").map(|ids| ids.iter().copied().collect::<Vec<_>>()), Some(vec![1]));
    Ok(())
}

#[test]
fn unreadable_label_font_fails_session_setup() {
    let config = TillConfig {
        label_font: Some(std::env::temp_dir().join("till-audit-no-such-font.ttf")),
        ..Default::default()
    };

    assert!(matches!(Session::new(script(vec![]), config), Err(Error::IoError(_))));

    let config = TillConfig {
        label_font: Some(std::env::temp_dir().join("till-audit-no-such-font.ttf")),
        annotate: false,
        ..Default::default()
    };

    assert!(Session::new(script(vec![]), config).is_ok());
}

#[test]
fn empty_session_has_empty_summary() -> anyhow::Result<()> {
    let mut session = Session::new(script(vec![]), config(3))?;

    let summary = session.stream(blank_frames(0)).finish()?;

    assert!(summary.is_empty());
    assert_eq!(session.aggregator().frame_count(), 0);
    Ok(())
}

#[test]
fn live_feed_is_processed_in_order() -> anyhow::Result<()> {
    let frames = vec![vec![det([10.0, 10.0, 50.0, 50.0], APPLE)]; 6];
    let mut session = Session::new(script(frames), config(1))?;
    let (feed, source) = live_feed(2);

    let camera = std::thread::spawn(move || {
        for _ in 0..6 {
            if !feed.push(RgbImage::new(80, 80)) {
                break;
            }
        }
    });

    let mut indices = vec![];
    {
        let stream = session.stream(source);
        for event in stream {
            indices.push(event?.frame().index);
        }
    }
    camera.join().map_err(|_| anyhow::anyhow!("camera thread panicked"))?;

    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(session.final_summary().rows()[0].total_unique_items, 1);
    Ok(())
}

struct CountingSource {
    pulled: Rc<Cell<u32>>,
    released: Rc<Cell<u32>>,
}

impl FrameSource for CountingSource {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.released.get() > 0 {
            return None;
        }
        let index = self.pulled.get();
        self.pulled.set(index + 1);
        Some(Frame::new(u64::from(index), RgbImage::new(16, 16)))
    }

    fn release(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

#[test]
fn dropping_the_stream_releases_an_endless_source() -> anyhow::Result<()> {
    let pulled = Rc::new(Cell::new(0));
    let released = Rc::new(Cell::new(0));
    let mut session = Session::new(script(vec![]), config(3))?;

    {
        let source = CountingSource { pulled: pulled.clone(), released: released.clone() };
        let mut stream = session.stream(source);
        for _ in 0..3 {
            stream.next().transpose()?;
        }
        assert_eq!(released.get(), 0);
    }

    assert_eq!(pulled.get(), 3);
    assert!(released.get() >= 1);
    assert_eq!(session.aggregator().frame_count(), 3);
    Ok(())
}

struct FailingDetector {
    names: Arc<ClassNames>,
    fail_at: u64,
}

impl Detector for FailingDetector {
    fn class_names(&self) -> Arc<ClassNames> {
        self.names.clone()
    }

    fn detect(&mut self, frame: &Frame, _confidence_threshold: f32) -> Result<Vec<Detection>, Error> {
        if frame.index == self.fail_at {
            Err(Error::ModelLoad("inference backend went away".into()))
        } else {
            Ok(vec![])
        }
    }
}

#[test]
fn detector_failure_stops_the_stream() -> anyhow::Result<()> {
    let detector = FailingDetector { names: Arc::new(ClassNames::coco()), fail_at: 2 };
    let mut session = Session::new(detector, config(3))?;

    let results: Vec<_> = session.stream(blank_frames(5)).collect();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok() && results[1].is_ok());
    assert!(results[2].is_err());
    assert_eq!(session.aggregator().frame_count(), 2);
    Ok(())
}
