pub mod aggregator;

pub use aggregator::{LiveSnapshot, SessionAggregator, Summary, SummaryRow};

use crate::config::TillConfig;
use crate::detector::{self, ClassNames, Detector};
use crate::error::Error;
use crate::sort::{TrackedDetection, Tracker};
use crate::stream::annotate::{self, Labeler};
use crate::stream::{Frame, FrameSource, Stream};
use std::sync::Arc;

/// Result of running one frame through the session.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// The input frame, annotated when the session is configured to draw.
    pub frame: Frame,
    /// Confirmed tracks matched in this frame.
    pub tracked: Vec<TrackedDetection>,
    /// Unique items per class seen so far in the session.
    pub snapshot: LiveSnapshot,
}

/// One auditing session: a detector, the tracker and the statistics it feeds.
///
/// A session serves one stream at a time. Separate cameras need separate
/// sessions; nothing is shared between them.
pub struct Session<D: Detector> {
    config: TillConfig,
    class_names: Arc<ClassNames>,
    detector: D,
    tracker: Tracker,
    aggregator: SessionAggregator,
    labeler: Option<Labeler>,
}

impl<D: Detector> Session<D> {
    pub fn new(detector: D, config: TillConfig) -> Result<Self, Error> {
        config.validate()?;

        let class_names = detector.class_names();
        let labeler = match &config.label_font {
            Some(path) if config.annotate => Some(Labeler::from_file(path)?),
            _ => None,
        };

        Ok(Self {
            tracker: Tracker::new(config.tracker.clone(), class_names.clone())?,
            aggregator: SessionAggregator::new(class_names.clone()),
            class_names,
            detector,
            labeler,
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &TillConfig {
        &self.config
    }

    #[inline]
    pub fn class_names(&self) -> &Arc<ClassNames> {
        &self.class_names
    }

    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    #[inline]
    pub fn aggregator(&self) -> &SessionAggregator {
        &self.aggregator
    }

    #[inline]
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Start over: no tracks, no statistics, identities from 1.
    pub fn reset(&mut self) {
        tracing::debug!("session reset");
        self.tracker.reset();
        self.aggregator.reset();
    }

    /// Detect, track and record a single frame.
    pub fn process_frame(&mut self, mut frame: Frame) -> Result<ProcessedFrame, Error> {
        let threshold = self.config.confidence_threshold;
        let detections = detector::prune(self.detector.detect(&frame, threshold)?, threshold);

        let tracked = self.tracker.update(&detections)?;
        let snapshot = self.aggregator.record_frame(&tracked);

        tracing::trace!(
            frame = frame.index,
            detections = detections.len(),
            tracked = tracked.len(),
            "frame processed"
        );

        if self.config.annotate {
            annotate::annotate(&mut frame.image, &tracked, self.labeler.as_ref());
        }

        Ok(ProcessedFrame { frame, tracked, snapshot })
    }

    /// Begin consuming `source` as a new stream. Resets the session.
    #[inline]
    pub fn stream<S: FrameSource>(&mut self, source: S) -> Stream<'_, D, S> {
        Stream::new(self, source)
    }

    #[inline]
    pub fn final_summary(&self) -> Summary {
        self.aggregator.final_summary()
    }
}
