//! Visual auditing for point-of-sale checkouts.
//!
//! Frames of a till camera go through a [`Detector`], a multi-object
//! [`Tracker`](sort::Tracker) that gives every item a persistent identity, and a
//! [`SessionAggregator`] that counts distinct items and their frame presence
//! per class.
//!
//! ```no_run
//! use till_audit::{ClassNames, ImageSequenceSource, ScriptedDetector, Session, TillConfig};
//!
//! # fn main() -> Result<(), till_audit::error::Error> {
//! let detector = ScriptedDetector::from_json_lines("detections.jsonl", ClassNames::coco())?;
//! let mut session = Session::new(detector, TillConfig::default())?;
//!
//! let summary = session.stream(ImageSequenceSource::open("frames")?).finish()?;
//! print!("{}", summary);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod session;
pub mod sort;
pub mod stream;

pub use config::TillConfig;
pub use detector::{ClassNames, Detector, ScriptedDetector};
pub use session::{LiveSnapshot, ProcessedFrame, Session, SessionAggregator, Summary, SummaryRow};
pub use sort::{Detection, Track, TrackState, TrackedDetection, Tracker, TrackerConfig};
pub use stream::{
    live_feed, Frame, FrameSource, ImageSequenceSource, IterSource, Labeler, LiveFeed, LiveSource,
    Stream, StreamEvent,
};
