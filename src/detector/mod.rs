pub mod scripted;

pub use scripted::ScriptedDetector;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use crate::error::Error;
use crate::sort::Detection;
use crate::stream::Frame;

/// Class names of the 80 COCO categories, in the order the YOLO family emits them.
pub const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Immutable class id to label table owned by a detector.
///
/// Shared with the tracker and the aggregator behind an `Arc`; nothing
/// mutates it after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassNames(Vec<Arc<str>>);

impl ClassNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(names.into_iter().map(|s| Arc::from(s.as_ref())).collect())
    }

    #[inline]
    pub fn coco() -> Self {
        Self::new(COCO_NAMES.iter())
    }

    #[inline]
    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.0.get(class_id as usize).map(|s| &**s)
    }

    /// Label for `class_id`; ids outside the table read as `class_<id>`.
    pub fn label(&self, class_id: u32) -> Arc<str> {
        match self.0.get(class_id as usize) {
            Some(name) => name.clone(),
            None => Arc::from(format!("class_{}", class_id)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An object detection model.
///
/// Implementations load their model in their constructor and report a
/// failure there; `detect` never sees an unloaded model. Finding nothing is
/// an empty list, not an error.
pub trait Detector {
    /// The table used to name this detector's class ids.
    fn class_names(&self) -> Arc<ClassNames>;

    /// Detect objects in `frame`. Implementations may already drop results below
    /// `confidence_threshold`; callers prune again with [`prune`] either way.
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>, Error>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    #[inline]
    fn class_names(&self) -> Arc<ClassNames> {
        (**self).class_names()
    }

    #[inline]
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>, Error> {
        (**self).detect(frame, confidence_threshold)
    }
}

/// Keep the detections the tracker may see: confidence at or above
/// `confidence_threshold` and a finite box with positive area.
pub fn prune(mut detections: Vec<Detection>, confidence_threshold: f32) -> Vec<Detection> {
    detections.retain(|d| d.is_well_formed() && d.confidence.min(1.0) >= confidence_threshold);

    for d in &mut detections {
        d.confidence = d.confidence.max(0.0).min(1.0);
    }

    detections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::BBox;

    #[test]
    fn labels_resolve_with_fallback() {
        let names = ClassNames::coco();

        assert_eq!(names.len(), 80);
        assert_eq!(&*names.label(47), "apple");
        assert_eq!(names.get(49), Some("orange"));
        assert_eq!(&*names.label(500), "class_500");
    }

    #[test]
    fn prune_drops_weak_and_degenerate_detections() {
        let detections = vec![
            Detection::new(BBox::ltrb(0., 0., 10., 10.), 0.9, 1),
            Detection::new(BBox::ltrb(0., 0., 10., 10.), 0.2, 1),
            Detection::new(BBox::ltrb(0., 0., 10., 10.), 0.5, 1),
            Detection::new(BBox::ltrb(10., 0., 10., 10.), 0.9, 1),
            Detection::new(BBox::ltrb(0., f32::NAN, 10., 10.), 0.9, 1),
            Detection::new(BBox::ltrb(0., 0., 10., 10.), 1.5, 1),
        ];

        let kept = prune(detections, 0.5);

        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|d| d.confidence >= 0.5 && d.confidence <= 1.0));
    }
}
