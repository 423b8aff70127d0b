use ndarray::prelude::*;
use crate::sort::{BBox, Ltrb};

///
/// This struct represents a bounding box detection in a single image.
///
/// bbox : BBox in format `(x_min, y_min, x_max, y_max)`.
/// confidence : f32 - Detector confidence score in `[0, 1]`.
/// class_id : u32 - Index into the detector's class name table.
/// feature : Option<Array1<f32>> An appearance vector describing the object, when
///     the detector runs a re-identification embedder.
///
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BBox<Ltrb>,
    pub confidence: f32,
    pub class_id: u32,
    pub feature: Option<Array1<f32>>
}

impl Detection {
    #[inline]
    pub fn new(bbox: BBox<Ltrb>, confidence: f32, class_id: u32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            feature: None,
        }
    }

    #[inline]
    pub fn with_feature(mut self, feature: Array1<f32>) -> Self {
        self.feature = Some(feature);
        self
    }

    /// A box the tracker can use: finite coordinates and a positive area.
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.bbox.is_finite()
            && self.confidence.is_finite()
            && self.bbox.width() > 0.0
            && self.bbox.height() > 0.0
    }
}
