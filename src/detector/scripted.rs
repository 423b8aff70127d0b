use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use crate::detector::{ClassNames, Detector};
use crate::error::Error;
use crate::sort::{BBox, Detection};
use crate::stream::Frame;

/// One detection as stored in a script, box in `(x_min, y_min, x_max, y_max)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedDetection {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<Vec<f32>>,
}

/// Every detection recorded for one frame index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedFrame {
    pub frame: u64,
    #[serde(default)]
    pub detections: Vec<ScriptedDetection>,
}

impl From<&ScriptedDetection> for Detection {
    fn from(d: &ScriptedDetection) -> Self {
        let [l, t, r, b] = d.bbox;
        let detection = Detection::new(BBox::ltrb(l, t, r, b), d.confidence, d.class_id);

        match &d.feature {
            Some(feature) => detection.with_feature(Array1::from(feature.clone())),
            None => detection,
        }
    }
}

/// Replays detections recorded earlier, keyed by frame index.
///
/// Stands in for a live model when auditing recorded footage whose
/// detections were computed offline, and in tests. Frames without a record
/// yield no detections.
#[derive(Debug, Clone)]
pub struct ScriptedDetector {
    class_names: Arc<ClassNames>,
    frames: HashMap<u64, Vec<ScriptedDetection>>,
}

impl ScriptedDetector {
    pub fn new<I>(class_names: ClassNames, frames: I) -> Self
    where
        I: IntoIterator<Item = ScriptedFrame>,
    {
        let mut map: HashMap<u64, Vec<ScriptedDetection>> = HashMap::new();

        for frame in frames {
            map.entry(frame.frame).or_default().extend(frame.detections);
        }

        Self {
            class_names: Arc::new(class_names),
            frames: map,
        }
    }

    /// Load a JSON-lines script, one `ScriptedFrame` per line. Blank lines are
    /// skipped. A missing or malformed file fails the load.
    pub fn from_json_lines<P: AsRef<Path>>(path: P, class_names: ClassNames) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|err| Error::ModelLoad(format!("{}: {}", path.display(), err)))?;

        let mut frames = Vec::new();

        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            let frame: ScriptedFrame = serde_json::from_str(line)
                .map_err(|err| Error::ModelLoad(format!("{}:{}: {}", path.display(), lineno + 1, err)))?;

            frames.push(frame);
        }

        tracing::info!(path = %path.display(), frames = frames.len(), "loaded detection script");

        Ok(Self::new(class_names, frames))
    }

    /// Number of frames with at least one recorded detection.
    #[inline]
    pub fn scripted_frames(&self) -> usize {
        self.frames.values().filter(|d| !d.is_empty()).count()
    }
}

impl Detector for ScriptedDetector {
    #[inline]
    fn class_names(&self) -> Arc<ClassNames> {
        self.class_names.clone()
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>, Error> {
        Ok(self.frames
            .get(&frame.index)
            .map(|dets| {
                dets.iter()
                    .filter(|d| d.confidence >= confidence_threshold)
                    .map(Detection::from)
                    .collect()
            })
            .unwrap_or_default())
    }
}
