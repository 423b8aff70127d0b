use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use crate::error::Error;
use crate::sort::TrackerConfig;

/// Everything a session needs besides its detector.
///
/// ```text
/// tracker : Association and track lifecycle policy.
/// confidence_threshold : Detections below this score never reach the tracker.
/// frame_stride : Process one frame out of every `frame_stride`; the others
///     are passed through untouched. `1` processes every frame.
/// annotate : Draw tracked boxes and traces onto processed frames.
/// label_font : Font file for `#<id> <label>` captions next to each box.
///     Without one, only boxes and traces are drawn.
/// ```
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TillConfig {
    pub tracker: TrackerConfig,
    pub confidence_threshold: f32,
    pub frame_stride: u32,
    pub annotate: bool,
    pub label_font: Option<PathBuf>,
}

impl Default for TillConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            confidence_threshold: 0.5,
            frame_stride: 1,
            annotate: true,
            label_font: None,
        }
    }
}

impl TillConfig {
    /// Read a JSON config. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "confidence_threshold must be in [0, 1], got {}", self.confidence_threshold)));
        }

        if self.frame_stride == 0 {
            return Err(Error::InvalidConfig("frame_stride must be at least 1".into()));
        }

        self.tracker.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Assignment;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: TillConfig = serde_json::from_str(r#"{
            "frame_stride": 2,
            "tracker": { "n_init": 2, "assignment": "greedy" }
        }"#).unwrap();

        assert_eq!(config.frame_stride, 2);
        assert_eq!(config.tracker.n_init, 2);
        assert_eq!(config.tracker.max_age, 30);
        assert_eq!(config.tracker.assignment, Assignment::Greedy);
        assert_eq!(config.confidence_threshold, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = TillConfig { confidence_threshold: 1.5, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = TillConfig { frame_stride: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
