use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use crate::detector::ClassNames;
use crate::sort::TrackedDetection;

/// Unique items seen so far per class label. Only classes with at least one
/// identity appear.
pub type LiveSnapshot = BTreeMap<String, usize>;

/// One line of the end-of-session table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub class_label: String,
    pub total_unique_items: usize,
    /// Share of processed frames in which the class was present, `"%.2f"`.
    pub frame_presence: String,
}

impl SummaryRow {
    /// The label with its first letter upper-cased, the way the table shows it.
    pub fn display_name(&self) -> String {
        let mut chars = self.class_label.chars();

        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Final per-class statistics, sorted by class label.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Summary(Vec<SummaryRow>);

impl Summary {
    #[inline]
    pub fn rows(&self) -> &[SummaryRow] {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl IntoIterator for Summary {
    type Item = SummaryRow;
    type IntoIter = std::vec::IntoIter<SummaryRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const HEADERS: [&str; 3] = ["Object Class", "Total Unique Items", "Frame Presence (%)"];

        let names: Vec<_> = self.0.iter().map(SummaryRow::display_name).collect();
        let class_width = names
            .iter()
            .map(|n| n.chars().count())
            .chain(std::iter::once(HEADERS[0].len()))
            .max()
            .unwrap_or(0);

        writeln!(f, "{:<cw$}  {:>18}  {:>18}", HEADERS[0], HEADERS[1], HEADERS[2], cw = class_width)?;

        for (name, row) in names.iter().zip(&self.0) {
            writeln!(
                f,
                "{:<cw$}  {:>18}  {:>18}",
                name,
                row.total_unique_items,
                row.frame_presence,
                cw = class_width,
            )?;
        }

        Ok(())
    }
}

/// Per-session statistics over confirmed tracks.
///
/// ```text
/// Attributes
/// ----------
/// frame_count : Frames recorded since the last reset.
/// class_appearance_count : For each class label, the number of frames in
///     which at least one confirmed track of that class was present.
/// unique_identities_per_class : For each class label, every track
///     identity ever confirmed for it. Only grows until the next reset.
/// ```
///
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    class_names: Arc<ClassNames>,
    frame_count: u64,
    class_appearance_count: BTreeMap<String, u64>,
    unique_identities_per_class: BTreeMap<String, BTreeSet<u64>>,
}

impl SessionAggregator {
    pub fn new(class_names: Arc<ClassNames>) -> Self {
        Self {
            class_names,
            frame_count: 0,
            class_appearance_count: BTreeMap::new(),
            unique_identities_per_class: BTreeMap::new(),
        }
    }

    /// Forget everything recorded so far. Called once at the start of every stream.
    pub fn reset(&mut self) {
        self.frame_count = 0;
        self.class_appearance_count.clear();
        self.unique_identities_per_class.clear();
    }

    /// Fold one processed frame into the session and return the live snapshot.
    ///
    /// A class present several times in the frame still counts as one frame
    /// of presence.
    pub fn record_frame(&mut self, tracked: &[TrackedDetection]) -> LiveSnapshot {
        self.frame_count += 1;

        let mut present = BTreeSet::new();

        for det in tracked {
            let label = self.class_names.label(det.class_id);

            self.unique_identities_per_class
                .entry(label.to_string())
                .or_default()
                .insert(det.track_id);

            present.insert(label);
        }

        for label in present {
            *self.class_appearance_count.entry(label.to_string()).or_insert(0) += 1;
        }

        self.snapshot()
    }

    /// Current unique-item count per class.
    pub fn snapshot(&self) -> LiveSnapshot {
        self.unique_identities_per_class
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(label, ids)| (label.clone(), ids.len()))
            .collect()
    }

    /// Per-class totals and presence percentages. Empty when no frame was recorded.
    pub fn final_summary(&self) -> Summary {
        if self.frame_count == 0 {
            return Summary::default();
        }

        let rows = self.unique_identities_per_class
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(label, ids)| {
                let appearances = self.appearance_count(label);
                let presence = appearances as f64 / self.frame_count as f64 * 100.0;

                SummaryRow {
                    class_label: label.clone(),
                    total_unique_items: ids.len(),
                    frame_presence: format!("{:.2}", presence),
                }
            })
            .collect();

        Summary(rows)
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn appearance_count(&self, label: &str) -> u64 {
        self.class_appearance_count.get(label).copied().unwrap_or(0)
    }

    #[inline]
    pub fn identities(&self, label: &str) -> Option<&BTreeSet<u64>> {
        self.unique_identities_per_class.get(label)
    }
}
