use std::sync::Arc;

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use crate::detector::ClassNames;
use crate::error::Error;
use crate::sort::linear_assignment::{self, Assignment, MatchResult, INFTY_COST};
use crate::sort::{
    iou_matching, AppearanceConfig, BBox, Detection, DistanceMetric, KalmanFilter, Ltrb,
    NearestNeighborDistanceMetric, Track, TrackState,
};

/// Tracker policy.
///
/// ```text
/// max_iou_distance : Associations with `1 - IoU` above this value are
///     rejected.
/// max_age : Missed-frame budget. A lost track is deleted once it has gone
///     more than `max_age` frames without a match.
/// n_init : Number of hits before a track is confirmed. A tentative track
///     is deleted on its first miss.
/// assignment : Solver used for every association stage.
/// class_aware : When set, a track can only be matched with detections of
///     its own class. Otherwise the class is taken from the detection that
///     created the track and kept even if later matches disagree.
/// gating : Reject pairs outside the 95% Mahalanobis gate of the Kalman
///     prediction.
/// appearance : Enables appearance matching for detections that carry
///     feature vectors.
/// ```
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_iou_distance: f32,
    pub max_age: u32,
    pub n_init: u32,
    pub assignment: Assignment,
    pub class_aware: bool,
    pub gating: bool,
    pub appearance: Option<AppearanceConfig>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_iou_distance: 0.7,
            max_age: 30,
            n_init: 3,
            assignment: Assignment::Hungarian,
            class_aware: false,
            gating: true,
            appearance: None,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.max_iou_distance > 0.0 && self.max_iou_distance <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "max_iou_distance must be in (0, 1], got {}", self.max_iou_distance)));
        }

        if self.n_init == 0 {
            return Err(Error::InvalidConfig("n_init must be at least 1".into()));
        }

        if let Some(appearance) = &self.appearance {
            if !(appearance.max_cosine_distance > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "max_cosine_distance must be positive, got {}", appearance.max_cosine_distance)));
            }

            if appearance.budget == Some(0) {
                return Err(Error::InvalidConfig("appearance budget must be at least 1".into()));
            }
        }

        Ok(())
    }
}

/// A confirmed track as seen in the current frame.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedDetection {
    pub track_id: u64,
    pub bbox: BBox<Ltrb>,
    pub class_id: u32,
    pub label: Arc<str>,
    pub confidence: f32,
    pub state: TrackState,
    pub trace: Vec<(f32, f32)>,
}

impl TrackedDetection {
    fn from_track(track: &Track) -> Self {
        Self {
            track_id: track.track_id,
            bbox: track.bbox().as_ltrb(),
            class_id: track.class_id,
            label: track.label.clone(),
            confidence: track.confidence(),
            state: track.state(),
            trace: track.trace().copied().collect(),
        }
    }
}

/// This is the multi-target tracker.
///
/// ```text
/// Attributes
/// ----------
/// config : Association and lifecycle policy.
/// class_names : The detector's class table, used to label new tracks.
/// metric : Appearance metric, present when appearance matching is enabled.
/// kf : A Kalman filter to filter target trajectories in image space.
/// tracks : The list of live tracks, in ascending identity order.
/// next_id : Identity handed to the next track. Only `reset` rewinds it.
/// ```
///
#[derive(Clone, Debug)]
pub struct Tracker {
    config: TrackerConfig,
    class_names: Arc<ClassNames>,
    metric: Option<NearestNeighborDistanceMetric>,
    kf: KalmanFilter,
    tracks: Vec<Track>,
    next_id: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig, class_names: Arc<ClassNames>) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            metric: config.appearance.as_ref().map(NearestNeighborDistanceMetric::from_config),
            config,
            class_names,
            kf: Default::default(),
            next_id: 1,
            tracks: Vec::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Every live track, whatever its state.
    #[inline]
    pub fn tracks(&self) -> &[Track] {
        self.tracks.as_slice()
    }

    /// Drop all tracks and start handing out identities from 1 again.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;

        if let Some(metric) = &mut self.metric {
            metric.clear();
        }
    }

    ///
    /// Propagate track state distributions one time step forward.
    ///
    fn predict(&mut self) {
        for track in &mut self.tracks {
            track.predict(&self.kf);
        }
    }

    /// Advance one frame: predict, associate, update lifecycles.
    ///
    /// Returns the confirmed tracks that were matched in this frame, each
    /// identity at most once, in ascending identity order.
    ///
    pub fn update(&mut self, detections: &[Detection]) -> Result<Vec<TrackedDetection>, Error> {
        self.predict();

        let (matches, unmatched_tracks, unmatched_detections) = self.do_match(detections)?;

        for (track_idx, detection_idx) in matches {
            self.tracks[track_idx].update(&self.kf, &detections[detection_idx]);
        }

        for track_idx in unmatched_tracks {
            self.tracks[track_idx].mark_missed();
        }

        for detection_idx in unmatched_detections {
            self.initiate_track(&detections[detection_idx]);
        }

        self.tracks.retain(|t| !t.is_deleted());

        if let Some(metric) = &mut self.metric {
            let (
                mut features,
                mut targets,
                mut active_targets) = (vec![], vec![], vec![]);

            for track in &mut self.tracks {
                if !track.is_established() {
                    continue;
                }

                active_targets.push(track.track_id);

                for feature in track.features.drain(..) {
                    targets.push(track.track_id);
                    features.push(feature);
                }
            }

            metric.partial_fit(features, targets, active_targets);
        } else {
            for track in &mut self.tracks {
                track.features.clear();
            }
        }

        Ok(self.tracks
            .iter()
            .filter(|t| t.is_confirmed() && t.time_since_update == 0)
            .map(TrackedDetection::from_track)
            .collect())
    }

    fn do_match(&self, detections: &[Detection]) -> Result<MatchResult, Error> {
        let kf = &self.kf;
        let class_aware = self.config.class_aware;
        let gating = self.config.gating;

        let gate = |mut cost_matrix: Array2<f32>, tracks: &[Track], dets: &[Detection], track_indices: &[usize], detection_indices: &[usize]| {
            if gating {
                linear_assignment::gate_cost_matrix(
                    kf,
                    cost_matrix.view_mut(),
                    tracks,
                    dets,
                    track_indices,
                    detection_indices,
                    INFTY_COST,
                    false,
                );
            }

            if class_aware {
                gate_classes(cost_matrix.view_mut(), tracks, dets, track_indices, detection_indices);
            }

            cost_matrix
        };

        let gated_iou = |tracks: &[Track], dets: &[Detection], track_indices: &[usize], detection_indices: &[usize]| {
            let cost_matrix = iou_matching::iou_cost(tracks, dets, track_indices, detection_indices);
            gate(cost_matrix, tracks, dets, track_indices, detection_indices)
        };

        let plain_iou = |tracks: &[Track], dets: &[Detection], track_indices: &[usize], detection_indices: &[usize]| {
            let mut cost_matrix = iou_matching::iou_cost(tracks, dets, track_indices, detection_indices);

            if class_aware {
                gate_classes(cost_matrix.view_mut(), tracks, dets, track_indices, detection_indices);
            }

            cost_matrix
        };

        // Split track set into established (confirmed or lost) and tentative tracks.
        let (mut established_tracks, mut tentative_tracks) = (vec![], vec![]);
        for (i, t) in self.tracks.iter().enumerate() {
            if t.is_established() {
                established_tracks.push(i);
            } else {
                tentative_tracks.push(i);
            }
        }

        let all_detections: Vec<usize> = (0..detections.len()).collect();
        let max_age = self.config.max_age;
        let assignment = self.config.assignment;

        // Associate established tracks first, most recently seen first. Appearance is
        // used when every detection carries a feature vector of the dimension the
        // metric was fitted with, motion overlap otherwise.
        let use_appearance = match &self.metric {
            Some(metric) => {
                let first_dim = detections.first().and_then(|d| d.feature.as_ref()).map(|f| f.len());

                first_dim.is_some() && detections
                    .iter()
                    .all(|d| d.feature.as_ref().map_or(false, |f| Some(f.len()) == first_dim && metric.accepts(f)))
            }
            None => false,
        };

        let (matches_a, unmatched_tracks_a, unmatched_detections) = match (&self.metric, use_appearance) {
            (Some(metric), true) => {
                let gated_metric = |tracks: &[Track], dets: &[Detection], track_indices: &[usize], detection_indices: &[usize]| {
                    let dim = dets[detection_indices[0]].feature.as_ref().map_or(0, |f| f.len());
                    let mut features = Array2::zeros((detection_indices.len(), dim));

                    for (mut row, &idx) in features.axis_iter_mut(Axis(0)).zip(detection_indices) {
                        if let Some(feature) = &dets[idx].feature {
                            if feature.len() == dim {
                                row.assign(feature);
                            }
                        }
                    }

                    let targets: Vec<_> = track_indices.iter().map(|&i| tracks[i].track_id).collect();
                    let cost_matrix = metric.distance(features.view(), &targets);

                    gate(cost_matrix, tracks, dets, track_indices, detection_indices)
                };

                linear_assignment::matching_cascade(
                    &gated_metric,
                    metric.matching_threshold(),
                    assignment,
                    max_age,
                    &self.tracks,
                    detections,
                    established_tracks,
                    all_detections,
                )?
            }
            _ => linear_assignment::matching_cascade(
                &gated_iou,
                self.config.max_iou_distance,
                assignment,
                max_age,
                &self.tracks,
                detections,
                established_tracks,
                all_detections,
            )?,
        };

        // Associate remaining tracks together with tentative tracks using IOU.
        let (iou_track_candidates, unmatched_tracks_a): (Vec<_>, Vec<_>) = unmatched_tracks_a
            .into_iter()
            .partition(|&k| self.tracks[k].time_since_update == 1);

        let mut iou_track_candidates = [tentative_tracks.as_slice(), iou_track_candidates.as_slice()].concat();
        iou_track_candidates.sort_unstable();

        let (matches_b, unmatched_tracks_b, unmatched_detections) =
            linear_assignment::min_cost_matching(
                &plain_iou,
                self.config.max_iou_distance,
                assignment,
                &self.tracks,
                detections,
                iou_track_candidates,
                unmatched_detections)?;

        let matches = [matches_a, matches_b].concat();
        let mut unmatched_tracks = [unmatched_tracks_a, unmatched_tracks_b].concat();
        unmatched_tracks.sort_unstable();
        unmatched_tracks.dedup();

        Ok((matches, unmatched_tracks, unmatched_detections))
    }

    fn initiate_track(&mut self, detection: &Detection) {
        let (mean, covariance) = self.kf.initiate(&detection.bbox.as_xyah());
        let label = self.class_names.label(detection.class_id);

        tracing::debug!(track_id = self.next_id, label = %label, "track created");

        self.tracks.push(Track::new(
            mean,
            covariance,
            self.next_id,
            detection,
            label,
            self.config.n_init,
            self.config.max_age,
        ));

        self.next_id += 1;
    }
}

fn gate_classes(
    mut cost_matrix: ArrayViewMut2<'_, f32>,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
) {
    for (row, &track_idx) in track_indices.iter().enumerate() {
        let class_id = tracks[track_idx].class_id;

        for (col, &det_idx) in detection_indices.iter().enumerate() {
            if detections[det_idx].class_id != class_id {
                cost_matrix[(row, col)] = INFTY_COST;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tracker(n_init: u32) -> Tracker {
        let config = TrackerConfig { n_init, ..Default::default() };
        Tracker::new(config, Arc::new(ClassNames::coco())).unwrap()
    }

    fn apple(l: f32, t: f32, r: f32, b: f32) -> Detection {
        Detection::new(BBox::ltrb(l, t, r, b), 0.9, 47)
    }

    #[test]
    fn empty_tracker_spawns_one_track_per_detection() {
        let mut tracker = tracker(3);

        let out = tracker.update(&[apple(0., 0., 10., 10.), apple(100., 100., 120., 120.)]).unwrap();

        assert!(out.is_empty(), "tentative tracks are not reported");
        assert_eq!(tracker.tracks().len(), 2);
        assert_eq!(tracker.tracks()[0].track_id, 1);
        assert_eq!(tracker.tracks()[1].track_id, 2);
    }

    #[test]
    fn smooth_motion_keeps_identity() {
        let mut tracker = tracker(3);
        let mut ids = HashSet::new();

        for i in 0..20 {
            let x = 10.0 + 2.0 * i as f32;
            let out = tracker.update(&[apple(x, 10., x + 40., 50.)]).unwrap();

            if i >= 2 {
                assert_eq!(out.len(), 1);
                ids.insert(out[0].track_id);
            }
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(tracker.tracks().len(), 1);
    }

    #[test]
    fn empty_frames_age_out_tracks() {
        let config = TrackerConfig { n_init: 1, max_age: 3, ..Default::default() };
        let mut tracker = Tracker::new(config, Arc::new(ClassNames::coco())).unwrap();

        tracker.update(&[apple(0., 0., 10., 10.)]).unwrap();

        for _ in 0..3 {
            assert!(tracker.update(&[]).unwrap().is_empty());
            assert_eq!(tracker.tracks()[0].state(), TrackState::Lost);
        }

        tracker.update(&[]).unwrap();
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn flickering_class_keeps_original_label() {
        let mut tracker = tracker(1);

        let first = tracker.update(&[apple(10., 10., 50., 50.)]).unwrap();
        let orange = Detection::new(BBox::ltrb(11., 10., 51., 50.), 0.8, 49);
        let second = tracker.update(&[orange]).unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].track_id, first[0].track_id);
        assert_eq!(&*second[0].label, "apple");
    }

    #[test]
    fn class_aware_tracker_splits_on_class_change() {
        let config = TrackerConfig { n_init: 1, class_aware: true, ..Default::default() };
        let mut tracker = Tracker::new(config, Arc::new(ClassNames::coco())).unwrap();

        let first = tracker.update(&[apple(10., 10., 50., 50.)]).unwrap();
        let orange = Detection::new(BBox::ltrb(11., 10., 51., 50.), 0.8, 49);
        let second = tracker.update(&[orange]).unwrap();

        assert_ne!(second[0].track_id, first[0].track_id);
        assert_eq!(&*second[0].label, "orange");
    }

    #[test]
    fn reset_restarts_identities() {
        let mut tracker = tracker(1);

        tracker.update(&[apple(0., 0., 10., 10.)]).unwrap();
        tracker.reset();
        let out = tracker.update(&[apple(50., 50., 60., 60.)]).unwrap();

        assert_eq!(out[0].track_id, 1);
    }

    #[test]
    fn appearance_reclaims_identity() {
        let config = TrackerConfig {
            n_init: 1,
            appearance: Some(AppearanceConfig::default()),
            ..Default::default()
        };
        let mut tracker = Tracker::new(config, Arc::new(ClassNames::coco())).unwrap();

        let red = arr1(&[1.0f32, 0.0, 0.0]);
        let green = arr1(&[0.0f32, 1.0, 0.0]);

        let out = tracker.update(&[
            apple(10., 10., 50., 50.).with_feature(red.clone()),
            apple(100., 10., 140., 50.).with_feature(green.clone()),
        ]).unwrap();
        assert_eq!(out.len(), 2);

        let out = tracker.update(&[
            apple(12., 10., 52., 50.).with_feature(red),
            apple(102., 10., 142., 50.).with_feature(green),
        ]).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].track_id, 1);
        assert!(out[0].bbox.left() < 60.0);
        assert_eq!(out[1].track_id, 2);
        assert!(out[1].bbox.left() > 60.0);
    }

    #[test]
    fn feature_of_another_dimension_falls_back_to_overlap() {
        let config = TrackerConfig {
            n_init: 1,
            appearance: Some(AppearanceConfig::default()),
            ..Default::default()
        };
        let mut tracker = Tracker::new(config, Arc::new(ClassNames::coco())).unwrap();

        let first = tracker.update(&[
            apple(10., 10., 50., 50.).with_feature(arr1(&[1.0f32, 0.0, 0.0])),
        ]).unwrap();
        let second = tracker.update(&[
            apple(11., 10., 51., 50.).with_feature(arr1(&[1.0f32, 0.0, 0.0, 0.0])),
        ]).unwrap();
        let third = tracker.update(&[
            apple(12., 10., 52., 50.).with_feature(arr1(&[1.0f32, 0.0, 0.0])),
        ]).unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].track_id, first[0].track_id);
        assert_eq!(third[0].track_id, first[0].track_id);
        assert_eq!(tracker.tracks().len(), 1);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = TrackerConfig { n_init: 0, ..Default::default() };
        assert!(Tracker::new(config, Arc::new(ClassNames::coco())).is_err());
    }
}
