use std::collections::VecDeque;
use std::sync::Arc;

use ndarray::prelude::*;
use crate::sort::kalman_filter::{StateCovariance, StateMean, Measurement};
use crate::sort::{Detection, KalmanFilter, BBox, Xyah};

/// Number of past box centres kept per track for drawing motion traces.
pub const TRACE_LENGTH: usize = 30;

///
///   Enumeration type for the single target track state. Newly created tracks are
///   classified as `Tentative` until enough evidence has been collected. Then,
///   the track state is changed to `Confirmed`. A confirmed track that misses a
///   frame becomes `Lost` and returns to `Confirmed` when it is matched again.
///   Tracks that are no longer alive are classified as `Deleted` to mark them
///   for removal from the set of active tracks.
///
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Lost,
    Deleted,
}

///
///     A single target track with state space `(x, y, a, h)` and associated
///     velocities, where `(x, y)` is the center of the bounding box, `a` is the
///     aspect ratio and `h` is the height.
///
///     Attributes
///     ----------
///     track_id : u64
///         A unique track identifier, never reissued within a session.
///     class_id, label :
///         Class of the detection that created the track. Fixed for the
///         lifetime of the track.
///     hits : Total number of measurement updates.
///     age : Total number of frames since first occurrence.
///     time_since_update : Total number of frames since last measurement update.
///     state : The current track state.
///     features : A cache of appearance features. On each measurement update,
///         the associated feature vector is added to this list.
///
#[derive(Clone, Debug)]
pub struct Track {
    pub track_id: u64,
    pub class_id: u32,
    pub label: Arc<str>,
    pub time_since_update: u32,
    pub features: Vec<Array1<f32>>,

    covariance: StateCovariance,
    mean: StateMean,
    confidence: f32,
    hits: u32,
    age: u32,
    state: TrackState,
    n_init: u32,
    max_age: u32,
    trace: VecDeque<(f32, f32)>,
}

impl Track {
    pub fn new(
        mean: StateMean,
        covariance: StateCovariance,
        track_id: u64,
        detection: &Detection,
        label: Arc<str>,
        n_init: u32,
        max_age: u32,
    ) -> Self {
        let state = if n_init <= 1 {
            TrackState::Confirmed
        } else {
            TrackState::Tentative
        };

        let mut trace = VecDeque::with_capacity(TRACE_LENGTH);
        trace.push_back(detection.bbox.center());

        Self {
            track_id,
            class_id: detection.class_id,
            label,
            mean,
            covariance,
            confidence: detection.confidence,
            hits: 1,
            age: 1,
            time_since_update: 0,
            state,
            features: detection.feature.clone().into_iter().collect(),
            n_init,
            max_age,
            trace,
        }
    }

    /// Get current position in bounding box format `(center x, center y, aspect, height)`.
    #[inline]
    pub fn bbox(&self) -> BBox<Xyah> {
        BBox::xyah(
            self.mean[0],
            self.mean[1],
            self.mean[2],
            self.mean[3],
        )
    }

    #[inline]
    pub fn mean(&self) -> &StateMean {
        &self.mean
    }

    #[inline]
    pub fn covariance(&self) -> &StateCovariance {
        &self.covariance
    }

    #[inline]
    pub fn state(&self) -> TrackState {
        self.state
    }

    #[inline]
    pub fn hits(&self) -> u32 {
        self.hits
    }

    #[inline]
    pub fn age(&self) -> u32 {
        self.age
    }

    /// Confidence of the last detection associated with this track.
    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Recent box centres, oldest first.
    #[inline]
    pub fn trace(&self) -> impl Iterator<Item = &(f32, f32)> {
        self.trace.iter()
    }

    /// Propagate the state distribution to the current time step using a
    /// Kalman filter prediction step.
    pub fn predict(&mut self, kf: &KalmanFilter) {
        let (mean, covariance) = kf.predict(&self.mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;
        self.age += 1;
        self.time_since_update += 1;
    }

    /// Perform Kalman filter measurement update step and update the feature cache.
    pub fn update(&mut self, kf: &KalmanFilter, detection: &Detection) {
        let measurement = Measurement::from_column_slice(&detection.bbox.as_xyah().as_array());

        match kf.update(&self.mean, &self.covariance, &measurement) {
            Some((mean, covariance)) => {
                self.mean = mean;
                self.covariance = covariance;
            }
            None => {
                tracing::warn!(track_id = self.track_id, "degenerate covariance, re-initiating track state");
                let (mean, covariance) = kf.initiate(&detection.bbox.as_xyah());
                self.mean = mean;
                self.covariance = covariance;
            }
        }

        self.features.extend(detection.feature.clone().into_iter());
        self.confidence = detection.confidence;

        if self.trace.len() == TRACE_LENGTH {
            self.trace.pop_front();
        }
        self.trace.push_back(detection.bbox.center());

        self.hits += 1;
        self.time_since_update = 0;

        match self.state {
            TrackState::Tentative if self.hits >= self.n_init => {
                tracing::debug!(track_id = self.track_id, label = %self.label, "track confirmed");
                self.state = TrackState::Confirmed;
            }
            TrackState::Lost => {
                tracing::debug!(track_id = self.track_id, label = %self.label, "track recovered");
                self.state = TrackState::Confirmed;
            }
            _ => {}
        }
    }

    ///
    /// Mark this track as missed (no association at the current time step).
    ///
    pub fn mark_missed(&mut self) {
        match self.state {
            TrackState::Tentative => {
                self.state = TrackState::Deleted;
            }
            TrackState::Confirmed | TrackState::Lost => {
                if self.time_since_update > self.max_age {
                    tracing::debug!(track_id = self.track_id, label = %self.label, "track deleted");
                    self.state = TrackState::Deleted;
                } else {
                    self.state = TrackState::Lost;
                }
            }
            TrackState::Deleted => {}
        }
    }

    ///
    /// Returns True if this track is tentative (unconfirmed).
    ///
    #[inline]
    pub fn is_tentative(&self) -> bool {
        self.state == TrackState::Tentative
    }

    ///
    /// Returns True if this track is confirmed and was matched in the current frame.
    ///
    #[inline]
    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    ///
    /// Returns True if this track has been confirmed at some point, matched now or not.
    ///
    #[inline]
    pub fn is_established(&self) -> bool {
        matches!(self.state, TrackState::Confirmed | TrackState::Lost)
    }

    ///
    /// Returns True if this track is dead and should be deleted.
    ///
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.state == TrackState::Deleted
    }
}
