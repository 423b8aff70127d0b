use std::collections::{VecDeque, HashMap};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use crate::sort::DistanceMetric;
use crate::sort::linear_assignment::INFTY_COST;

// Compute pair-wise squared distance between points in `a` and `b`.
//
//     a : An NxM matrix of N samples of dimensionality M.
//     b : An LxM matrix of L samples of dimensionality M.
//
//     Returns a matrix of size len(a), len(b) such that element (i, j)
//     contains the squared distance between `a[i]` and `b[j]`.
//
fn pdist(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> Array2<f32> {
    if a.is_empty() || b.is_empty() {
        return Array2::zeros((a.nrows(), b.nrows()));
    }

    let (a2, b2) = (
        (&a * &a).sum_axis(Axis(1)).insert_axis(Axis(1)),
        (&b * &b).sum_axis(Axis(1)).insert_axis(Axis(0))
    );

    let mut r2 = -2.0 * a.dot(&b.t()) + a2 + b2;

    r2.mapv_inplace(|x| x.max(0.0));

    r2
}

/// Compute pair-wise cosine distance between points in `a` and `b`.
///
/// ```text
/// a : An NxM matrix of N samples of dimensionality M.
/// b : An LxM matrix of L samples of dimensionality M.
/// data_is_normalized : If true, assumes rows in a and b are unit length
///     vectors. Otherwise, a and b are explicitly normalized to length 1.
///
/// Returns a matrix of size len(a), len(b) such that element (i, j)
/// contains the cosine distance between `a[i]` and `b[j]`.
/// ```
///
fn cosine_distance(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>, data_is_normalized: bool) -> Array2<f32> {
    if data_is_normalized {
        -a.dot(&b.t()) + 1.0
    } else {
        let length_a = a.map_axis(Axis(1), |x| x.fold(0.0, |a, x| a + x * x).sqrt().max(f32::EPSILON));
        let length_b = b.map_axis(Axis(1), |x| x.fold(0.0, |a, x| a + x * x).sqrt().max(f32::EPSILON));

        let a = &a / &length_a.insert_axis(Axis(1));
        let b = &b / &length_b.insert_axis(Axis(1));

        -a.dot(&b.t()) + 1.0
    }
}

/// Helper function for nearest neighbor distance metric (Euclidean).
///
/// ```text
/// x : A matrix of N row-vectors (sample points).
/// y : A matrix of M row-vectors (query points).
///
/// Returns a vector of length M that contains for each entry in `y` the
/// smallest Euclidean distance to a sample in `x`.
/// ```
///
fn nn_euclidean_distance(x: ArrayView2<'_, f32>, y: ArrayView2<'_, f32>) -> Array1<f32> {
    let distances = pdist(x, y);

    distances.map_axis(Axis(0), |view| view.fold(f32::MAX, |a, &x| if x < a { x } else { a }))
        .mapv_into(|x| x.max(0.0))
}

/// Helper function for nearest neighbor distance metric (cosine).
///
/// ```text
/// x : A matrix of N row-vectors (sample points).
/// y : A matrix of M row-vectors (query points).
///
/// Returns a vector of length M that contains for each entry in `y` the
/// smallest cosine distance to a sample in `x`.
/// ```
///
fn nn_cosine_distance(x: ArrayView2<'_, f32>, y: ArrayView2<'_, f32>) -> Array1<f32> {
    let distances = cosine_distance(x, y, false);

    distances.map_axis(Axis(0), |view| view.fold(f32::MAX, |a, &x| if x < a { x } else { a }))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NearestNeighborMetricKind {
    EuclideanDistance,
    CosineDistance,
}

/// Appearance matching settings. Only used when the detector attaches
/// feature vectors to its detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceConfig {
    pub metric: NearestNeighborMetricKind,
    pub max_cosine_distance: f32,
    pub budget: Option<usize>,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            metric: NearestNeighborMetricKind::CosineDistance,
            max_cosine_distance: 0.2,
            budget: Some(100),
        }
    }
}

///
/// A nearest neighbor distance metric that, for each target, returns
/// the closest distance to any sample that has been observed so far.
///
/// ```text
/// Parameters
/// ----------
/// metric_kind : Euclidean or cosine.
/// matching_threshold : The matching threshold. Samples with larger
///     distance are considered an invalid match.
/// budget : If not None, fix samples per target to at most this number.
///     Removes the oldest samples when the budget is reached.
///
/// Attributes
/// ----------
/// samples : A map from target identities to the samples that have been
///     observed so far, newest first.
/// feature_dim : Length of the first sample ever fitted. Samples of any
///     other length are dropped until `clear`.
/// ```
///
#[derive(Clone, Debug)]
pub struct NearestNeighborDistanceMetric {
    metric_kind: NearestNeighborMetricKind,
    matching_threshold: f32,
    budget: Option<usize>,
    samples: HashMap<u64, VecDeque<Array1<f32>>>,
    feature_dim: Option<usize>,
}

impl NearestNeighborDistanceMetric {
    pub fn new(metric_kind: NearestNeighborMetricKind, matching_threshold: f32, budget: Option<usize>) -> Self {
        Self {
            metric_kind,
            matching_threshold,
            budget,
            samples: Default::default(),
            feature_dim: None,
        }
    }

    #[inline]
    pub fn from_config(config: &AppearanceConfig) -> Self {
        Self::new(config.metric, config.max_cosine_distance, config.budget)
    }

    /// Dimensionality of stored samples, once the first one has been fitted.
    #[inline]
    pub fn feature_dim(&self) -> Option<usize> {
        self.feature_dim
    }

    /// Whether `feature` can be compared against the stored samples.
    #[inline]
    pub fn accepts(&self, feature: &Array1<f32>) -> bool {
        self.feature_dim.map_or(true, |dim| dim == feature.len())
    }

    #[inline]
    pub fn has_samples(&self, target: u64) -> bool {
        self.samples.get(&target).map_or(false, |s| !s.is_empty())
    }
}

impl DistanceMetric for NearestNeighborDistanceMetric {
    #[inline]
    fn matching_threshold(&self) -> f32 {
        self.matching_threshold
    }

    fn partial_fit(&mut self, features: Vec<Array1<f32>>, targets: Vec<u64>, active_targets: Vec<u64>) {
        for (feature, target) in features.into_iter().zip(targets.into_iter()) {
            let dim = *self.feature_dim.get_or_insert(feature.len());
            if feature.len() != dim {
                tracing::warn!(track_id = target, expected = dim, got = feature.len(), "dropping feature of wrong dimension");
                continue;
            }

            let deque = self.samples
                .entry(target)
                .or_insert_with(VecDeque::new);

            deque.push_front(feature);

            if let Some(budget) = self.budget {
                deque.truncate(budget);
            }
        }

        let new_samples = active_targets
            .into_iter()
            .filter_map(|k| Some((k, self.samples.remove(&k)?)))
            .collect();

        self.samples = new_samples;
    }

    fn distance(&self, features: ArrayView2<'_, f32>, targets: &[u64]) -> Array2<f32> {
        let ntargets = targets.len();
        let nfeatures = features.nrows();
        let n = nfeatures.max(ntargets);

        let mut cost_matrix = Array2::from_elem((n, n), INFTY_COST);

        for (i, target) in targets.iter().enumerate() {
            let sample_features_deq: Vec<_> = match self.samples.get(target) {
                Some(deq) => deq.iter().filter(|arr| arr.len() == features.ncols()).collect(),
                None => continue,
            };

            if sample_features_deq.is_empty() {
                continue;
            }

            let mut sample_features = Array2::zeros((sample_features_deq.len(), features.ncols()));
            sample_features_deq
                .iter()
                .enumerate()
                .for_each(|(idx, arr)| sample_features.index_axis_mut(Axis(0), idx).assign(*arr));

            cost_matrix
                .slice_mut(s![i, ..nfeatures])
                .assign(&match self.metric_kind {
                    NearestNeighborMetricKind::EuclideanDistance => nn_euclidean_distance(sample_features.view(), features),
                    NearestNeighborMetricKind::CosineDistance => nn_cosine_distance(sample_features.view(), features),
                });
        }

        cost_matrix
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.feature_dim = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_of_parallel_vectors_is_zero() {
        let d = cosine_distance(aview2(&[[1.0f32, 2., 3.]]), aview2(&[[2., 4., 6.], [-1., -2., -3.]]), false);

        assert!(d[(0, 0)].abs() < 1e-6);
        assert!((d[(0, 1)] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn distance_uses_closest_sample_of_active_targets() {
        let mut metric = NearestNeighborDistanceMetric::new(NearestNeighborMetricKind::CosineDistance, 0.2, Some(2));

        metric.partial_fit(
            vec![arr1(&[1.0, 0.0]), arr1(&[0.0, 1.0]), arr1(&[1.0, 1.0])],
            vec![1, 1, 2],
            vec![1],
        );

        assert!(metric.has_samples(1));
        assert!(!metric.has_samples(2));

        let cost = metric.distance(aview2(&[[0.0f32, 2.0]]), &[1, 2]);

        assert_eq!(cost.dim(), (2, 2));
        assert!(cost[(0, 0)].abs() < 1e-6);
        assert_eq!(cost[(1, 0)], INFTY_COST);
    }

    #[test]
    fn samples_of_another_dimension_are_ignored() {
        let mut metric = NearestNeighborDistanceMetric::new(NearestNeighborMetricKind::CosineDistance, 0.2, None);

        metric.partial_fit(vec![arr1(&[1.0, 0.0, 0.0])], vec![1], vec![1]);
        metric.partial_fit(vec![arr1(&[1.0, 0.0, 0.0, 0.0])], vec![1], vec![1]);

        assert_eq!(metric.feature_dim(), Some(3));
        assert!(!metric.accepts(&arr1(&[1.0, 0.0, 0.0, 0.0])));

        let cost = metric.distance(aview2(&[[1.0f32, 0.0, 0.0, 0.0]]), &[1]);
        assert_eq!(cost[(0, 0)], INFTY_COST);

        let cost = metric.distance(aview2(&[[1.0f32, 0.0, 0.0]]), &[1]);
        assert!(cost[(0, 0)].abs() < 1e-6);

        metric.clear();
        assert_eq!(metric.feature_dim(), None);
    }
}
