use std::collections::HashSet;

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use crate::error::Error;
use crate::sort::kalman_filter::{Measurement, CHI_2_INV_95};
use crate::sort::{Track, Detection, KalmanFilter};

pub const INFTY_COST: f32 = 1e+5;

// Total cost added across all rows to break ties in favour of earlier rows.
const TIE_BREAK_SPAN: f32 = 1e-4;

/// Result of an assignment: matched `(track, detection)` index pairs,
/// unmatched track indices and unmatched detection indices.
pub type MatchResult = (Vec<(usize, usize)>, Vec<usize>, Vec<usize>);

/// Strategy used to solve the track/detection assignment problem.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assignment {
    /// Globally optimal assignment (Kuhn-Munkres).
    Hungarian,
    /// Repeatedly take the cheapest remaining pair.
    Greedy,
}

impl Default for Assignment {
    fn default() -> Self {
        Assignment::Hungarian
    }
}

/// Solve linear assignment problem.
///
/// Parameters
/// ----------
/// distance_metric : Fn(&[Track], &[Detection], &[usize], &[usize]) -> Array2<f32>
///     The distance metric is given a list of tracks and detections as well as
///     a list of N track indices and M detection indices. The metric should
///     return a square cost matrix of side at least max(N, M), where element
///     (i, j) is the association cost between the i-th track in the given
///     track indices and the j-th detection in the given detection_indices.
/// max_distance : Gating threshold. Associations with cost larger than this
///     value are disregarded.
/// assignment : Solver strategy.
/// tracks : A list of predicted tracks at the current time step.
/// detections : A list of detections at the current time step.
/// track_indices : Rows of the cost matrix. Callers pass them in ascending
///     track identity so equal-cost alternatives resolve the same way on
///     every run.
/// detection_indices : Columns of the cost matrix.
///
/// Returns
/// -------
/// * A list of matched track and detection indices.
/// * A list of unmatched track indices.
/// * A list of unmatched detection indices.
///
pub fn min_cost_matching<D: Fn(&[Track], &[Detection], &[usize], &[usize]) -> Array2<f32>>(
    distance_metric: &D,
    max_distance: f32,
    assignment: Assignment,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: Vec<usize>,
    detection_indices: Vec<usize>,
) -> Result<MatchResult, Error> {
    if detection_indices.is_empty() || track_indices.is_empty() {
        return Ok((vec![], track_indices, detection_indices));  // Nothing to match.
    }

    let mut cost_matrix = distance_metric(tracks, detections, &track_indices, &detection_indices);
    cost_matrix.mapv_inplace(|x| if x > max_distance || x.is_nan() { max_distance + 1.0e-5 } else { x });

    let pairs = match assignment {
        Assignment::Hungarian => solve_hungarian(&cost_matrix, track_indices.len(), detection_indices.len(), max_distance)?,
        Assignment::Greedy => solve_greedy(&cost_matrix, track_indices.len(), detection_indices.len(), max_distance),
    };

    let mut row_taken = vec![false; track_indices.len()];
    let mut col_taken = vec![false; detection_indices.len()];
    let mut matches = vec![];

    for (row, column) in pairs {
        if row >= track_indices.len() || column >= detection_indices.len() {
            continue;
        }

        if cost_matrix[(row, column)] > max_distance {
            continue;
        }

        row_taken[row] = true;
        col_taken[column] = true;
        matches.push((track_indices[row], detection_indices[column]));
    }

    let unmatched_tracks = track_indices
        .iter()
        .zip(row_taken)
        .filter_map(|(&idx, taken)| if taken { None } else { Some(idx) })
        .collect();

    let unmatched_detections = detection_indices
        .iter()
        .zip(col_taken)
        .filter_map(|(&idx, taken)| if taken { None } else { Some(idx) })
        .collect();

    Ok((matches, unmatched_tracks, unmatched_detections))
}

// Every row of the padded matrix gets assigned, so a flat per-row bias would
// cancel out. Only feasible pairs are biased, making a real match cheaper the
// earlier its row is.
fn solve_hungarian(cost_matrix: &Array2<f32>, rows: usize, cols: usize, max_distance: f32) -> Result<Vec<(usize, usize)>, Error> {
    let step = TIE_BREAK_SPAN / rows.max(1) as f32;
    let mut biased = cost_matrix.clone();

    for ((row, col), cost) in biased.indexed_iter_mut() {
        if row < rows && col < cols && *cost <= max_distance {
            *cost += step * row as f32;
        }
    }

    let mut weights = munkres::WeightMatrix::from_row_vec(biased.nrows(), biased.iter().copied().collect());
    let indices = munkres::solve_assignment(&mut weights)
        .map_err(|err| Error::Assignment(format!("{:?}", err)))?;

    Ok(indices.into_iter().map(|pos| (pos.row, pos.column)).collect())
}

// Candidates are visited by ascending cost, then row (track order), then column.
fn solve_greedy(cost_matrix: &Array2<f32>, rows: usize, cols: usize, max_distance: f32) -> Vec<(usize, usize)> {
    let mut candidates: Vec<(f32, usize, usize)> = Vec::with_capacity(rows * cols);

    for row in 0..rows {
        for col in 0..cols {
            let cost = cost_matrix[(row, col)];
            if cost <= max_distance {
                candidates.push((cost, row, col));
            }
        }
    }

    candidates.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut row_taken = vec![false; rows];
    let mut col_taken = vec![false; cols];
    let mut pairs = vec![];

    for (_, row, col) in candidates {
        if row_taken[row] || col_taken[col] {
            continue;
        }

        row_taken[row] = true;
        col_taken[col] = true;
        pairs.push((row, col));
    }

    pairs
}

/// Run matching cascade.
///
/// Tracks are matched level by level, starting with those updated in the
/// previous frame, so that recently seen tracks get first pick of the
/// detections.
///
/// Parameters
/// ----------
/// distance_metric : see `min_cost_matching`.
/// max_distance : Gating threshold.
/// cascade_depth : The cascade depth, should be set to the maximum track age.
/// tracks : A list of predicted tracks at the current time step.
/// detections : A list of detections at the current time step.
/// track_indices : Tracks taking part in the cascade.
/// detection_indices : Detections available to the cascade.
///
/// Returns
/// -------
/// * A list of matched track and detection indices.
/// * A list of unmatched track indices, in ascending order.
/// * A list of unmatched detection indices.
///
pub fn matching_cascade<D: Fn(&[Track], &[Detection], &[usize], &[usize]) -> Array2<f32>>(
    distance_metric: &D,
    max_distance: f32,
    assignment: Assignment,
    cascade_depth: u32,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: Vec<usize>,
    detection_indices: Vec<usize>,
) -> Result<MatchResult, Error> {
    let mut unmatched_detections = detection_indices;
    let mut matches = vec![];

    for level in 0..cascade_depth {
        if unmatched_detections.is_empty() { // No detections left
            break;
        }

        let track_indices_l: Vec<_> = track_indices
            .iter()
            .copied()
            .filter(|&idx| tracks[idx].time_since_update == 1 + level)
            .collect();

        if track_indices_l.is_empty() {  // Nothing to match at this level
            continue;
        }

        let (mut matches_l, _, unmatched_detections_new) = min_cost_matching(
            distance_metric, max_distance, assignment, tracks, detections,
            track_indices_l, unmatched_detections)?;

        unmatched_detections = unmatched_detections_new;

        matches.append(&mut matches_l);
    }

    let matched_tracks: HashSet<_> = matches.iter().map(|&(k, _)| k).collect();

    let unmatched_tracks: Vec<usize> = track_indices
        .into_iter()
        .filter(|k| !matched_tracks.contains(k))
        .collect();

    Ok((matches, unmatched_tracks, unmatched_detections))
}

/// Invalidate infeasible entries in cost matrix based on the state distributions obtained by Kalman filtering.
///
/// Parameters
/// ----------
/// kf : The Kalman filter.
/// cost_matrix : The cost matrix, where entry (i, j) is the association cost
///     between `tracks[track_indices[i]]` and `detections[detection_indices[j]]`.
/// tracks : A list of predicted tracks at the current time step.
/// detections : A list of detections at the current time step.
/// track_indices : Rows of `cost_matrix`.
/// detection_indices : Columns of `cost_matrix`.
/// gated_cost : Entries corresponding to infeasible associations are set to
///     this value.
/// only_position : If true, only the x, y position of the state distribution
///     is considered during gating.
///
pub fn gate_cost_matrix(
    kf: &KalmanFilter,
    mut cost_matrix: ArrayViewMut2<'_, f32>,
    tracks: &[Track],
    detections: &[Detection],
    track_indices: &[usize],
    detection_indices: &[usize],
    gated_cost: f32,
    only_position: bool)
{
    let gating_dim = if only_position {1} else {3}; // indexes for 2 and 4 dims respectivly
    let gating_threshold = CHI_2_INV_95[gating_dim];

    let measurements: Vec<Measurement> = detection_indices
        .iter()
        .map(|&idx| Measurement::from_column_slice(&detections[idx].bbox.as_xyah().as_array()))
        .collect();

    for (row, &track_idx) in track_indices.iter().enumerate() {
        let track = &tracks[track_idx];
        let gating_distance = kf.gating_distance(
            track.mean(), track.covariance(), &measurements, only_position);

        let mut axis = cost_matrix.index_axis_mut(Axis(0), row);

        for (idx, distance) in gating_distance.into_iter().enumerate() {
            if distance > gating_threshold {
                axis[idx] = gated_cost;
            }
        }
    }
}
