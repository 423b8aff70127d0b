use ndarray::prelude::*;

use crate::sort::{Track, Detection, BBox, Ltrb};

/// Computer intersection over union.
/// Parameters
/// ----------
/// bbox : A bounding box in format `(x_min, y_min, x_max, y_max)`.
/// candidates : Candidate bounding boxes in the same format as `bbox`.
/// Returns
/// -------
/// The intersection over union in [0, 1] between the `bbox` and each
/// candidate. A higher score means a larger fraction of the `bbox` is
/// occluded by the candidate.
pub fn iou(bbox: &BBox<Ltrb>, candidates: &[&BBox<Ltrb>]) -> Array1<f32> {
    let bbox_area = bbox.width() * bbox.height();

    candidates
        .iter()
        .map(|b2| {
            let i_xmin = bbox.left().max(b2.left());
            let i_ymin = bbox.top().max(b2.top());

            let i_xmax = bbox.right().min(b2.right());
            let i_ymax = bbox.bottom().min(b2.bottom());

            let intersection_area = (i_xmax - i_xmin).max(0.0) * (i_ymax - i_ymin).max(0.0);
            let candidate_area = b2.width() * b2.height();
            let union_area = bbox_area + candidate_area - intersection_area;

            if union_area > 0.0 {
                intersection_area / union_area
            } else {
                0.0
            }
        })
        .collect()
}

///
/// An intersection over union distance metric.
/// Parameters
/// ----------
/// tracks : A list of tracks.
/// detections : A list of detections.
/// track_indices : A list of indices to tracks that should be matched.
/// detection_indices : A list of indices to detections that should be matched.
/// Returns
/// -------
/// Returns a square cost matrix of side
/// max(len(track_indices), len(detection_indices)) where entry (i, j) is
/// `1 - iou(tracks[track_indices[i]], detections[detection_indices[j]])`.
/// Padding cells are 1.0.
///
pub fn iou_cost(tracks: &[Track], detections: &[Detection], track_indices: &[usize], detection_indices: &[usize]) -> Array2<f32> {
    let track_n = track_indices.len();
    let det_n = detection_indices.len();
    let n = track_n.max(det_n);

    let mut cost_matrix = Array2::from_elem((n, n), 1.0);

    let candidates: Vec<_> = detection_indices
        .iter()
        .map(|&i| &detections[i].bbox)
        .collect();

    for (row, &track_idx) in track_indices.iter().enumerate() {
        let bbox = tracks[track_idx].bbox().as_ltrb();

        cost_matrix.slice_mut(s![row, ..det_n]).assign(&(1.0 - iou(&bbox, &candidates)));
    }

    cost_matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BBox::ltrb(0.0, 0.0, 10.0, 10.0);
        let same = BBox::ltrb(0.0, 0.0, 10.0, 10.0);
        let apart = BBox::ltrb(20.0, 20.0, 30.0, 30.0);
        let half = BBox::ltrb(5.0, 0.0, 15.0, 10.0);

        let scores = iou(&a, &[&same, &apart, &half]);

        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert_eq!(scores[1], 0.0);
        assert!((scores[2] - 1.0 / 3.0).abs() < 1e-6);
    }
}
