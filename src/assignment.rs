//! Cost matrix construction and the per-global assigner (4.G).

use std::collections::{HashMap, HashSet};

use ndarray::Array2;

use crate::global::{Association, GlobalHypothesis};
use crate::hypothesis::Track;
use crate::murty::k_best;

/// The `M x (T + M)` cost matrix for one parent global, plus the reverse
/// maps needed to decode a Murty solution back into track associations.
pub struct CostMatrix {
    matrix: Array2<f64>,
    num_old_tracks: usize,
    /// `(measurement, column) -> (track_id, child_sth_id)` for the left block.
    left_decode: HashMap<(usize, usize), (usize, usize)>,
    /// `column -> (new_track_id, sth_id)` for the (diagonal) right block.
    right_decode: HashMap<usize, (usize, usize)>,
}

impl CostMatrix {
    /// `new_track_for_measurement` maps a measurement index to the track_id
    /// of the fresh `Track` the PPP's first-time-detection update produced
    /// for it, if any (absent entries leave that measurement's right-block
    /// column entirely `+inf`, i.e. unassignable to a new track).
    pub fn build(
        global: &GlobalHypothesis,
        tracks: &HashMap<usize, Track>,
        n_measurements: usize,
        new_track_for_measurement: &HashMap<usize, usize>,
    ) -> Self {
        let num_old_tracks = global.associations.len();
        let mut matrix = Array2::<f64>::from_elem(
            (n_measurements, num_old_tracks + n_measurements),
            f64::INFINITY,
        );
        let mut left_decode = HashMap::new();
        let mut right_decode = HashMap::new();

        for (j, &(track_id, parent_sth_id)) in global.associations.iter().enumerate() {
            let track = tracks.get(&track_id).expect("track referenced by global must exist");
            let parent = track
                .get(parent_sth_id)
                .expect("parent sth_id referenced by global must exist");
            for (&m, &child_sth_id) in parent.detection_hypotheses.iter() {
                let child = track.get(child_sth_id).expect("child sth_id must exist");
                matrix[[m, j]] = child.cost;
                left_decode.insert((m, j), (track_id, child_sth_id));
            }
        }

        for m in 0..n_measurements {
            if let Some(&new_track_id) = new_track_for_measurement.get(&m) {
                let track = tracks
                    .get(&new_track_id)
                    .expect("first-time-detection track must exist");
                let sth = track.get(0).expect("first-time-detection STH must exist");
                let col = num_old_tracks + m;
                matrix[[m, col]] = sth.cost;
                right_decode.insert(col, (new_track_id, 0));
            }
        }

        CostMatrix {
            matrix,
            num_old_tracks,
            left_decode,
            right_decode,
        }
    }

    /// Decodes one Murty solution (`row -> col` for every measurement row)
    /// into a full association list: one entry per measurement's chosen
    /// column, plus a missed-detection entry for every track in `global`
    /// that no measurement was assigned to (an unmatched column).
    pub fn decode(
        &self,
        solution: &[usize],
        global: &GlobalHypothesis,
        tracks: &HashMap<usize, Track>,
    ) -> Vec<Association> {
        let mut matched_tracks = HashSet::new();
        let mut associations = Vec::with_capacity(solution.len() + global.associations.len());

        for (m, &col) in solution.iter().enumerate() {
            if col < self.num_old_tracks {
                let &(track_id, child_sth_id) = self
                    .left_decode
                    .get(&(m, col))
                    .expect("Murty solution must only touch finite-cost entries");
                associations.push((track_id, child_sth_id));
                matched_tracks.insert(track_id);
            } else {
                let &(new_track_id, sth_id) = self
                    .right_decode
                    .get(&col)
                    .expect("Murty solution must only touch finite-cost entries");
                associations.push((new_track_id, sth_id));
            }
        }

        for &(track_id, parent_sth_id) in &global.associations {
            if matched_tracks.contains(&track_id) {
                continue;
            }
            let parent = tracks[&track_id]
                .get(parent_sth_id)
                .expect("parent sth_id referenced by global must exist");
            let miss_id = parent
                .miss_sth_id
                .expect("update_leaves must populate miss_sth_id for every leaf");
            associations.push((track_id, miss_id));
        }

        associations
    }
}

/// Runs Murty for up to `k = ceil(exp(G.log_weight) * num_of_desired_hypotheses)`
/// solutions (or `max_murty_steps` if set), emitting one new
/// `GlobalHypothesis` per solution. Returns an empty vec (not an error) if
/// Murty finds no feasible assignment at all: the caller is expected to
/// keep the parent's missed-detection-only continuation regardless (spec's
/// `NoFeasibleAssignment`, not fatal).
pub fn assign(
    global: &GlobalHypothesis,
    tracks: &HashMap<usize, Track>,
    n_measurements: usize,
    new_track_for_measurement: &HashMap<usize, usize>,
    num_of_desired_hypotheses: usize,
    max_murty_steps: Option<usize>,
) -> Vec<GlobalHypothesis> {
    let k = max_murty_steps.unwrap_or_else(|| {
        let k_g = (global.log_weight.exp() * num_of_desired_hypotheses as f64).ceil();
        k_g.max(1.0) as usize
    });

    let cost_matrix = CostMatrix::build(global, tracks, n_measurements, new_track_for_measurement);
    k_best(&cost_matrix.matrix, k)
        .into_iter()
        .map(|(solution, cost)| {
            let associations = cost_matrix.decode(&solution, global, tracks);
            GlobalHypothesis::new(global.log_weight - cost, associations)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bernoulli::Bernoulli;
    use crate::density::Gaussian;
    use crate::hypothesis::SingleTargetHypothesis;
    use ndarray::{Array1, Array2 as NdArray2};

    fn unit_bernoulli() -> Bernoulli {
        Bernoulli::new(0.9, Gaussian::new(Array1::zeros(2), NdArray2::eye(2)))
    }

    /// A track whose root STH (`sth_id = 0`) already has a missed-detection
    /// child (`sth_id = 1`) and a detected-update child for `meas_idx`
    /// (`sth_id = 2`), as `Track::update_leaves` would have left them.
    fn track_with_one_detection(track_id: usize, meas_idx: usize, cost: f64) -> Track {
        let root = SingleTargetHypothesis {
            sth_id: 0,
            bernoulli: unit_bernoulli(),
            log_likelihood: 0.0,
            cost: 0.0,
            meas_idx: None,
            detection_hypotheses: HashMap::new(),
            miss_sth_id: None,
        };
        let mut track = Track::from_sth(track_id, root);

        track.insert_for_test(
            1,
            SingleTargetHypothesis {
                sth_id: 1,
                bernoulli: unit_bernoulli(),
                log_likelihood: 0.0,
                cost: 10.0,
                meas_idx: None,
                detection_hypotheses: HashMap::new(),
                miss_sth_id: None,
            },
        );
        track.insert_for_test(
            2,
            SingleTargetHypothesis {
                sth_id: 2,
                bernoulli: unit_bernoulli(),
                log_likelihood: -cost,
                cost,
                meas_idx: Some(meas_idx),
                detection_hypotheses: HashMap::new(),
                miss_sth_id: None,
            },
        );
        track.set_sth_for_test(0, |root| {
            root.miss_sth_id = Some(1);
            root.detection_hypotheses.insert(meas_idx, 2);
        });
        track
    }

    #[test]
    fn decode_assigns_gated_measurement_to_detected_child() {
        let track = track_with_one_detection(7, 0, 3.0);
        let mut tracks = HashMap::new();
        tracks.insert(7usize, track);

        let global = GlobalHypothesis::new(0.0, vec![(7, 0)]);
        let new_track_for_measurement = HashMap::new();
        let cm = CostMatrix::build(&global, &tracks, 1, &new_track_for_measurement);
        let solution = vec![0usize]; // measurement 0 -> column 0 (track 7)
        let associations = cm.decode(&solution, &global, &tracks);
        assert_eq!(associations, vec![(7, 2)]);
    }

    #[test]
    fn unmatched_track_falls_back_to_miss_child() {
        let track = track_with_one_detection(7, 0, 3.0);
        let mut tracks = HashMap::new();
        tracks.insert(7usize, track);

        let global = GlobalHypothesis::new(0.0, vec![(7, 0)]);
        // 0 measurements this step: no rows, track 7 must fall back to miss.
        let new_track_for_measurement = HashMap::new();
        let cm = CostMatrix::build(&global, &tracks, 0, &new_track_for_measurement);
        let solution: Vec<usize> = vec![];
        let associations = cm.decode(&solution, &global, &tracks);
        assert_eq!(associations, vec![(7, 1)]);
    }
}
