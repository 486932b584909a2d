//! Global hypotheses and the multi-Bernoulli mixture (4.F).

use crate::density::{logsumexp, normalize_log_weights};

/// One consistent assignment: selects exactly one STH per live track.
pub type Association = (usize, usize);

/// `(log_weight, associations)`. Immutable after construction; associations
/// are kept in canonical order (ascending `track_id`) per spec §9.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalHypothesis {
    pub log_weight: f64,
    pub associations: Vec<Association>,
}

impl GlobalHypothesis {
    pub fn new(log_weight: f64, mut associations: Vec<Association>) -> Self {
        associations.sort_by_key(|(track_id, _)| *track_id);
        GlobalHypothesis {
            log_weight,
            associations,
        }
    }

    pub fn sth_id_for(&self, track_id: usize) -> Option<usize> {
        self.associations
            .iter()
            .find(|(t, _)| *t == track_id)
            .map(|(_, s)| *s)
    }
}

/// `logsumexp` over all globals' log-weights.
pub fn total_log_weight(globals: &[GlobalHypothesis]) -> f64 {
    let weights: Vec<f64> = globals.iter().map(|g| g.log_weight).collect();
    logsumexp(&weights)
}

/// Weighted set of global hypotheses. Invariant: after `normalize`,
/// `logsumexp` of all log-weights is 0 (weights sum to 1 in linear scale).
#[derive(Debug, Clone, Default)]
pub struct MultiBernoulliMixture {
    pub globals: Vec<GlobalHypothesis>,
}

impl MultiBernoulliMixture {
    pub fn new(globals: Vec<GlobalHypothesis>) -> Self {
        MultiBernoulliMixture { globals }
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    /// Renormalizes log-weights via `logsumexp` so they sum to 1 in linear
    /// scale. A global whose weight underflows to `-inf` is dropped.
    pub fn normalize(&mut self) {
        let log_weights: Vec<f64> = self.globals.iter().map(|g| g.log_weight).collect();
        let (normalized, _) = normalize_log_weights(&log_weights);
        for (g, w) in self.globals.iter_mut().zip(normalized.into_iter()) {
            g.log_weight = w;
        }
        self.globals.retain(|g| g.log_weight.is_finite());
    }

    /// Drops globals below `threshold` normalized weight, then caps to
    /// `max_hypotheses` by top-weight, then renormalizes again (spec §4.I
    /// step 7).
    pub fn prune_and_cap(&mut self, threshold: f64, max_hypotheses: usize) {
        self.globals.retain(|g| g.log_weight > threshold);
        if self.globals.len() > max_hypotheses {
            self.globals
                .sort_by(|a, b| b.log_weight.partial_cmp(&a.log_weight).unwrap());
            self.globals.truncate(max_hypotheses);
        }
        self.normalize();
    }

    /// The single highest-weight global, or `None` if the mixture is empty.
    pub fn best(&self) -> Option<&GlobalHypothesis> {
        self.globals
            .iter()
            .max_by(|a, b| a.log_weight.partial_cmp(&b.log_weight).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn normalize_sums_to_one() {
        let mut mbm = MultiBernoulliMixture::new(vec![
            GlobalHypothesis::new(0.1, vec![]),
            GlobalHypothesis::new(0.2, vec![]),
            GlobalHypothesis::new(0.05, vec![]),
        ]);
        mbm.normalize();
        let total: f64 = mbm.globals.iter().map(|g| g.log_weight.exp()).sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn associations_are_sorted_by_track_id() {
        let g = GlobalHypothesis::new(0.0, vec![(3, 0), (1, 0), (2, 0)]);
        let ids: Vec<usize> = g.associations.iter().map(|(t, _)| *t).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn cap_keeps_top_weight_globals() {
        let mut mbm = MultiBernoulliMixture::new(vec![
            GlobalHypothesis::new(0.2_f64.ln(), vec![]),
            GlobalHypothesis::new(0.5_f64.ln(), vec![]),
            GlobalHypothesis::new(0.3_f64.ln(), vec![]),
        ]);
        mbm.prune_and_cap(f64::NEG_INFINITY, 2);
        assert_eq!(mbm.len(), 2);
    }
}
