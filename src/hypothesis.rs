//! Single-target hypotheses and the per-track hypothesis tree (4.C, 4.D).
//!
//! Following the arena-plus-indices design note in spec §9: each track owns
//! a flat `sth_id -> STH` map instead of owning children by pointer, so
//! pruning is a mark-and-sweep over referenced ids rather than a graph walk.

use std::collections::HashMap;

use ndarray::Array2;

use crate::bernoulli::Bernoulli;
use crate::density::{DensityOps, MeasurementModel};
use crate::error::Result;

/// One hypothesis for one track at one time: a Bernoulli plus the
/// bookkeeping the assigner needs (log-likelihood, cost, and the children
/// this hypothesis spawned at the current step).
#[derive(Debug, Clone)]
pub struct SingleTargetHypothesis {
    pub sth_id: usize,
    pub bernoulli: Bernoulli,
    pub log_likelihood: f64,
    pub cost: f64,
    pub meas_idx: Option<usize>,
    /// measurement index -> child sth_id, populated each step for every
    /// gated measurement.
    pub detection_hypotheses: HashMap<usize, usize>,
    /// missed-detection continuation's sth_id, populated each step.
    pub miss_sth_id: Option<usize>,
}

impl SingleTargetHypothesis {
    fn root(sth_id: usize, bernoulli: Bernoulli) -> Self {
        SingleTargetHypothesis {
            sth_id,
            bernoulli,
            log_likelihood: 0.0,
            cost: 0.0,
            meas_idx: None,
            detection_hypotheses: HashMap::new(),
            miss_sth_id: None,
        }
    }
}

/// A hypothesis tree for one potentially-detected target: a forest of STHs
/// keyed by `sth_id`, unique within the track.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: usize,
    hypotheses: HashMap<usize, SingleTargetHypothesis>,
    next_sth_id: usize,
}

impl Track {
    /// Constructs a new track seeded with a single root STH (sth_id 0).
    pub fn from_sth(track_id: usize, mut sth: SingleTargetHypothesis) -> Self {
        sth.sth_id = 0;
        let mut hypotheses = HashMap::new();
        hypotheses.insert(0, sth);
        Track {
            track_id,
            hypotheses,
            next_sth_id: 1,
        }
    }

    pub fn new_root(track_id: usize, bernoulli: Bernoulli) -> Self {
        Track::from_sth(track_id, SingleTargetHypothesis::root(0, bernoulli))
    }

    pub fn get(&self, sth_id: usize) -> Option<&SingleTargetHypothesis> {
        self.hypotheses.get(&sth_id)
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &usize> {
        self.hypotheses.keys()
    }

    /// Runs the per-step measurement update for every currently-referenced
    /// leaf: a missed-detection continuation, plus a detected-update child
    /// for every in-gate measurement (spec §4.D).
    pub fn update_leaves<D: DensityOps>(
        &mut self,
        leaf_ids: &[usize],
        density: &D,
        measurements: &Array2<f64>,
        gate_masks: &HashMap<usize, Vec<bool>>,
        meas_model: &dyn MeasurementModel,
        detection_probability: f64,
    ) -> Result<()> {
        for &leaf_id in leaf_ids {
            let parent = self
                .hypotheses
                .get(&leaf_id)
                .expect("leaf sth_id must exist in its track")
                .clone();

            let (miss_bernoulli, miss_ll) = parent.bernoulli.undetected_update(detection_probability);
            let miss_id = self.next_sth_id;
            self.next_sth_id += 1;
            self.hypotheses.insert(
                miss_id,
                SingleTargetHypothesis {
                    sth_id: miss_id,
                    bernoulli: miss_bernoulli,
                    log_likelihood: miss_ll,
                    cost: -miss_ll,
                    meas_idx: None,
                    detection_hypotheses: HashMap::new(),
                    miss_sth_id: None,
                },
            );

            let mut detection_hypotheses = HashMap::new();
            let gate = gate_masks.get(&leaf_id);
            for (m, row) in measurements.outer_iter().enumerate() {
                let in_gate = gate.map(|g| g[m]).unwrap_or(false);
                if !in_gate {
                    continue;
                }
                let z = row.to_owned();
                let (det_bernoulli, det_ll) =
                    parent
                        .bernoulli
                        .detected_update(density, &z, meas_model, detection_probability)?;
                let child_id = self.next_sth_id;
                self.next_sth_id += 1;
                self.hypotheses.insert(
                    child_id,
                    SingleTargetHypothesis {
                        sth_id: child_id,
                        bernoulli: det_bernoulli,
                        log_likelihood: det_ll,
                        cost: -det_ll,
                        meas_idx: Some(m),
                        detection_hypotheses: HashMap::new(),
                        miss_sth_id: None,
                    },
                );
                detection_hypotheses.insert(m, child_id);
            }

            let parent_mut = self.hypotheses.get_mut(&leaf_id).unwrap();
            parent_mut.miss_sth_id = Some(miss_id);
            parent_mut.detection_hypotheses = detection_hypotheses;
        }
        Ok(())
    }

    /// Predicts every current STH's Bernoulli through the motion model.
    pub fn predict<D: DensityOps>(
        &mut self,
        density: &D,
        motion_model: &dyn crate::density::MotionModel,
        survival_probability: f64,
        dt: f64,
    ) {
        for sth in self.hypotheses.values_mut() {
            sth.bernoulli = sth.bernoulli.predict(density, motion_model, survival_probability, dt);
        }
    }

    /// Mark-and-sweep: drop every STH not in `referenced`.
    pub fn retain(&mut self, referenced: &std::collections::HashSet<usize>) {
        self.hypotheses.retain(|id, _| referenced.contains(id));
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&mut self, sth_id: usize, sth: SingleTargetHypothesis) {
        self.next_sth_id = self.next_sth_id.max(sth_id + 1);
        self.hypotheses.insert(sth_id, sth);
    }

    #[cfg(test)]
    pub(crate) fn set_sth_for_test(&mut self, sth_id: usize, f: impl FnOnce(&mut SingleTargetHypothesis)) {
        if let Some(sth) = self.hypotheses.get_mut(&sth_id) {
            f(sth);
        }
    }
}
