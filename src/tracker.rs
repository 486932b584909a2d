//! The top-level PMBM recursion (4.I): `Tracker::step`.

use std::collections::{HashMap, HashSet};

use ndarray::Array2;
use tracing::{debug, info_span};

use crate::assignment::assign;
use crate::config::TrackerConfig;
use crate::density::{DensityOps, Gaussian, MeasurementModel, MotionModel};
use crate::error::{Error, Result};
use crate::global::{GlobalHypothesis, MultiBernoulliMixture};
use crate::hypothesis::Track;
use crate::models::{BirthModel, SensorModel};
use crate::poisson::PoissonRFS;

/// One reported target: its identity, current belief, and existence
/// probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub track_id: usize,
    pub gaussian: Gaussian,
    pub existence_probability: f64,
}

/// Owns `(PPP, MBM)` and the hypothesis-tree arena; `step` is its only
/// mutator (spec §5: a single-threaded, synchronous state machine).
pub struct Tracker<D: DensityOps> {
    density: D,
    motion_model: Box<dyn MotionModel>,
    meas_model: Box<dyn MeasurementModel>,
    sensor_model: Box<dyn SensorModel>,
    birth_model: Box<dyn BirthModel>,
    config: TrackerConfig,

    ppp: PoissonRFS,
    mbm: MultiBernoulliMixture,
    tracks: HashMap<usize, Track>,
    next_track_id: usize,
    t: f64,
    confirmed_streak: HashMap<usize, usize>,
}

impl<D: DensityOps> Tracker<D> {
    pub fn new(
        meas_model: Box<dyn MeasurementModel>,
        sensor_model: Box<dyn SensorModel>,
        motion_model: Box<dyn MotionModel>,
        birth_model: Box<dyn BirthModel>,
        density: D,
        config: TrackerConfig,
    ) -> Self {
        Tracker {
            density,
            motion_model,
            meas_model,
            sensor_model,
            birth_model,
            config,
            ppp: PoissonRFS::default(),
            mbm: MultiBernoulliMixture::new(vec![GlobalHypothesis::new(0.0, vec![])]),
            tracks: HashMap::new(),
            next_track_id: 0,
            t: 0.0,
            confirmed_streak: HashMap::new(),
        }
    }

    pub fn ppp_size(&self) -> usize {
        self.ppp.len()
    }

    pub fn mbm_size(&self) -> usize {
        self.mbm.len()
    }

    pub fn top_global_weight(&self) -> Option<f64> {
        self.mbm.best().map(|g| g.log_weight.exp())
    }

    /// Runs one full predict/gate/update/enumerate/prune/estimate cycle.
    /// `measurements` is `M x meas_dim`; `M = 0` is valid (spec's
    /// `EmptyMeasurementSet`).
    pub fn step(&mut self, measurements: &Array2<f64>, dt: f64) -> Result<Vec<Estimate>> {
        self.validate_measurements(measurements)?;

        let n_measurements = measurements.nrows();
        let span = info_span!("step", timestep = self.t, num_measurements = n_measurements);
        let _enter = span.enter();

        self.predict(dt);
        let gate_masks = self.gate(measurements);
        self.update_tracks(measurements, &gate_masks)?;
        let new_track_for_measurement = self.update_ppp(measurements)?;

        let new_globals = self.enumerate_globals(n_measurements, &new_track_for_measurement);

        let mut mbm_new = MultiBernoulliMixture::new(new_globals);
        mbm_new.normalize();
        let globals_before = mbm_new.len();
        mbm_new.prune_and_cap(
            self.config.global_prune_log_threshold(),
            self.config.max_number_of_hypotheses(),
        );
        debug!(globals_before, globals_after = mbm_new.len(), "pruned globals");

        self.commit(mbm_new);
        Ok(self.estimate())
    }

    /// Rejects malformed measurements before any state mutation (spec §7):
    /// a row whose width disagrees with `meas_model.meas_dim()`, or any
    /// non-finite entry, is reported as a typed error rather than panicking
    /// later inside a `dot` or silently poisoning the state with a NaN.
    fn validate_measurements(&self, measurements: &Array2<f64>) -> Result<()> {
        let expected = self.meas_model.meas_dim();
        if measurements.ncols() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                found: measurements.ncols(),
            });
        }
        for (index, row) in measurements.outer_iter().enumerate() {
            if row.iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidMeasurement {
                    index,
                    detail: "measurement contains a NaN or infinite entry".into(),
                });
            }
        }
        Ok(())
    }

    fn predict(&mut self, dt: f64) {
        let p_s = self.config.survival_probability();
        self.ppp.predict(&self.density, self.motion_model.as_ref(), p_s, dt);
        self.t += dt;
        let born = self.birth_model.sample(self.t);
        self.ppp.birth(born);
        for track in self.tracks.values_mut() {
            track.predict(&self.density, self.motion_model.as_ref(), p_s, dt);
        }
    }

    /// Per-track, per-leaf gate masks (`track_id -> (sth_id -> mask)`), plus
    /// the PPP's own gate mask (computed for diagnostic/§4.E fidelity; a
    /// measurement outside every PPP gate is still eligible for the
    /// "new track" column, per spec §4.I step 2).
    fn gate(&self, measurements: &Array2<f64>) -> HashMap<usize, HashMap<usize, Vec<bool>>> {
        let _span = info_span!("gate").entered();
        let gating_size = self.config.gating_percentage();
        let mut per_track = HashMap::with_capacity(self.tracks.len());
        for (track_id, track) in self.tracks.iter() {
            let mut per_leaf = HashMap::with_capacity(track.len());
            for &sth_id in track.ids() {
                let sth = track.get(sth_id).expect("id came from this track");
                let (_, mask) = self.density.ellipsoidal_gating(
                    &sth.bernoulli.gaussian,
                    measurements,
                    self.meas_model.as_ref(),
                    gating_size,
                );
                per_leaf.insert(sth_id, mask);
            }
            per_track.insert(*track_id, per_leaf);
        }

        let (_per_component, used) =
            self.ppp
                .gating(&self.density, measurements, self.meas_model.as_ref(), gating_size);
        debug!(measurements_in_some_gate = used.iter().filter(|u| **u).count(), "ppp gate computed");
        per_track
    }

    fn update_tracks(
        &mut self,
        measurements: &Array2<f64>,
        gate_masks: &HashMap<usize, HashMap<usize, Vec<bool>>>,
    ) -> Result<()> {
        let _span = info_span!("update").entered();
        let p_d = self.config.detection_probability();
        for (track_id, track) in self.tracks.iter_mut() {
            let leaf_ids: Vec<usize> = track.ids().copied().collect();
            let masks = gate_masks.get(track_id).cloned().unwrap_or_default();
            track.update_leaves(&leaf_ids, &self.density, measurements, &masks, self.meas_model.as_ref(), p_d)?;
        }
        Ok(())
    }

    /// PPP first-time-detection update for every measurement (spec §4.I
    /// step 4): wraps each resulting STH in a fresh `Track` and returns the
    /// `measurement -> new_track_id` map used by cost-matrix construction.
    fn update_ppp(&mut self, measurements: &Array2<f64>) -> Result<HashMap<usize, usize>> {
        let p_d = self.config.detection_probability();
        let clutter_intensity = self.sensor_model.clutter_intensity();
        let mut new_track_for_measurement = HashMap::new();
        for (m, row) in measurements.outer_iter().enumerate() {
            let z = row.to_owned();
            if let Some(sth) = self.ppp.detected_update(
                &self.density,
                m,
                &z,
                self.meas_model.as_ref(),
                p_d,
                clutter_intensity,
            )? {
                let track_id = self.next_track_id;
                self.next_track_id += 1;
                self.tracks.insert(track_id, Track::from_sth(track_id, sth));
                new_track_for_measurement.insert(m, track_id);
            }
        }
        Ok(new_track_for_measurement)
    }

    /// Enumerates new globals for every current parent (spec §4.I step 5).
    /// A parent with zero measurements, or for which Murty finds no
    /// feasible assignment, still survives via its missed-detection-only
    /// continuation (`NoFeasibleAssignment` is not fatal).
    fn enumerate_globals(
        &self,
        n_measurements: usize,
        new_track_for_measurement: &HashMap<usize, usize>,
    ) -> Vec<GlobalHypothesis> {
        let mut new_globals = Vec::new();
        for (global_idx, global) in self.mbm.globals.iter().enumerate() {
            let k_requested = self
                .config
                .max_murty_steps()
                .unwrap_or_else(|| {
                    (global.log_weight.exp() * self.config.num_of_desired_hypotheses() as f64)
                        .ceil()
                        .max(1.0) as usize
                });
            let _span = info_span!("assign", global_idx, k_requested).entered();

            let solutions = if n_measurements == 0 {
                Vec::new()
            } else {
                assign(
                    global,
                    &self.tracks,
                    n_measurements,
                    new_track_for_measurement,
                    self.config.num_of_desired_hypotheses(),
                    self.config.max_murty_steps(),
                )
            };
            debug!(global_idx, k_requested, k_returned = solutions.len(), "assigned");

            if solutions.is_empty() {
                new_globals.push(self.missed_detection_only(global));
            } else {
                new_globals.extend(solutions);
            }
        }
        new_globals
    }

    /// The continuation of `global` where every one of its tracks takes the
    /// missed-detection branch (used for the `M = 0` case and as the
    /// `NoFeasibleAssignment` fallback).
    fn missed_detection_only(&self, global: &GlobalHypothesis) -> GlobalHypothesis {
        let associations = global
            .associations
            .iter()
            .map(|&(track_id, parent_sth_id)| {
                let parent = self.tracks[&track_id]
                    .get(parent_sth_id)
                    .expect("parent sth_id referenced by global must exist");
                let miss_id = parent
                    .miss_sth_id
                    .expect("update_leaves must populate miss_sth_id for every leaf");
                (track_id, miss_id)
            })
            .collect();
        GlobalHypothesis::new(global.log_weight, associations)
    }

    /// Prunes dead tracks/STHs/PPP components (spec §4.I step 8) and
    /// installs the new MBM.
    fn commit(&mut self, mbm_new: MultiBernoulliMixture) {
        let tracks_before = self.tracks.len();
        let mut referenced: HashMap<usize, HashSet<usize>> = HashMap::new();
        for global in &mbm_new.globals {
            for &(track_id, sth_id) in &global.associations {
                referenced.entry(track_id).or_default().insert(sth_id);
            }
        }

        self.tracks.retain(|track_id, _| referenced.contains_key(track_id));
        for (track_id, track) in self.tracks.iter_mut() {
            if let Some(ids) = referenced.get(track_id) {
                track.retain(ids);
            }
        }
        self.confirmed_streak.retain(|track_id, _| referenced.contains_key(track_id));

        debug!(tracks_before, tracks_after = self.tracks.len(), "pruned artifacts");

        self.ppp.prune(self.config.ppp_prune_log_threshold());
        self.ppp.undetected_update(self.config.detection_probability());

        self.mbm = mbm_new;
    }

    /// Emits estimates from the single highest-weight global (spec §4.I
    /// step 9), tracking each reported track's consecutive-confirmation
    /// streak.
    fn estimate(&mut self) -> Vec<Estimate> {
        let r_threshold = self.config.existence_probability_threshold();
        let history_threshold = self.config.track_history_length_threshold();

        let associations = match self.mbm.best() {
            Some(g) => g.associations.clone(),
            None => return Vec::new(),
        };

        let mut estimates = Vec::new();
        let mut seen = HashSet::new();
        for (track_id, sth_id) in associations {
            seen.insert(track_id);
            let sth = self.tracks[&track_id]
                .get(sth_id)
                .expect("best global must reference a live sth");
            let confirmed = sth.bernoulli.existence_probability > r_threshold;
            let streak = self.confirmed_streak.entry(track_id).or_insert(0);
            if confirmed {
                *streak += 1;
            } else {
                *streak = 0;
            }
            if confirmed && *streak >= history_threshold {
                estimates.push(Estimate {
                    track_id,
                    gaussian: sth.bernoulli.gaussian.clone(),
                    existence_probability: sth.bernoulli.existence_probability,
                });
            }
        }
        self.confirmed_streak.retain(|track_id, _| seen.contains(track_id));
        estimates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::LinearGaussianDensity;
    use crate::testing::{
        ConstantSensorModel, ConstantVelocityMeasurementModel, ConstantVelocityMotionModel,
        FixedPointBirthModel,
    };
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn new_tracker(
        birth: FixedPointBirthModel,
        p_d: f64,
        clutter_rate: f64,
    ) -> Tracker<LinearGaussianDensity> {
        let config = TrackerConfig::builder()
            .detection_probability(p_d)
            .survival_probability(0.99)
            .gating_percentage(0.999)
            .existence_probability_threshold(0.5)
            .build()
            .unwrap();
        Tracker::new(
            Box::new(ConstantVelocityMeasurementModel::new(0.5)),
            Box::new(ConstantSensorModel {
                detection_probability: p_d,
                clutter_rate,
                region_volume: 10000.0,
            }),
            Box::new(ConstantVelocityMotionModel::new(0.1)),
            Box::new(birth),
            LinearGaussianDensity,
            config,
        )
    }

    #[test]
    fn single_static_object_no_clutter_full_detection() {
        let mut tracker = new_tracker(FixedPointBirthModel::at(0.0, 0.0, 0.0, 5.0), 1.0, 1e-6);
        let mut estimates = Vec::new();
        for _ in 0..10 {
            let measurements = array![[0.0, 0.0]];
            estimates = tracker.step(&measurements, 1.0).unwrap();
        }
        assert_eq!(estimates.len(), 1);
        assert_abs_diff_eq!(estimates[0].gaussian.x[0], 0.0, epsilon = 0.5);
        assert_abs_diff_eq!(estimates[0].gaussian.x[1], 0.0, epsilon = 0.5);
        assert!(estimates[0].existence_probability > 0.99);
    }

    #[test]
    fn empty_measurement_step_decays_existence_by_missed_detection_factor() {
        let mut tracker = new_tracker(FixedPointBirthModel::at(0.0, 0.0, 0.0, 5.0), 0.9, 1e-6);
        for _ in 0..3 {
            let measurements = array![[0.0, 0.0]];
            tracker.step(&measurements, 1.0).unwrap();
        }
        let r_before = tracker.mbm.best().map(|g| {
            let (track_id, sth_id) = g.associations[0];
            tracker.tracks[&track_id].get(sth_id).unwrap().bernoulli.existence_probability
        });

        let empty: Array2<f64> = Array2::zeros((0, 2));
        tracker.step(&empty, 1.0).unwrap();

        let r_after = tracker.mbm.best().map(|g| {
            let (track_id, sth_id) = g.associations[0];
            tracker.tracks[&track_id].get(sth_id).unwrap().bernoulli.existence_probability
        });

        let (r_before, r_after) = (r_before.unwrap(), r_after.unwrap());
        let p_d = 0.9;
        let p_s = 0.99;
        let r_predicted = r_before * p_s;
        let expected = r_predicted * (1.0 - p_d) / (1.0 - r_predicted + r_predicted * (1.0 - p_d));
        assert_abs_diff_eq!(r_after, expected, epsilon = 1e-6);
    }

    #[test]
    fn pure_clutter_reports_no_estimates() {
        let mut tracker = new_tracker(FixedPointBirthModel::none(), 0.8, 5.0);
        let mut total_estimates = 0;
        for i in 0..20 {
            let measurements = array![[i as f64 * 3.0 - 30.0, i as f64 * 2.0 - 20.0]];
            let estimates = tracker.step(&measurements, 1.0).unwrap();
            total_estimates += estimates.len();
        }
        assert_eq!(total_estimates, 0);
        assert!(tracker.ppp_size() <= 64, "PPP intensity must stay bounded by pruning");
    }

    #[test]
    fn mbm_size_never_exceeds_configured_cap() {
        let config = TrackerConfig::builder()
            .detection_probability(0.8)
            .survival_probability(0.99)
            .max_number_of_hypotheses(5)
            .num_of_desired_hypotheses(20)
            .build()
            .unwrap();
        let mut tracker = Tracker::new(
            Box::new(ConstantVelocityMeasurementModel::new(1.0)),
            Box::new(ConstantSensorModel {
                detection_probability: 0.8,
                clutter_rate: 2.0,
                region_volume: 1000.0,
            }),
            Box::new(ConstantVelocityMotionModel::new(0.3)),
            Box::new(FixedPointBirthModel::at(0.0, 0.0, 0.0, 5.0)),
            LinearGaussianDensity,
            config,
        );
        for i in 0..10 {
            let x = i as f64;
            let measurements = array![[x, 0.0], [x + 5.0, 5.0], [x - 5.0, -5.0]];
            tracker.step(&measurements, 1.0).unwrap();
            assert!(tracker.mbm_size() <= 5);
        }
    }

    #[test]
    fn step_rejects_measurement_width_mismatch() {
        let mut tracker = new_tracker(FixedPointBirthModel::at(0.0, 0.0, 0.0, 5.0), 0.9, 1e-6);
        let measurements = array![[0.0, 0.0, 0.0]];
        let err = tracker.step(&measurements, 1.0).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch { expected: 2, found: 3 }
        ));
    }

    #[test]
    fn step_rejects_non_finite_measurement() {
        let mut tracker = new_tracker(FixedPointBirthModel::at(0.0, 0.0, 0.0, 5.0), 0.9, 1e-6);
        let measurements = array![[0.0, 0.0], [f64::NAN, 1.0]];
        let err = tracker.step(&measurements, 1.0).unwrap_err();
        assert!(matches!(err, Error::InvalidMeasurement { index: 1, .. }));
    }
}
