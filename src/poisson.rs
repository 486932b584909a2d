//! The PPP intensity of undetected targets (4.E).

use std::collections::HashMap;

use ndarray::Array2;

use crate::bernoulli::Bernoulli;
use crate::density::{
    logsumexp, normalize_log_weights, DensityOps, Gaussian, GaussianMixture, MeasurementModel,
    MotionModel, WeightedGaussian,
};
use crate::error::Result;
use crate::hypothesis::SingleTargetHypothesis;

/// Intensity of undetected targets. No identity is attached; components are
/// interchangeable.
#[derive(Debug, Clone, Default)]
pub struct PoissonRFS {
    pub intensity: GaussianMixture,
}

impl PoissonRFS {
    pub fn new(intensity: GaussianMixture) -> Self {
        PoissonRFS { intensity }
    }

    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }

    /// For each component, `log_weight += log(p_s)`; predicts the Gaussian.
    pub fn predict<D: DensityOps>(
        &mut self,
        density: &D,
        motion_model: &dyn MotionModel,
        survival_probability: f64,
        dt: f64,
    ) {
        let log_ps = survival_probability.ln();
        for component in self.intensity.iter_mut() {
            component.log_weight += log_ps;
            component.gaussian = density.predict(&component.gaussian, motion_model, dt);
        }
    }

    /// Appends newly-born components (spec mandates non-mutating semantics
    /// for the intensity passed in, so the caller owns a fresh mixture).
    pub fn birth(&mut self, new_components: GaussianMixture) {
        self.intensity.extend(new_components);
    }

    /// For each component, `log_weight += log(1 - p_D)` (missed-detection
    /// aging of the undetected intensity).
    pub fn undetected_update(&mut self, detection_probability: f64) {
        let log_miss = (1.0 - detection_probability).ln();
        for component in self.intensity.iter_mut() {
            component.log_weight += log_miss;
        }
    }

    pub fn prune(&mut self, threshold: f64) {
        self.intensity.prune(threshold);
    }

    /// Returns, per PPP component, which of `measurements` fall inside its
    /// gate, plus the per-measurement OR across all components.
    pub fn gating<D: DensityOps>(
        &self,
        density: &D,
        measurements: &Array2<f64>,
        meas_model: &dyn MeasurementModel,
        gating_size: f64,
    ) -> (Vec<Vec<bool>>, Vec<bool>) {
        let n_meas = measurements.nrows();
        let mut per_component = Vec::with_capacity(self.intensity.len());
        let mut used = vec![false; n_meas];
        for component in self.intensity.iter() {
            let (_, mask) =
                density.ellipsoidal_gating(&component.gaussian, measurements, meas_model, gating_size);
            for (u, m) in used.iter_mut().zip(mask.iter()) {
                *u = *u || *m;
            }
            per_component.push(mask);
        }
        (per_component, used)
    }

    /// First-time detection (spec §4.E `detected_update`): updates every
    /// PPP component by `z_m`, merges the updated components via moment
    /// matching, and returns the resulting Bernoulli hypothesis. Does not
    /// mutate `self.intensity` (spec §9's non-mutating semantics). Returns
    /// `None` if the intensity is empty (there is nothing to merge).
    pub fn detected_update<D: DensityOps>(
        &self,
        density: &D,
        meas_idx: usize,
        z: &ndarray::Array1<f64>,
        meas_model: &dyn MeasurementModel,
        detection_probability: f64,
        clutter_intensity: f64,
    ) -> Result<Option<SingleTargetHypothesis>> {
        if self.intensity.is_empty() {
            return Ok(None);
        }

        let (updated_components, loglikelihoods) = density
            .update_states_with_likelihoods_by_single_measurement(&self.intensity, z, meas_model)?;

        let log_pd = detection_probability.ln();
        let log_weights: Vec<f64> = self
            .intensity
            .iter()
            .zip(loglikelihoods.iter())
            .map(|(component, ll)| log_pd + component.log_weight + ll)
            .collect();

        let (normalized_log_weights, log_sum) = normalize_log_weights(&log_weights);
        let merged_state = density.moment_matching(&normalized_log_weights, &updated_components);

        let log_likelihood = logsumexp(&[log_sum, clutter_intensity.ln()]);
        let existence_probability = (log_sum - log_likelihood).exp();

        let bernoulli = Bernoulli::new(existence_probability, merged_state);
        Ok(Some(SingleTargetHypothesis {
            sth_id: 0,
            bernoulli,
            log_likelihood,
            cost: -log_likelihood,
            meas_idx: Some(meas_idx),
            detection_hypotheses: HashMap::new(),
            miss_sth_id: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    fn mixture_with_weight(log_weight: f64) -> GaussianMixture {
        GaussianMixture::new(vec![WeightedGaussian::new(
            log_weight,
            Gaussian::new(Array1::zeros(4), ndarray::Array2::eye(4) * 100.0),
        )])
    }

    #[test]
    fn undetected_update_ages_every_component() {
        let mut ppp = PoissonRFS::new(mixture_with_weight(-1.0));
        ppp.undetected_update(0.8);
        let expected = -1.0 + (0.2_f64).ln();
        assert_abs_diff_eq!(ppp.intensity[0].log_weight, expected, epsilon = 1e-9);
    }

    #[test]
    fn prune_drops_low_weight_components() {
        let mut ppp = PoissonRFS::new(GaussianMixture::new(vec![
            WeightedGaussian::new(-6.0, Gaussian::new(Array1::zeros(2), ndarray::Array2::eye(2))),
            WeightedGaussian::new(-0.1, Gaussian::new(Array1::zeros(2), ndarray::Array2::eye(2))),
        ]));
        ppp.prune((0.01_f64).ln());
        assert_eq!(ppp.len(), 1);
    }

    #[test]
    fn birth_appends_components_without_mutating_caller() {
        let mut ppp = PoissonRFS::new(GaussianMixture::empty());
        let born = mixture_with_weight(-2.0);
        ppp.birth(born.clone());
        assert_eq!(ppp.len(), 1);
        assert_eq!(born.len(), 1);
    }

    #[test]
    fn detected_update_on_empty_intensity_is_none() {
        let ppp = PoissonRFS::new(GaussianMixture::empty());
        let density = crate::density::LinearGaussianDensity;
        let meas_model = crate::testing::ConstantVelocityMeasurementModel::new(10.0);
        let z = array![0.0, 0.0];
        let result = ppp
            .detected_update(&density, 0, &z, &meas_model, 0.8, 1e-3)
            .unwrap();
        assert!(result.is_none());
    }
}
