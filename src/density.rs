//! Gaussian state primitives and the `DensityOps` facade (component 4.A).
//!
//! Everything here operates on a single flat `f64` state representation;
//! the motion/measurement models decide what the entries of `x` mean.

use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{cholesky::*, triangular::*};

use crate::error::{Error, Result};

/// `N(x, P)`: mean vector plus covariance. Invariant: `P` is symmetric
/// positive-definite after every `DensityOps` operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    pub x: Array1<f64>,
    pub p: Array2<f64>,
}

impl Gaussian {
    pub fn new(x: Array1<f64>, p: Array2<f64>) -> Self {
        Gaussian { x, p }
    }

    pub fn dim(&self) -> usize {
        self.x.len()
    }

    /// `P <- (P + P^T) / 2`, restoring symmetry lost to floating point drift.
    pub fn symmetrize(&mut self) {
        let pt = self.p.t().to_owned();
        self.p = (&self.p + &pt) * 0.5;
    }
}

/// One component of a Gaussian mixture: an unnormalized log-weight plus a state.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedGaussian {
    pub log_weight: f64,
    pub gaussian: Gaussian,
}

impl WeightedGaussian {
    pub fn new(log_weight: f64, gaussian: Gaussian) -> Self {
        WeightedGaussian { log_weight, gaussian }
    }
}

/// An ordered sequence of weighted Gaussian components. Weights are
/// unnormalized; their normalization is determined by the caller's context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussianMixture {
    components: Vec<WeightedGaussian>,
}

impl GaussianMixture {
    pub fn new(components: Vec<WeightedGaussian>) -> Self {
        GaussianMixture { components }
    }

    pub fn empty() -> Self {
        GaussianMixture { components: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WeightedGaussian> {
        self.components.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, WeightedGaussian> {
        self.components.iter_mut()
    }

    pub fn push(&mut self, component: WeightedGaussian) {
        self.components.push(component);
    }

    /// Append a deep copy of `other`'s components (birth / PPP accumulation).
    pub fn extend(&mut self, other: GaussianMixture) {
        self.components.extend(other.components);
    }

    pub fn log_weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.log_weight).collect()
    }

    pub fn as_slice(&self) -> &[WeightedGaussian] {
        &self.components
    }

    /// Drop components whose log-weight is at or below `threshold`.
    pub fn prune(&mut self, threshold: f64) {
        self.components.retain(|c| c.log_weight > threshold);
    }
}

impl std::ops::Index<usize> for GaussianMixture {
    type Output = WeightedGaussian;
    fn index(&self, idx: usize) -> &WeightedGaussian {
        &self.components[idx]
    }
}

impl IntoIterator for GaussianMixture {
    type Item = WeightedGaussian;
    type IntoIter = std::vec::IntoIter<WeightedGaussian>;
    fn into_iter(self) -> Self::IntoIter {
        self.components.into_iter()
    }
}

/// `log(sum(exp(values)))`, stable against overflow/underflow. An
/// all-`-inf` input yields `-inf` (spec's `NumericalUnderflow`).
pub fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Normalizes a slice of log-weights via `logsumexp`. Invariant to adding a
/// constant to every input: the normalized output is unchanged, and
/// `log_sum` shifts by that constant.
pub fn normalize_log_weights(log_weights: &[f64]) -> (Vec<f64>, f64) {
    let log_sum = logsumexp(log_weights);
    if !log_sum.is_finite() {
        return (vec![f64::NEG_INFINITY; log_weights.len()], log_sum);
    }
    let normalized = log_weights.iter().map(|w| w - log_sum).collect();
    (normalized, log_sum)
}

/// `f(x, dt)`, its Jacobian, process noise, and state dimension.
pub trait MotionModel {
    fn state_dim(&self) -> usize;
    fn f(&self, x: &Array1<f64>, dt: f64) -> Array1<f64>;
    fn jacobian(&self, x: &Array1<f64>, dt: f64) -> Array2<f64>;
    fn process_noise(&self, dt: f64) -> Array2<f64>;
}

/// `h(x)`, its Jacobian, and measurement noise covariance.
pub trait MeasurementModel {
    fn meas_dim(&self) -> usize;
    fn h(&self, x: &Array1<f64>) -> Array1<f64>;
    fn jacobian(&self, x: &Array1<f64>) -> Array2<f64>;
    fn noise_cov(&self) -> Array2<f64>;
}

/// Pure functions over Gaussian densities: predict, update, gating,
/// moment matching, and likelihood evaluation (spec §4.A).
pub trait DensityOps {
    fn predict(&self, g: &Gaussian, motion_model: &dyn MotionModel, dt: f64) -> Gaussian;

    fn update(
        &self,
        g: &Gaussian,
        z: &Array1<f64>,
        meas_model: &dyn MeasurementModel,
    ) -> Result<Gaussian>;

    fn update_states_with_likelihoods_by_single_measurement(
        &self,
        mixture: &GaussianMixture,
        z: &Array1<f64>,
        meas_model: &dyn MeasurementModel,
    ) -> Result<(Vec<Gaussian>, Vec<f64>)>;

    fn predict_loglikelihood(
        &self,
        g: &Gaussian,
        z: &Array1<f64>,
        meas_model: &dyn MeasurementModel,
    ) -> f64;

    fn ellipsoidal_gating(
        &self,
        g: &Gaussian,
        measurements: &Array2<f64>,
        meas_model: &dyn MeasurementModel,
        gating_size: f64,
    ) -> (Vec<usize>, Vec<bool>);

    fn moment_matching(&self, normalized_log_weights: &[f64], mixture: &[Gaussian]) -> Gaussian;
}

/// Kalman/EKF density operations shared by every component that holds a
/// Gaussian state: prediction and update linearize the motion/measurement
/// model via their Jacobians, so linear models fall out as a special case.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearGaussianDensity;

const JITTER: f64 = 1e-9;

/// Returns the innovation covariance Cholesky factor `L` (`S = L L^T`),
/// symmetrizing and jittering `S` first if Cholesky fails once.
fn innovation_cholesky(s: &Array2<f64>) -> Result<Array2<f64>> {
    let sym = (s + &s.t()) * 0.5;
    match sym.cholesky(UPLO::Lower) {
        Ok(l) => Ok(l),
        Err(_) => {
            let n = sym.nrows();
            let jittered = &sym + &(Array2::<f64>::eye(n) * JITTER);
            jittered.cholesky(UPLO::Lower).map_err(|e| Error::InvalidCovariance {
                detail: format!("innovation covariance not SPD after jitter: {}", e),
            })
        }
    }
}

/// The precision-Cholesky factor `L^-T` such that `prec_chol @ prec_chol^T =
/// S^-1`, the same quantity the teacher's `compute_precision_cholesky_full`
/// derives from a covariance's Cholesky factor via `solve_triangular`.
fn precision_cholesky(l: &Array2<f64>) -> Result<Array2<f64>> {
    let n = l.nrows();
    let l_inv = l
        .solve_triangular(UPLO::Lower, Diag::NonUnit, &Array2::<f64>::eye(n))
        .map_err(|e| Error::InvalidCovariance {
            detail: format!("triangular solve failed: {}", e),
        })?;
    Ok(l_inv.t().to_owned())
}

impl DensityOps for LinearGaussianDensity {
    fn predict(&self, g: &Gaussian, motion_model: &dyn MotionModel, dt: f64) -> Gaussian {
        let f_jac = motion_model.jacobian(&g.x, dt);
        let x_pred = motion_model.f(&g.x, dt);
        let p_pred = f_jac.dot(&g.p).dot(&f_jac.t()) + motion_model.process_noise(dt);
        let mut predicted = Gaussian::new(x_pred, p_pred);
        predicted.symmetrize();
        predicted
    }

    fn update(
        &self,
        g: &Gaussian,
        z: &Array1<f64>,
        meas_model: &dyn MeasurementModel,
    ) -> Result<Gaussian> {
        let h_jac = meas_model.jacobian(&g.x);
        let z_pred = meas_model.h(&g.x);
        let s = h_jac.dot(&g.p).dot(&h_jac.t()) + meas_model.noise_cov();
        let l = innovation_cholesky(&s)?;
        // S^-1 via the Cholesky factor, matching the teacher's
        // `solve_triangular`-based precision computation.
        let n = s.nrows();
        let s_inv = l
            .solve_triangular(UPLO::Lower, Diag::NonUnit, &Array2::<f64>::eye(n))
            .map_err(|e| Error::InvalidCovariance {
                detail: format!("triangular solve failed: {}", e),
            })?;
        let s_inv = s_inv.t().dot(&s_inv);
        let kalman_gain = g.p.dot(&h_jac.t()).dot(&s_inv);
        let innovation = z - &z_pred;
        let x_new = &g.x + kalman_gain.dot(&innovation);
        let identity = Array2::<f64>::eye(g.dim());
        let p_new = (&identity - kalman_gain.dot(&h_jac)).dot(&g.p);
        let mut updated = Gaussian::new(x_new, p_new);
        updated.symmetrize();
        Ok(updated)
    }

    fn update_states_with_likelihoods_by_single_measurement(
        &self,
        mixture: &GaussianMixture,
        z: &Array1<f64>,
        meas_model: &dyn MeasurementModel,
    ) -> Result<(Vec<Gaussian>, Vec<f64>)> {
        let mut updated = Vec::with_capacity(mixture.len());
        let mut loglikelihoods = Vec::with_capacity(mixture.len());
        for component in mixture.iter() {
            loglikelihoods.push(self.predict_loglikelihood(&component.gaussian, z, meas_model));
            updated.push(self.update(&component.gaussian, z, meas_model)?);
        }
        Ok((updated, loglikelihoods))
    }

    fn predict_loglikelihood(
        &self,
        g: &Gaussian,
        z: &Array1<f64>,
        meas_model: &dyn MeasurementModel,
    ) -> f64 {
        let h_jac = meas_model.jacobian(&g.x);
        let z_pred = meas_model.h(&g.x);
        let s = h_jac.dot(&g.p).dot(&h_jac.t()) + meas_model.noise_cov();
        let l = match innovation_cholesky(&s) {
            Ok(l) => l,
            Err(_) => return f64::NEG_INFINITY,
        };
        let prec_chol = match precision_cholesky(&l) {
            Ok(p) => p,
            Err(_) => return f64::NEG_INFINITY,
        };
        let innovation = z - &z_pred;
        let scaled = innovation.dot(&prec_chol);
        let mahalanobis_sq: f64 = scaled.iter().map(|v| v * v).sum();
        let log_det_chol: f64 = prec_chol.diag().iter().map(|v| v.ln()).sum();
        let k = innovation.len() as f64;
        log_det_chol - 0.5 * (mahalanobis_sq + k * (2.0 * std::f64::consts::PI).ln())
    }

    fn ellipsoidal_gating(
        &self,
        g: &Gaussian,
        measurements: &Array2<f64>,
        meas_model: &dyn MeasurementModel,
        gating_size: f64,
    ) -> (Vec<usize>, Vec<bool>) {
        use statrs::distribution::{ChiSquared, ContinuousCDF};

        let h_jac = meas_model.jacobian(&g.x);
        let z_pred = meas_model.h(&g.x);
        let s = h_jac.dot(&g.p).dot(&h_jac.t()) + meas_model.noise_cov();
        let threshold = ChiSquared::new(meas_model.meas_dim() as f64)
            .expect("measurement dimension must be positive")
            .inverse_cdf(gating_size);

        let l = match innovation_cholesky(&s) {
            Ok(l) => l,
            Err(_) => return (Vec::new(), vec![false; measurements.nrows()]),
        };
        let prec_chol = match precision_cholesky(&l) {
            Ok(p) => p,
            Err(_) => return (Vec::new(), vec![false; measurements.nrows()]),
        };

        // Vectorized over every measurement at once, as the teacher's
        // `estimate_log_gaussian_prob` scales a whole observation matrix by
        // `prec_chol` in one `dot` rather than solving row by row.
        let diff = measurements - &z_pred.view().insert_axis(Axis(0));
        let scaled = diff.dot(&prec_chol);
        let d2 = scaled.mapv(|v| v * v).sum_axis(Axis(1));

        let mut indices = Vec::new();
        let mut mask = vec![false; measurements.nrows()];
        for (m, d2m) in d2.iter().enumerate() {
            if *d2m <= threshold {
                indices.push(m);
                mask[m] = true;
            }
        }
        (indices, mask)
    }

    fn moment_matching(&self, normalized_log_weights: &[f64], mixture: &[Gaussian]) -> Gaussian {
        assert_eq!(normalized_log_weights.len(), mixture.len());
        if mixture.len() == 1 {
            return mixture[0].clone();
        }
        let weights: Vec<f64> = normalized_log_weights.iter().map(|w| w.exp()).collect();
        let dim = mixture[0].dim();
        let mut mean = Array1::<f64>::zeros(dim);
        for (w, comp) in weights.iter().zip(mixture.iter()) {
            mean = mean + &comp.x * *w;
        }
        let mut cov = Array2::<f64>::zeros((dim, dim));
        for (w, comp) in weights.iter().zip(mixture.iter()) {
            let diff = &comp.x - &mean;
            let outer = diff
                .view()
                .into_shape((dim, 1))
                .unwrap()
                .dot(&diff.view().into_shape((1, dim)).unwrap());
            cov = cov + (&comp.p + &outer) * *w;
        }
        let mut merged = Gaussian::new(mean, cov);
        merged.symmetrize();
        merged
    }
}
