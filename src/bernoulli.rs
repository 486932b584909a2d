//! Bernoulli component (4.B): "target exists w.p. `r`; if it exists its
//! state is this Gaussian."

use ndarray::Array1;

use crate::density::{DensityOps, Gaussian, MeasurementModel, MotionModel};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct Bernoulli {
    pub existence_probability: f64,
    pub gaussian: Gaussian,
}

impl Bernoulli {
    pub fn new(existence_probability: f64, gaussian: Gaussian) -> Self {
        Bernoulli {
            existence_probability,
            gaussian,
        }
    }

    /// `r <- r * p_s`; Gaussian predicted through the motion model.
    pub fn predict<D: DensityOps>(
        &self,
        density: &D,
        motion_model: &dyn MotionModel,
        survival_probability: f64,
        dt: f64,
    ) -> Bernoulli {
        Bernoulli {
            existence_probability: self.existence_probability * survival_probability,
            gaussian: density.predict(&self.gaussian, motion_model, dt),
        }
    }

    /// Models "target exists but was not detected".
    ///
    /// `r' = r(1-p_D) / (1 - r + r(1-p_D))`;
    /// `log_likelihood = log(1 - r + r(1-p_D))`.
    pub fn undetected_update(&self, detection_probability: f64) -> (Bernoulli, f64) {
        let r = self.existence_probability;
        let miss = 1.0 - detection_probability;
        let denom = 1.0 - r + r * miss;
        let r_new = r * miss / denom;
        let log_likelihood = denom.ln();
        (
            Bernoulli {
                existence_probability: r_new,
                gaussian: self.gaussian.clone(),
            },
            log_likelihood,
        )
    }

    /// Kalman-updates the Gaussian by `z`; `r' = 1`;
    /// `log_likelihood = log(r) + log(p_D) + predict_loglikelihood(N, z)`.
    pub fn detected_update<D: DensityOps>(
        &self,
        density: &D,
        z: &Array1<f64>,
        meas_model: &dyn MeasurementModel,
        detection_probability: f64,
    ) -> Result<(Bernoulli, f64)> {
        let predicted_loglikelihood = density.predict_loglikelihood(&self.gaussian, z, meas_model);
        let log_likelihood = self.existence_probability.ln()
            + detection_probability.ln()
            + predicted_loglikelihood;
        let updated_gaussian = density.update(&self.gaussian, z, meas_model)?;
        Ok((
            Bernoulli {
                existence_probability: 1.0,
                gaussian: updated_gaussian,
            },
            log_likelihood,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn unit_gaussian() -> Gaussian {
        Gaussian::new(Array1::zeros(2), Array2::eye(2))
    }

    #[test]
    fn undetected_update_decreases_existence() {
        let b = Bernoulli::new(0.9, unit_gaussian());
        let (updated, ll) = b.undetected_update(0.8);
        let expected_r = 0.9 * 0.2 / (1.0 - 0.9 + 0.9 * 0.2);
        assert_abs_diff_eq!(updated.existence_probability, expected_r, epsilon = 1e-9);
        assert_abs_diff_eq!(ll, (1.0 - 0.9 + 0.9 * 0.2_f64).ln(), epsilon = 1e-9);
    }

    #[test]
    fn undetected_update_full_existence_full_detection_vanishes() {
        let b = Bernoulli::new(1.0, unit_gaussian());
        let (updated, _) = b.undetected_update(1.0);
        assert_abs_diff_eq!(updated.existence_probability, 0.0, epsilon = 1e-9);
    }
}
