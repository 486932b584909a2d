//! Constant-velocity motion/measurement/sensor/birth models used by the
//! integration tests in [`crate::tracker`] and [`crate::poisson`]. Not part
//! of the public API surface.

use ndarray::{Array1, Array2};

use crate::density::{Gaussian, GaussianMixture, MeasurementModel, MotionModel, WeightedGaussian};
use crate::models::{BirthModel, SensorModel};

/// State `[x, y, vx, vy]`, nearly-constant-velocity process noise.
pub struct ConstantVelocityMotionModel {
    pub process_noise_std: f64,
}

impl ConstantVelocityMotionModel {
    pub fn new(process_noise_std: f64) -> Self {
        ConstantVelocityMotionModel { process_noise_std }
    }
}

impl MotionModel for ConstantVelocityMotionModel {
    fn state_dim(&self) -> usize {
        4
    }

    fn f(&self, x: &Array1<f64>, dt: f64) -> Array1<f64> {
        Array1::from(vec![
            x[0] + dt * x[2],
            x[1] + dt * x[3],
            x[2],
            x[3],
        ])
    }

    fn jacobian(&self, _x: &Array1<f64>, dt: f64) -> Array2<f64> {
        Array2::from_shape_vec(
            (4, 4),
            vec![
                1.0, 0.0, dt, 0.0,
                0.0, 1.0, 0.0, dt,
                0.0, 0.0, 1.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ],
        )
        .unwrap()
    }

    fn process_noise(&self, dt: f64) -> Array2<f64> {
        let q = self.process_noise_std.powi(2);
        let dt2 = dt * dt / 2.0;
        let g = Array2::from_shape_vec((4, 2), vec![dt2, 0.0, 0.0, dt2, dt, 0.0, 0.0, dt]).unwrap();
        g.dot(&g.t()) * q
    }
}

/// Observes position only: `h(x) = [x, y]`.
pub struct ConstantVelocityMeasurementModel {
    pub noise_std: f64,
}

impl ConstantVelocityMeasurementModel {
    pub fn new(noise_std: f64) -> Self {
        ConstantVelocityMeasurementModel { noise_std }
    }
}

impl MeasurementModel for ConstantVelocityMeasurementModel {
    fn meas_dim(&self) -> usize {
        2
    }

    fn h(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::from(vec![x[0], x[1]])
    }

    fn jacobian(&self, _x: &Array1<f64>) -> Array2<f64> {
        Array2::from_shape_vec((2, 4), vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0]).unwrap()
    }

    fn noise_cov(&self) -> Array2<f64> {
        Array2::eye(2) * self.noise_std.powi(2)
    }
}

pub struct ConstantSensorModel {
    pub detection_probability: f64,
    pub clutter_rate: f64,
    pub region_volume: f64,
}

impl SensorModel for ConstantSensorModel {
    fn detection_probability(&self) -> f64 {
        self.detection_probability
    }

    fn clutter_rate(&self) -> f64 {
        self.clutter_rate
    }

    fn region_volume(&self) -> f64 {
        self.region_volume
    }
}

/// Births one component at a fixed location every step it is sampled, or
/// nothing at all (for the pure-clutter scenario).
pub struct FixedPointBirthModel {
    pub component: Option<WeightedGaussian>,
}

impl FixedPointBirthModel {
    pub fn at(x: f64, y: f64, log_weight: f64, covariance_scale: f64) -> Self {
        FixedPointBirthModel {
            component: Some(WeightedGaussian::new(
                log_weight,
                Gaussian::new(
                    Array1::from(vec![x, y, 0.0, 0.0]),
                    Array2::eye(4) * covariance_scale,
                ),
            )),
        }
    }

    pub fn none() -> Self {
        FixedPointBirthModel { component: None }
    }
}

impl BirthModel for FixedPointBirthModel {
    fn sample(&self, _t: f64) -> GaussianMixture {
        match &self.component {
            Some(c) => GaussianMixture::new(vec![c.clone()]),
            None => GaussianMixture::empty(),
        }
    }
}
