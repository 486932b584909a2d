//! `pmbm-tracker` implements the core recursion of a Poisson
//! Multi-Bernoulli Mixture (PMBM) filter: a Bayesian multi-object tracker
//! that maintains a Poisson point process (PPP) intensity over undetected
//! targets alongside a multi-Bernoulli mixture (MBM) of hypothesis trees
//! over detected ones, and folds in a new measurement set each [`step`].
//!
//! ## Layout
//!
//! - [`density`]: Gaussian state primitives, the `DensityOps` facade
//!   (predict/update/gate/moment-match), and the motion/measurement model
//!   traits consumed by the recursion.
//! - [`bernoulli`]: the Bernoulli component ("target exists w.p. `r`").
//! - [`hypothesis`]: single-target hypotheses and the per-track arena.
//! - [`global`]: global hypotheses and the multi-Bernoulli mixture.
//! - [`poisson`]: the PPP intensity of undetected targets.
//! - [`murty`]: ranked linear-assignment enumeration (Hungarian + Murty).
//! - [`assignment`]: per-global cost-matrix construction and decoding.
//! - [`models`]: the `SensorModel`/`BirthModel` traits.
//! - [`config`]: `TrackerConfig` and its builder.
//! - [`tracker`]: the top-level `Tracker` and its `step` recursion.
//!
//! [`step`]: tracker::Tracker::step
//!
//! # Example
//!
//! ```
//! use ndarray::array;
//! use pmbm_tracker::prelude::*;
//!
//! # struct ConstVel;
//! # impl MotionModel for ConstVel {
//! #     fn state_dim(&self) -> usize { 4 }
//! #     fn f(&self, x: &ndarray::Array1<f64>, dt: f64) -> ndarray::Array1<f64> {
//! #         ndarray::array![x[0] + dt * x[2], x[1] + dt * x[3], x[2], x[3]]
//! #     }
//! #     fn jacobian(&self, _x: &ndarray::Array1<f64>, dt: f64) -> ndarray::Array2<f64> {
//! #         ndarray::array![[1.,0.,dt,0.],[0.,1.,0.,dt],[0.,0.,1.,0.],[0.,0.,0.,1.]]
//! #     }
//! #     fn process_noise(&self, _dt: f64) -> ndarray::Array2<f64> { ndarray::Array2::eye(4) * 0.01 }
//! # }
//! # struct PosOnly;
//! # impl MeasurementModel for PosOnly {
//! #     fn meas_dim(&self) -> usize { 2 }
//! #     fn h(&self, x: &ndarray::Array1<f64>) -> ndarray::Array1<f64> { ndarray::array![x[0], x[1]] }
//! #     fn jacobian(&self, _x: &ndarray::Array1<f64>) -> ndarray::Array2<f64> {
//! #         ndarray::array![[1.,0.,0.,0.],[0.,1.,0.,0.]]
//! #     }
//! #     fn noise_cov(&self) -> ndarray::Array2<f64> { ndarray::Array2::eye(2) * 0.25 }
//! # }
//! # struct ConstClutter;
//! # impl SensorModel for ConstClutter {
//! #     fn detection_probability(&self) -> f64 { 0.9 }
//! #     fn clutter_rate(&self) -> f64 { 1.0 }
//! #     fn region_volume(&self) -> f64 { 1000.0 }
//! # }
//! # struct NoBirth;
//! # impl BirthModel for NoBirth {
//! #     fn sample(&self, _t: f64) -> GaussianMixture { GaussianMixture::empty() }
//! # }
//! let config = TrackerConfig::builder().build().unwrap();
//! let mut tracker = Tracker::new(
//!     Box::new(PosOnly),
//!     Box::new(ConstClutter),
//!     Box::new(ConstVel),
//!     Box::new(NoBirth),
//!     LinearGaussianDensity,
//!     config,
//! );
//! let measurements = array![[0.0, 0.0]];
//! let estimates = tracker.step(&measurements, 1.0).unwrap();
//! ```

pub mod assignment;
pub mod bernoulli;
pub mod config;
pub mod density;
pub mod error;
pub mod global;
pub mod hypothesis;
pub mod models;
pub mod murty;
pub mod poisson;
pub mod prelude;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Error;
