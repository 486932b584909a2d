//! Re-exports of the types most callers need to drive a [`Tracker`].
//!
//! [`Tracker`]: crate::tracker::Tracker

pub use crate::assignment::{assign, CostMatrix};
pub use crate::bernoulli::Bernoulli;
pub use crate::config::{TrackerConfig, TrackerConfigBuilder};
pub use crate::density::{
    DensityOps, Gaussian, GaussianMixture, LinearGaussianDensity, MeasurementModel, MotionModel,
    WeightedGaussian,
};
pub use crate::error::{Error, Result};
pub use crate::global::{Association, GlobalHypothesis, MultiBernoulliMixture};
pub use crate::hypothesis::{SingleTargetHypothesis, Track};
pub use crate::models::{BirthModel, SensorModel};
pub use crate::poisson::PoissonRFS;
pub use crate::tracker::{Estimate, Tracker};
