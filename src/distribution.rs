//! Inter-transmission time distributions for sensors.
//!
//! Sensors draw the gap to their next emission from a
//! [`TransmitDistribution`]. The built-in [`IntervalDistribution`] covers
//! the usual shapes and is serializable so scenario files can name it.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Source of inter-transmission times.
pub trait TransmitDistribution: Send {
    /// Draws the time until the next transmission. Never negative.
    fn next(&mut self, rng: &mut dyn RngCore) -> SimTime;

    /// Mean interval, used for reporting.
    fn mean(&self) -> SimTime;

    /// Checks the parameters before a run. A distribution that can only
    /// yield zero intervals must fail here.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Built-in interval distributions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntervalDistribution {
    /// Fixed interval
    Deterministic { interval: SimTime },
    /// Uniform between min and max
    Uniform { min: SimTime, max: SimTime },
    /// Normal with mean and standard deviation
    /// Note: samples are clamped to be non-negative
    Normal { mean: SimTime, std_dev: f64 },
    /// Exponential with given mean (lambda = 1/mean)
    Exponential { mean: SimTime },
}

impl IntervalDistribution {
    /// Fixed interval.
    pub fn deterministic(interval: SimTime) -> Self {
        IntervalDistribution::Deterministic { interval }
    }

    /// Checks that the parameters describe a usable distribution.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            IntervalDistribution::Deterministic { interval } if !(interval > 0.0) => {
                Err(format!("deterministic interval must be positive, got {}", interval))
            }
            IntervalDistribution::Uniform { min, max } if !(min >= 0.0 && max >= min && max > 0.0) => {
                Err(format!("uniform bounds must satisfy 0 <= min <= max, max > 0 (got {}..{})", min, max))
            }
            IntervalDistribution::Normal { mean, std_dev } if !(mean > 0.0 && std_dev >= 0.0) => {
                Err(format!("normal needs mean > 0 and std_dev >= 0 (got {}, {})", mean, std_dev))
            }
            IntervalDistribution::Exponential { mean } if !(mean > 0.0) => {
                Err(format!("exponential mean must be positive, got {}", mean))
            }
            _ => Ok(()),
        }
    }
}

impl TransmitDistribution for IntervalDistribution {
    fn next(&mut self, rng: &mut dyn RngCore) -> SimTime {
        let value = match *self {
            IntervalDistribution::Deterministic { interval } => interval,
            IntervalDistribution::Uniform { min, max } => {
                if min >= max {
                    return min.max(0.0);
                }
                rng.gen_range(min..max)
            }
            IntervalDistribution::Normal { mean, std_dev } => {
                // Box-Muller
                let u1: f64 = rng.gen::<f64>().max(1e-12);
                let u2: f64 = rng.gen();
                let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                mean + std_dev * z0
            }
            IntervalDistribution::Exponential { mean } => {
                let u: f64 = rng.gen::<f64>().max(1e-12);
                -mean * u.ln()
            }
        };
        value.max(0.0)
    }

    fn mean(&self) -> SimTime {
        match *self {
            IntervalDistribution::Deterministic { interval } => interval,
            IntervalDistribution::Uniform { min, max } => (min + max) / 2.0,
            IntervalDistribution::Normal { mean, .. } => mean,
            IntervalDistribution::Exponential { mean } => mean,
        }
    }

    fn validate(&self) -> Result<(), String> {
        IntervalDistribution::validate(self)
    }
}
