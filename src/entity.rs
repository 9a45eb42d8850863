//! Sensors and actuators: the leaf entities of a scenario.
//!
//! Both attach to a gateway device over a link with a fixed latency. A
//! sensor emits on every sensor edge whose source is its sensor type; an
//! actuator receives tuples addressed to its actuator type.

use crate::distribution::{IntervalDistribution, TransmitDistribution};
use crate::types::{DeviceId, SimTime};

/// A tuple source bound to a device.
pub struct Sensor {
    /// Sensor name
    pub name: String,
    /// Application sensor type it instantiates
    pub sensor_type: String,
    /// Device the sensor is attached to
    pub gateway: DeviceId,
    /// Latency of the sensor to gateway link
    pub latency: SimTime,
    distribution: Box<dyn TransmitDistribution>,
}

impl Sensor {
    /// Creates a sensor with a built-in interval distribution.
    pub fn new(
        name: impl Into<String>,
        sensor_type: impl Into<String>,
        gateway: DeviceId,
        latency: SimTime,
        distribution: IntervalDistribution,
    ) -> Self {
        Self::with_distribution(name, sensor_type, gateway, latency, Box::new(distribution))
    }

    /// Creates a sensor with a custom distribution.
    pub fn with_distribution(
        name: impl Into<String>,
        sensor_type: impl Into<String>,
        gateway: DeviceId,
        latency: SimTime,
        distribution: Box<dyn TransmitDistribution>,
    ) -> Self {
        Self {
            name: name.into(),
            sensor_type: sensor_type.into(),
            gateway,
            latency,
            distribution,
        }
    }

    /// Draws the delay until the next transmission, never negative.
    pub fn next_interval(&mut self, rng: &mut dyn rand::RngCore) -> SimTime {
        self.distribution.next(rng).max(0.0)
    }

    /// Checks the link latency and the interval distribution.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.latency >= 0.0 && self.latency.is_finite()) {
            return Err(format!("latency must be non-negative, got {}", self.latency));
        }
        self.distribution.validate()
    }

    /// Mean transmission interval.
    pub fn mean_interval(&self) -> SimTime {
        self.distribution.mean()
    }
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("name", &self.name)
            .field("sensor_type", &self.sensor_type)
            .field("gateway", &self.gateway)
            .field("latency", &self.latency)
            .field("mean_interval", &self.mean_interval())
            .finish()
    }
}

/// A tuple sink bound to a device.
#[derive(Clone, Debug)]
pub struct Actuator {
    /// Actuator name
    pub name: String,
    /// Application actuator type it instantiates
    pub actuator_type: String,
    /// Device the actuator is attached to
    pub gateway: DeviceId,
    /// Latency of the gateway to actuator link
    pub latency: SimTime,
}

impl Actuator {
    pub fn new(
        name: impl Into<String>,
        actuator_type: impl Into<String>,
        gateway: DeviceId,
        latency: SimTime,
    ) -> Self {
        Self {
            name: name.into(),
            actuator_type: actuator_type.into(),
            gateway,
            latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    /// Always answers with the same, possibly invalid, interval.
    struct Fixed(SimTime);

    impl TransmitDistribution for Fixed {
        fn next(&mut self, _rng: &mut dyn rand::RngCore) -> SimTime {
            self.0
        }

        fn mean(&self) -> SimTime {
            self.0
        }
    }

    #[test]
    fn test_negative_interval_clamped() {
        let mut sensor = Sensor::with_distribution("s-1", "TEMP", 0, 1.0, Box::new(Fixed(-3.0)));
        let mut rng = Pcg64::seed_from_u64(0);
        assert_eq!(sensor.next_interval(&mut rng), 0.0);
        // Custom distributions validate by default
        assert!(sensor.validate().is_ok());
    }

    #[test]
    fn test_sensor_validate() {
        let sensor = Sensor::new("s-2", "TEMP", 0, 1.0, IntervalDistribution::deterministic(0.0));
        assert!(sensor.validate().unwrap_err().contains("interval"));

        let sensor = Sensor::new("s-3", "TEMP", 0, -1.0, IntervalDistribution::deterministic(5.0));
        assert!(sensor.validate().unwrap_err().contains("latency"));
    }

    #[test]
    fn test_sensor_interval() {
        let mut sensor = Sensor::new("s-0", "TEMP", 2, 1.0, IntervalDistribution::deterministic(5.0));
        let mut rng = Pcg64::seed_from_u64(0);
        assert_eq!(sensor.next_interval(&mut rng), 5.0);
        assert_eq!(sensor.mean_interval(), 5.0);
        assert!(format!("{:?}", sensor).contains("s-0"));
    }
}
