use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;

use crate::error::MeterError;
use crate::session::GasReading;

/// Source of gas readings, e.g. a Bluetooth four-gas meter.
pub trait MeterSource: Send + Sync {
    fn next_reading(&self) -> Result<GasReading, MeterError>;
}

/// Stand-in for a four-gas meter when no hardware is attached.
///
/// Readings cycle through plausible cave-air values and are stamped with the
/// current time. After `disconnect` every read fails until `reconnect`.
pub struct SimulatedMeter {
    tick: AtomicU64,
    connected: AtomicBool,
}

impl SimulatedMeter {
    pub fn new() -> Self {
        Self {
            tick: AtomicU64::new(0),
            connected: AtomicBool::new(true),
        }
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }
}

impl Default for SimulatedMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl MeterSource for SimulatedMeter {
    fn next_reading(&self) -> Result<GasReading, MeterError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(MeterError::Disconnected("simulated meter unplugged".to_string()));
        }

        let t = self.tick.fetch_add(1, Ordering::SeqCst);
        Ok(GasReading::new(
            20.9 - (t % 7) as f64 * 0.4,
            (t % 5) as f64 * 3.0,
            (t % 3) as f64 * 1.5,
            (t % 4) as f64 * 1.2,
            Utc::now(),
        ))
    }
}

#[cfg(test)]
mod simulated_tests {
    use super::*;
    use crate::validation::Validator;

    #[test]
    fn test_simulated_readings_are_plausible() {
        let meter = SimulatedMeter::new();
        for _ in 0..20 {
            let reading = meter.next_reading().unwrap();
            Validator::validate_reading(&reading).unwrap();
            assert!(reading.o2_pct >= 18.0);
        }
    }

    #[test]
    fn test_simulated_meter_disconnect() {
        let meter = SimulatedMeter::new();
        meter.disconnect();
        assert!(matches!(
            meter.next_reading(),
            Err(MeterError::Disconnected(_))
        ));

        meter.reconnect();
        assert!(meter.next_reading().is_ok());
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedMeter;

#[cfg(any(test, feature = "test-utils"))]
mod scripted {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Meter that replays a fixed list of readings, then reports `Exhausted`.
    #[derive(Default)]
    pub struct ScriptedMeter {
        readings: Mutex<VecDeque<GasReading>>,
    }

    impl ScriptedMeter {
        pub fn new(readings: impl IntoIterator<Item = GasReading>) -> Self {
            Self {
                readings: Mutex::new(readings.into_iter().collect()),
            }
        }

        pub fn push(&self, reading: GasReading) {
            self.readings.lock().unwrap().push_back(reading);
        }

        pub fn remaining(&self) -> usize {
            self.readings.lock().unwrap().len()
        }
    }

    impl MeterSource for ScriptedMeter {
        fn next_reading(&self) -> Result<GasReading, MeterError> {
            self.readings
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(MeterError::Exhausted)
        }
    }

}
