use crate::checkpoint::Checkpoint;
use crate::error::ValidationError;
use crate::session::GasReading;

/// Validator for domain input. Storage never calls this; use cases do.
pub struct Validator;

impl Validator {
    /// Name must contain something other than whitespace.
    pub fn validate_name(name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }

    pub fn validate_station_id(station_id: &str) -> Result<(), ValidationError> {
        if station_id.trim().is_empty() {
            return Err(ValidationError::EmptyStationId);
        }
        Ok(())
    }

    pub fn validate_depth(depth: f64) -> Result<(), ValidationError> {
        if !is_non_negative(depth) {
            return Err(ValidationError::InvalidDepth(depth));
        }
        Ok(())
    }

    pub fn validate_distance(distance: f64) -> Result<(), ValidationError> {
        if !is_non_negative(distance) {
            return Err(ValidationError::InvalidDistance(distance));
        }
        Ok(())
    }

    /// Validate everything about a checkpoint that does not need storage.
    /// Station existence is checked by the use case.
    pub fn validate_checkpoint(checkpoint: &Checkpoint) -> Result<(), ValidationError> {
        Self::validate_name(&checkpoint.name)?;
        Self::validate_station_id(&checkpoint.survey_station_id)?;
        Self::validate_depth(checkpoint.depth_from_entrance)?;
        Self::validate_distance(checkpoint.distance_from_station)?;
        Ok(())
    }

    /// Each sensor has its own plausible range.
    /// O2 and LEL are percentages; CO and H2S are non-negative ppm.
    pub fn validate_reading(reading: &GasReading) -> Result<(), ValidationError> {
        check_range("o2_pct", reading.o2_pct, 0.0, 100.0)?;
        check_range("co_ppm", reading.co_ppm, 0.0, f64::MAX)?;
        check_range("h2s_ppm", reading.h2s_ppm, 0.0, f64::MAX)?;
        check_range("lel_pct", reading.lel_pct, 0.0, 100.0)?;
        Ok(())
    }
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn check_range(
    sensor: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if !value.is_finite() || !(min..=max).contains(&value) {
        return Err(ValidationError::ReadingOutOfRange { sensor, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{NewCheckpoint, PassageType};
    use chrono::Utc;

    fn checkpoint(name: &str, depth: f64, distance: f64) -> Checkpoint {
        Checkpoint::create(
            NewCheckpoint::new(name, PassageType::Canyon, "A1")
                .with_depth(depth)
                .with_distance(distance),
            Utc::now(),
        )
    }

    #[test]
    fn test_valid_checkpoint() {
        assert!(Validator::validate_checkpoint(&checkpoint("Entrance Pit", 0.0, 0.0)).is_ok());
        assert!(Validator::validate_checkpoint(&checkpoint("Deep", 120.5, 3.2)).is_ok());
    }

    #[test]
    fn test_invalid_name() {
        assert_eq!(
            Validator::validate_checkpoint(&checkpoint("", 0.0, 0.0)),
            Err(ValidationError::EmptyName)
        );
        assert_eq!(
            Validator::validate_checkpoint(&checkpoint("   ", 0.0, 0.0)),
            Err(ValidationError::EmptyName)
        );
    }

    #[test]
    fn test_invalid_numeric_fields() {
        assert_eq!(
            Validator::validate_checkpoint(&checkpoint("X", -1.0, 0.0)),
            Err(ValidationError::InvalidDepth(-1.0))
        );
        assert_eq!(
            Validator::validate_checkpoint(&checkpoint("X", 0.0, -0.5)),
            Err(ValidationError::InvalidDistance(-0.5))
        );
        assert!(Validator::validate_depth(f64::NAN).is_err());
        assert!(Validator::validate_distance(f64::INFINITY).is_err());
    }

    #[test]
    fn test_empty_station_id() {
        let mut cp = checkpoint("X", 0.0, 0.0);
        cp.survey_station_id = String::new();
        assert_eq!(
            Validator::validate_checkpoint(&cp),
            Err(ValidationError::EmptyStationId)
        );
    }

    #[test]
    fn test_reading_ranges() {
        let ok = GasReading::new(20.9, 3.0, 0.0, 1.5, Utc::now());
        assert!(Validator::validate_reading(&ok).is_ok());

        let bad_o2 = GasReading::new(120.0, 3.0, 0.0, 1.5, Utc::now());
        assert_eq!(
            Validator::validate_reading(&bad_o2),
            Err(ValidationError::ReadingOutOfRange {
                sensor: "o2_pct",
                value: 120.0
            })
        );

        let bad_co = GasReading::new(20.9, -1.0, 0.0, 1.5, Utc::now());
        assert!(Validator::validate_reading(&bad_co).is_err());

        let bad_lel = GasReading::new(20.9, 1.0, 0.0, f64::NAN, Utc::now());
        assert!(Validator::validate_reading(&bad_lel).is_err());
    }
}
