use serde::{Deserialize, Serialize};

/// Surveyed reference point. Maintained outside the core; read for
/// validation and nearest-station lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyStation {
    pub station_id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl SurveyStation {
    pub fn new(
        station_id: impl Into<String>,
        name: impl Into<String>,
        x: f64,
        y: f64,
        z: f64,
    ) -> Self {
        Self {
            station_id: station_id.into(),
            name: name.into(),
            x,
            y,
            z,
        }
    }

    pub fn distance_squared(&self, x: f64, y: f64, z: f64) -> f64 {
        (self.x - x).powi(2) + (self.y - y).powi(2) + (self.z - z).powi(2)
    }
}

/// Pick the station closest to (x, y, z). Ties go to the lower station id.
pub fn nearest_station(
    stations: impl IntoIterator<Item = SurveyStation>,
    x: f64,
    y: f64,
    z: f64,
) -> Option<SurveyStation> {
    stations.into_iter().min_by(|a, b| {
        a.distance_squared(x, y, z)
            .total_cmp(&b.distance_squared(x, y, z))
            .then_with(|| a.station_id.cmp(&b.station_id))
    })
}
