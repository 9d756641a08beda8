use serde::{Deserialize, Serialize};

/// A place returned by location search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Only the search endpoint returns an id; forecast responses omit it.
    pub id: Option<i64>,
    pub name: String,
    pub region: Option<String>,
    pub country: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub url: Option<String>,
}

impl Location {
    /// Human-readable label, e.g. "Bogotá, Cundinamarca, Colombia".
    pub fn display_name(&self) -> String {
        match self.region.as_deref().filter(|r| !r.is_empty() && *r != self.name) {
            Some(region) => format!("{}, {}, {}", self.name, region, self.country),
            None => format!("{}, {}", self.name, self.country),
        }
    }
}

/// One day of a forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    /// ISO date as returned by the API (`YYYY-MM-DD`)
    pub date: String,
    pub avg_temp_c: f64,
    pub condition_text: String,
    /// Always absolute (`https://...`)
    pub condition_icon_url: String,
}

/// Multi-day forecast for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub location_name: String,
    pub days: Vec<ForecastDay>,
}
