//! WeatherAPI.com wire types and their mapping into domain values.

use serde::{Deserialize, Serialize};

use crate::types::{Forecast, ForecastDay, Location};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    pub country: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDto {
    pub text: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayDto {
    #[serde(rename = "avgtemp_c")]
    pub avg_temp_c: f64,
    pub condition: ConditionDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDayDto {
    pub date: String,
    pub day: DayDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDto {
    #[serde(rename = "forecastday")]
    pub forecast_day: Vec<ForecastDayDto>,
}

/// Body of `GET /forecast.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponseDto {
    pub location: LocationDto,
    pub forecast: ForecastDto,
}

/// Body of a non-2xx WeatherAPI response.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    #[allow(dead_code)]
    pub code: Option<i64>,
    pub message: Option<String>,
}

/// WeatherAPI serves icons as protocol-relative URLs (`//cdn.weatherapi.com/...`).
pub fn normalize_icon_url(icon: &str) -> String {
    match icon.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => icon.to_string(),
    }
}

impl From<LocationDto> for Location {
    fn from(dto: LocationDto) -> Self {
        Location {
            id: dto.id,
            name: dto.name,
            region: dto.region,
            country: dto.country,
            lat: dto.lat,
            lon: dto.lon,
            url: dto.url,
        }
    }
}

impl From<&ForecastDayDto> for ForecastDay {
    fn from(dto: &ForecastDayDto) -> Self {
        ForecastDay {
            date: dto.date.clone(),
            avg_temp_c: dto.day.avg_temp_c,
            condition_text: dto.day.condition.text.clone(),
            condition_icon_url: normalize_icon_url(&dto.day.condition.icon),
        }
    }
}

impl From<&ForecastResponseDto> for Forecast {
    fn from(dto: &ForecastResponseDto) -> Self {
        Forecast {
            location_name: dto.location.name.clone(),
            days: dto.forecast.forecast_day.iter().map(ForecastDay::from).collect(),
        }
    }
}
