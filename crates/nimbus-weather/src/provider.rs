//! Remote weather source backed by WeatherAPI.com.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nimbus_core::ApiConfig;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::dto::{ApiErrorBody, ForecastResponseDto, LocationDto};
use crate::error::WeatherError;

const USER_AGENT: &str = "Nimbus/0.1.0";

/// One request per domain operation; any failure is returned as-is and
/// classified by the caller.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn search_locations(&self, query: &str) -> Result<Vec<LocationDto>, WeatherError>;

    async fn get_forecast(
        &self,
        location_name: &str,
        days: u8,
    ) -> Result<ForecastResponseDto, WeatherError>;
}

#[derive(Debug, Clone)]
pub struct WeatherApiClient {
    client: Arc<Client>,
    base_url: Url,
    api_key: String,
}

impl WeatherApiClient {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        // Keep the trailing slash so joins append instead of replacing the last segment.
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)
            .map_err(|e| anyhow::anyhow!("Invalid weather API base URL '{}': {}", base_url, e))?;

        Ok(Self {
            client: Arc::new(client),
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, WeatherError> {
        Self::new(
            &config.base_url,
            config.resolved_api_key().unwrap_or_default(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, WeatherError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| anyhow::anyhow!("Invalid endpoint '{}': {}", path, e))?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .extend_pairs(params);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, WeatherError> {
        let path = url.path().to_string();
        let response = self.client.get(url).send().await?;
        let response = check_status(response).await?;
        let body = response.bytes().await?;
        let parsed = serde_json::from_slice(&body)?;
        tracing::debug!("GET {} -> {} bytes", path, body.len());
        Ok(parsed)
    }
}

/// Turns a non-2xx response into `WeatherError::Status`, keeping the API's own message.
async fn check_status(response: Response) -> Result<Response, WeatherError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .ok()
        .and_then(|body| serde_json::from_str::<ApiErrorBody>(&body).ok())
        .and_then(|body| body.error.message);

    tracing::debug!("Weather API returned status {}", status);
    Err(WeatherError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl WeatherApi for WeatherApiClient {
    async fn search_locations(&self, query: &str) -> Result<Vec<LocationDto>, WeatherError> {
        let url = self.endpoint("search.json", &[("q", query)])?;
        self.get_json(url).await
    }

    async fn get_forecast(
        &self,
        location_name: &str,
        days: u8,
    ) -> Result<ForecastResponseDto, WeatherError> {
        let days = days.to_string();
        let url = self.endpoint("forecast.json", &[("q", location_name), ("days", &days)])?;
        self.get_json(url).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use nimbus_core::ErrorKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WeatherApiClient {
        WeatherApiClient::new(&format!("{}/v1", server.uri()), "test-key", Duration::from_secs(5))
            .unwrap()
    }

    fn forecast_body() -> serde_json::Value {
        serde_json::json!({
            "location": {"name": "Bogota", "region": "Cundinamarca", "country": "Colombia", "lat": 4.6, "lon": -74.08},
            "forecast": {"forecastday": [
                {"date": "2026-10-19", "day": {"avgtemp_c": 14.2, "condition": {"text": "Sunny", "icon": "//cdn.weatherapi.com/113.png"}}}
            ]}
        })
    }

    #[tokio::test]
    async fn test_search_locations_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search.json"))
            .and(query_param("key", "test-key"))
            .and(query_param("q", "Bogotá"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "name": "Bogota", "region": "Cundinamarca", "country": "Colombia",
                 "lat": 4.6, "lon": -74.08, "url": "bogota-cundinamarca-colombia"}
            ])))
            .mount(&server)
            .await;

        let results = client(&server).search_locations("Bogotá").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Bogota");
        assert_eq!(results[0].id, Some(1));
    }

    #[tokio::test]
    async fn test_search_locations_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        assert!(client(&server).search_locations("zz").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_forecast_sends_days() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast.json"))
            .and(query_param("q", "Bogota"))
            .and(query_param("days", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .mount(&server)
            .await;

        let response = client(&server).get_forecast("Bogota", 3).await.unwrap();

        assert_eq!(response.location.name, "Bogota");
        assert_eq!(response.forecast.forecast_day.len(), 1);
    }

    #[tokio::test]
    async fn test_error_body_message_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast.json"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": 1006, "message": "No matching location found."}
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_forecast("xyz123", 3).await.unwrap_err();

        assert_eq!(
            err.classify(),
            ErrorKind::Http {
                code: 400,
                message: "No matching location found.".into()
            }
        );
    }

    #[tokio::test]
    async fn test_error_without_body_uses_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).search_locations("bog").await.unwrap_err();

        assert_eq!(
            err.classify(),
            ErrorKind::Http {
                code: 503,
                message: "Service Unavailable".into()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"location\":"))
            .mount(&server)
            .await;

        let err = client(&server).get_forecast("Bogota", 3).await.unwrap_err();

        assert!(matches!(err.classify(), ErrorKind::Parse { .. }));
    }

    #[tokio::test]
    async fn test_slow_server_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = WeatherApiClient::new(&server.uri(), "k", Duration::from_millis(50)).unwrap();
        let err = client.search_locations("bog").await.unwrap_err();

        assert_eq!(err.classify(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_refused_connection_is_no_connection() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let client =
            WeatherApiClient::new(&format!("http://{addr}/v1"), "k", Duration::from_secs(2)).unwrap();

        let err = client.search_locations("bog").await.unwrap_err();

        assert_eq!(err.classify(), ErrorKind::NoConnection);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(WeatherApiClient::new("not a url", "k", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_from_config() {
        let config = ApiConfig {
            base_url: "https://api.weatherapi.com/v1/".to_string(),
            api_key: Some("abc".to_string()),
            timeout_secs: 10,
        };
        let client = WeatherApiClient::from_config(&config).unwrap();
        let url = client.endpoint("search.json", &[("q", "bog")]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.weatherapi.com/v1/search.json?key=abc&q=bog"
        );
    }
}
