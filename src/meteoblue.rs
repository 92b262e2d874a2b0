use crate::configuration::Configuration;
use crate::snapshot::WeatherSnapshot;
use crate::supervisor::{SupervisorClient, SupervisorError};
use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::{Client, StatusCode};
use thiserror::Error;

/// Base URL of the Meteoblue packages API
pub const METEOBLUE_URL: &str = "https://my.meteoblue.com/packages";

/// Errors raised while fetching the weather
#[derive(Debug, Error)]
pub enum WeatherError {
    /// The forecast location could not be resolved
    #[error("cannot resolve coordinates: {0}")]
    Coordinates(#[from] SupervisorError),

    /// The request could not be sent or its body could not be read
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Meteoblue answered with an error status
    #[error("API returned status {status}")]
    Api { status: StatusCode, body: String },

    /// The body is not a valid weather response
    #[error("invalid response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Anything that can provide a weather snapshot for a poll cycle
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch_weather(&self) -> Result<WeatherSnapshot, WeatherError>;
}

/// Forecast location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
}

/// Client for the Meteoblue packages API
///
/// The HTTP session is held for the lifetime of the client and released by [`MeteoblueClient::close`].
#[derive(Debug)]
pub struct MeteoblueClient {
    http: Client,
    supervisor: SupervisorClient,
    config: Configuration,
    base_url: String,
}

impl MeteoblueClient {
    /// Creates a client that shares the HTTP session `http`
    pub fn new(
        http: Client,
        supervisor: SupervisorClient,
        config: Configuration,
    ) -> MeteoblueClient {
        MeteoblueClient {
            http,
            supervisor,
            config,
            base_url: METEOBLUE_URL.to_string(),
        }
    }

    /// Overrides the packages API base URL
    pub fn with_base_url(mut self, base_url: &str) -> MeteoblueClient {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Releases the HTTP session
    pub fn close(self) {
        debug!("Closing weather client");
    }

    /// Returns the configured location, or the one of Home Assistant when
    /// latitude or longitude is not configured.
    ///
    /// A configured elevation always wins over the reported one.
    pub async fn resolve_coordinates(&self) -> Result<Coordinates, SupervisorError> {
        if let Some((latitude, longitude)) = self.config.coordinates() {
            return Ok(Coordinates {
                latitude,
                longitude,
                elevation: self.config.elevation,
            });
        }

        debug!("No location configured, asking Home Assistant");
        let core = self.supervisor.core_config().await?;

        Ok(Coordinates {
            latitude: core.latitude.unwrap_or(0.0),
            longitude: core.longitude.unwrap_or(0.0),
            elevation: self.config.elevation.or(core.elevation),
        })
    }

    /// Builds the request URL. Parameters are always in the same order.
    ///
    /// ## Example
    ///
    /// ```
    /// use meteoblue_mqtt::{Configuration, MeteoblueClient, SupervisorClient};
    ///
    /// let config = Configuration::from_json(r#"{"api_key": "secret"}"#).expect("Invalid configuration");
    /// let http = reqwest::Client::new();
    /// let client = MeteoblueClient::new(http.clone(), SupervisorClient::new(http, None), config);
    ///
    /// let url = client.build_request_url(&["current".to_string()], 47.1, 8.3, None);
    /// assert!(url.starts_with("https://my.meteoblue.com/packages/current?lat=47.1&lon=8.3&apikey=secret"));
    /// ```
    pub fn build_request_url(
        &self,
        packages: &[String],
        latitude: f64,
        longitude: f64,
        elevation: Option<f64>,
    ) -> String {
        let units = &self.config.units;
        let mut url = format!(
            "{}/{}?lat={latitude}&lon={longitude}&apikey={}&format=json&temperature={}&windspeed={}&precipitationamount={}&forecast_days={}&tz=UTC",
            self.base_url,
            packages.join("_"),
            self.config.api_key,
            units.temperature,
            units.windspeed,
            units.precipitation,
            self.config.forecast_days,
        );

        if let Some(elevation) = elevation {
            url.push_str(&format!("&asl={elevation}"));
        }

        url
    }

    async fn fetch(&self) -> Result<WeatherSnapshot, WeatherError> {
        let coordinates = self.resolve_coordinates().await?;
        let url = self.build_request_url(
            &self.config.packages,
            coordinates.latitude,
            coordinates.longitude,
            coordinates.elevation,
        );

        info!(
            "Fetching weather for coordinates: {}, {}",
            coordinates.latitude, coordinates.longitude
        );

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("API error {status}: {body}");
            return Err(WeatherError::Api { status, body });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl WeatherSource for MeteoblueClient {
    async fn fetch_weather(&self) -> Result<WeatherSnapshot, WeatherError> {
        self.fetch()
            .await
            .inspect_err(|e| error!("Error fetching weather: {e}"))
    }
}
