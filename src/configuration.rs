use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use thiserror::Error;

/// Errors raised while loading the configuration. They are all fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid JSON configuration object
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// `api_key` is missing or blank
    #[error("API key not configured")]
    MissingApiKey,

    /// A field is present but has an unusable value
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Units requested from the Meteoblue API.
///
/// The values are Meteoblue unit codes and are passed through to the query as-is.
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Units {
    /// Temperature unit, `C` or `F`. Default: C
    #[serde_inline_default(String::from("C"))]
    pub temperature: String,

    /// Wind speed unit, `ms-1`, `kmh`, `mph`, `kn` or `bft`. Default: ms-1
    #[serde_inline_default(String::from("ms-1"))]
    pub windspeed: String,

    /// Precipitation amount unit, `mm` or `inch`. Default: mm
    #[serde_inline_default(String::from("mm"))]
    pub precipitation: String,
}

impl Default for Units {
    fn default() -> Self {
        Units {
            temperature: String::from("C"),
            windspeed: String::from("ms-1"),
            precipitation: String::from("mm"),
        }
    }
}

impl Units {
    /// Unit label shown in Home Assistant for temperatures
    pub fn temperature_label(&self) -> String {
        match self.temperature.as_str() {
            "C" => "°C".to_string(),
            "F" => "°F".to_string(),
            other => other.to_string(),
        }
    }

    /// Unit label shown in Home Assistant for wind speeds
    pub fn windspeed_label(&self) -> String {
        match self.windspeed.as_str() {
            "ms-1" => "m/s".to_string(),
            "kmh" => "km/h".to_string(),
            "bft" => "Bft".to_string(),
            other => other.to_string(),
        }
    }

    /// Unit label shown in Home Assistant for precipitation amounts
    pub fn precipitation_label(&self) -> String {
        match self.precipitation.as_str() {
            "inch" => "in".to_string(),
            other => other.to_string(),
        }
    }
}

/// Contains all the configuration for `meteoblue-mqtt`
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Configuration {
    /// Meteoblue API key. Required.
    #[serde(default)]
    pub api_key: String,

    /// Latitude of the forecast location. When either coordinate is missing, the
    /// location configured in Home Assistant is used instead.
    pub latitude: Option<f64>,

    /// Longitude of the forecast location
    pub longitude: Option<f64>,

    /// Elevation in meters above sea level, sent as `asl` when known
    pub elevation: Option<f64>,

    /// Units requested from the API
    #[serde(default)]
    pub units: Units,

    /// Number of forecast days to request and to declare sensors for. Default: 7
    #[serde_inline_default(7)]
    pub forecast_days: u32,

    /// Meteoblue packages to request. Default: current, basic-1h, basic-day, sunmoon
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    /// Delay between two polls in minutes. Default: 30
    #[serde_inline_default(30)]
    pub update_interval: u64,

    /// Prefix for the discovery topics sent to Home Assistant. Default: homeassistant
    ///
    /// This must match the configuration of the MQTT integration in Home Assistant
    ///
    /// See <https://www.home-assistant.io/integrations/mqtt#discovery-options>
    #[serde_inline_default(String::from("homeassistant"))]
    pub discovery_prefix: String,

    /// Sets the verbosity of the logs.
    ///  * 1 => Error
    ///  * 2 => Warning
    ///  * 3 => Info
    ///  * 4 => Debug
    ///  * 5 => Trace
    #[serde_inline_default(3)]
    pub log_verbosity: usize,
}

fn default_packages() -> Vec<String> {
    ["current", "basic-1h", "basic-day", "sunmoon"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Configuration {
    /// Load the configuration from a file
    ///
    /// ## Example
    ///
    /// ```
    /// use meteoblue_mqtt::Configuration;
    ///
    /// let config = Configuration::load("conf/options.json").expect("Cannot load configuration");
    ///
    /// assert_eq!(config.forecast_days, 7);
    /// ```
    pub fn load(path: &str) -> Result<Configuration, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Parses and validates a configuration from its JSON text
    pub fn from_json(json: &str) -> Result<Configuration, ConfigError> {
        let config: Configuration = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.forecast_days == 0 {
            return Err(ConfigError::Invalid("forecast_days must be positive"));
        }
        if self.update_interval == 0 {
            return Err(ConfigError::Invalid("update_interval must be positive"));
        }
        if self.packages.is_empty() {
            return Err(ConfigError::Invalid("packages must not be empty"));
        }
        Ok(())
    }

    /// Configured coordinates, only when both latitude and longitude are set
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    /// Delay between two polls
    pub fn update_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.update_interval.saturating_mul(60))
    }
}
