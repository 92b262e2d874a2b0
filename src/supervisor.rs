use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_inline_default::serde_inline_default;
use thiserror::Error;

/// Base URL of the Home Assistant supervisor API
pub const SUPERVISOR_URL: &str = "http://supervisor";

/// Environment variable holding the supervisor bearer token
pub const TOKEN_VARIABLE: &str = "SUPERVISOR_TOKEN";

/// Errors from the supervisor API
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("SUPERVISOR_TOKEN not found")]
    MissingToken,

    #[error("supervisor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("supervisor returned status {0}")]
    Status(StatusCode),
}

/// Connection settings of the MQTT broker, as provided by the supervisor
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    /// Hostname of the broker. Default: core-mosquitto
    #[serde_inline_default(String::from("core-mosquitto"))]
    pub host: String,

    /// Port of the broker. Default: 1883
    #[serde_inline_default(1883)]
    pub port: u16,

    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        BrokerSettings {
            host: String::from("core-mosquitto"),
            port: 1883,
            username: None,
            password: None,
        }
    }
}

#[derive(Deserialize)]
struct ServiceResponse {
    #[serde(default)]
    data: BrokerSettings,
}

/// Home Assistant core configuration, only the location part
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CoreConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
}

/// Client for the Home Assistant supervisor API
#[derive(Debug, Clone)]
pub struct SupervisorClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl SupervisorClient {
    /// Creates a client authenticated with `token`
    ///
    /// A missing token only fails when a request is actually made.
    pub fn new(http: Client, token: Option<String>) -> SupervisorClient {
        SupervisorClient {
            http,
            base_url: SUPERVISOR_URL.to_string(),
            token,
        }
    }

    /// Creates a client with the token read from the process environment
    pub fn from_env(http: Client) -> SupervisorClient {
        let token = std::env::var(TOKEN_VARIABLE)
            .ok()
            .filter(|token| !token.is_empty());
        Self::new(http, token)
    }

    /// Overrides the supervisor base URL
    pub fn with_base_url(mut self, base_url: &str) -> SupervisorClient {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Fetches the MQTT service settings
    pub async fn broker_settings(&self) -> Result<BrokerSettings, SupervisorError> {
        let response: ServiceResponse = self.get("/services/mqtt").await?;
        Ok(response.data)
    }

    /// Fetches the Home Assistant core configuration
    pub async fn core_config(&self) -> Result<CoreConfig, SupervisorError> {
        self.get("/core/api/config").await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SupervisorError> {
        let token = self.token.as_deref().ok_or(SupervisorError::MissingToken)?;
        let url = format!("{}{path}", self.base_url);

        debug!("Querying supervisor {url}");
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SupervisorError::Status(response.status()));
        }

        Ok(response.json().await?)
    }
}
