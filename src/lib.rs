//! # meteoblue-mqtt
//!
//! `meteoblue-mqtt` polls the Meteoblue weather API and publishes the results as sensors
//! to the MQTT integration of Home Assistant
//!

pub use self::configuration::Configuration;
pub use self::configuration::Units;
pub use self::daemon::Daemon;
pub use self::home_assistant::SensorCatalogue;
pub use self::home_assistant::SensorDescriptor;
pub use self::meteoblue::MeteoblueClient;
pub use self::meteoblue::WeatherSource;
pub use self::publisher::HomeAssistantPublisher;
pub use self::publisher::MessageSink;
pub use self::snapshot::WeatherSnapshot;
pub use self::supervisor::BrokerSettings;
pub use self::supervisor::SupervisorClient;

/// Contains the configuration stuff
pub mod configuration;
/// Contains the daemon code
pub mod daemon;
/// Contains Home Assistant discovery data
pub mod home_assistant;
/// Contains the Meteoblue API client
pub mod meteoblue;
/// Contains the MQTT publisher
pub mod publisher;
/// Contains the weather data received from Meteoblue
pub mod snapshot;
/// Contains the Home Assistant supervisor API client
pub mod supervisor;
