use crate::configuration::Configuration;
use crate::home_assistant::SensorCatalogue;
use crate::meteoblue::{MeteoblueClient, WeatherError, WeatherSource};
use crate::publisher::{HomeAssistantPublisher, MessageSink, PublishError};
use crate::supervisor::{BrokerSettings, SupervisorClient};
use log::{debug, error, info, trace, warn};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet};
use std::error::Error;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::signal::unix::SignalKind;
use tokio::task::{self, JoinHandle};
use tokio::time::sleep;

/// MQTT client id of the daemon
pub const CLIENT_ID: &str = "meteoblue-weather";

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Failure of a single poll cycle. The loop logs it and carries on.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Daemon that periodically fetches the weather and sends it to MQTT
#[derive(Debug)]
pub struct Daemon<W, S> {
    weather: W,
    publisher: HomeAssistantPublisher<S>,
    update_period: Duration,
}

impl<W: WeatherSource, S: MessageSink> Daemon<W, S> {
    /// Constructs a daemon from the configuration, a weather source and an MQTT sink
    pub fn new(config: &Configuration, weather: W, sink: S) -> Daemon<W, S> {
        let catalogue = SensorCatalogue::new(config.forecast_days, &config.units);
        debug!("Sensor catalogue has {} entities", catalogue.len());

        Daemon {
            weather,
            publisher: HomeAssistantPublisher::new(sink, catalogue, &config.discovery_prefix),
            update_period: config.update_period(),
        }
    }

    pub fn publisher(&self) -> &HomeAssistantPublisher<S> {
        &self.publisher
    }

    /// Declares every sensor to Home Assistant. Must run before the poll loop.
    pub async fn setup_sensors(&self) -> Result<(), PublishError> {
        self.publisher.setup_sensors().await?;
        info!("Sensors configured");
        Ok(())
    }

    /// Single iteration of the poll loop
    pub async fn run_cycle(&self) -> Result<(), CycleError> {
        info!("Fetching weather data...");
        let snapshot = self.weather.fetch_weather().await?;

        self.publisher.publish_snapshot(&snapshot).await?;
        info!("Weather data updated successfully");

        Ok(())
    }

    /// Runs poll cycles until `shutdown` completes
    ///
    /// A failed cycle is logged and the full update period is still waited before the next one.
    pub async fn poll_loop<F: Future<Output = ()>>(&self, shutdown: F) {
        tokio::pin!(shutdown);

        loop {
            let cycle = async {
                if let Err(e) = self.run_cycle().await {
                    error!("Error updating weather: {e}");
                }
                sleep(self.update_period).await;
            };

            tokio::select! {
                _ = cycle => {},
                _ = &mut shutdown => {
                    info!("Shutting down...");
                    break;
                }
            }
        }
    }

    /// Splits the daemon back into its weather source and MQTT sink
    pub fn into_parts(self) -> (W, S) {
        (self.weather, self.publisher.into_sink())
    }
}

/// MQTT options for the broker described by `settings`
pub fn mqtt_options(settings: &BrokerSettings) -> MqttOptions {
    let mut options = MqttOptions::new(CLIENT_ID, &settings.host, settings.port);
    options.set_keep_alive(KEEP_ALIVE);
    if let Some(username) = &settings.username {
        options.set_credentials(username, settings.password.as_deref().unwrap_or_default());
    }
    options
}

/// Connects to the broker and waits for its acknowledgement
///
/// The event loop is then polled on a background task until it is aborted.
pub async fn connect(
    options: MqttOptions,
) -> Result<(AsyncClient, JoinHandle<()>), ConnectionError> {
    let (client, mut event_loop) = AsyncClient::new(options, 10);

    loop {
        match event_loop.poll().await? {
            Event::Incoming(Packet::ConnAck(_)) => break,
            notification => trace!("MQTT notification received: {notification:?}"),
        }
    }

    Ok((client, task::spawn(drive_event_loop(event_loop))))
}

async fn drive_event_loop(mut event_loop: EventLoop) {
    loop {
        match event_loop.poll().await {
            Ok(notification) => trace!("MQTT notification received: {notification:?}"),
            Err(e) => {
                // The next poll reconnects
                warn!("MQTT connection error: {e}");
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Starts the daemon and runs it until Ctrl-C or SIGTERM
///
/// Every error returned here happens during startup and has already been logged.
pub async fn run(config: Configuration) -> Result<(), Box<dyn Error>> {
    info!("Starting Meteoblue Weather Add-on");

    let http = reqwest::Client::new();
    let supervisor = SupervisorClient::from_env(http.clone());

    let settings = supervisor
        .broker_settings()
        .await
        .inspect_err(|e| error!("Failed to get MQTT configuration: {e}"))?;
    info!(
        "Got MQTT config: host={}, port={}",
        settings.host, settings.port
    );

    let (client, event_task) = connect(mqtt_options(&settings))
        .await
        .inspect_err(|e| error!("Failed to connect to MQTT: {e}"))?;
    info!("Connected to MQTT broker");

    let mut terminal_signal = tokio::signal::unix::signal(SignalKind::terminate())
        .inspect_err(|e| error!("Failed to listen for SIGTERM: {e}"))?;
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => debug!("Ctrl-C received"),
            _ = terminal_signal.recv() => debug!("Interrupt received"),
        }
    };

    let weather = MeteoblueClient::new(http, supervisor, config.clone());
    let daemon = Daemon::new(&config, weather, client);

    daemon
        .setup_sensors()
        .await
        .inspect_err(|e| error!("Failed to declare sensors: {e}"))?;

    daemon.poll_loop(shutdown).await;

    let (weather, client) = daemon.into_parts();
    weather.close();
    client.disconnect().await.unwrap_or_else(|e| {
        warn!("MQTT disconnection failed: {e}");
    });

    // Lets the event loop send the pending packets
    sleep(Duration::from_secs(1)).await;
    event_task.abort();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mqtt_options() {
        let settings = BrokerSettings::default();
        let options = mqtt_options(&settings);

        assert_eq!(
            options.broker_address(),
            ("core-mosquitto".to_string(), 1883)
        );
        assert_eq!(options.client_id(), CLIENT_ID);
        assert_eq!(options.keep_alive(), KEEP_ALIVE);
        assert_eq!(options.credentials(), None);

        let settings = BrokerSettings {
            username: Some("addons".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        assert_eq!(
            mqtt_options(&settings).credentials(),
            Some(("addons".to_string(), "secret".to_string()))
        );
    }
}
