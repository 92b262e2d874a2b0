use crate::home_assistant::{
    CurrentSensor, Device, DiscoveryMessage, ForecastSensor, Origin, SensorCatalogue,
    SensorDescriptor, SunMoonSensor, discovery_topic, entity_id, state_topic,
};
use crate::snapshot::{WeatherSnapshot, state_payload};
use async_trait::async_trait;
use log::debug;
use rumqttc::{AsyncClient, ClientError, QoS};
use serde_json::Value;
use strum::IntoEnumIterator;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("MQTT publish failed: {0}")]
    Client(#[from] ClientError),
}

/// Destination of the MQTT messages
///
/// `publish` may be called from several tasks at once.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn publish(&self, topic: String, payload: String, retain: bool)
    -> Result<(), PublishError>;
}

#[async_trait]
impl MessageSink for AsyncClient {
    async fn publish(
        &self,
        topic: String,
        payload: String,
        retain: bool,
    ) -> Result<(), PublishError> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, retain, payload).await?;
        Ok(())
    }
}

/// Declares the weather entities to Home Assistant and publishes their states
#[derive(Debug)]
pub struct HomeAssistantPublisher<S> {
    sink: S,
    catalogue: SensorCatalogue,
    discovery_prefix: String,
    device: Device,
    origin: Origin,
}

impl<S: MessageSink> HomeAssistantPublisher<S> {
    pub fn new(sink: S, catalogue: SensorCatalogue, discovery_prefix: &str) -> Self {
        HomeAssistantPublisher {
            sink,
            catalogue,
            discovery_prefix: discovery_prefix.to_string(),
            device: Device::default(),
            origin: Origin::default(),
        }
    }

    pub fn catalogue(&self) -> &SensorCatalogue {
        &self.catalogue
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Gives back the sink, for disconnection
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Sends the retained discovery message of one entity
    pub async fn publish_discovery(&self, descriptor: &SensorDescriptor) -> Result<(), PublishError> {
        let topic = discovery_topic(
            &self.discovery_prefix,
            descriptor.sensor_type,
            &descriptor.entity_id(),
        );
        let message = DiscoveryMessage::new(descriptor, &self.device, &self.origin);

        debug!("Publishing discovery for {}", descriptor.name);
        self.sink.publish(topic, message.to_string(), true).await
    }

    /// Sends the state of one entity
    pub async fn publish_state(&self, entity_id: &str, value: &Value) -> Result<(), PublishError> {
        let topic = state_topic(entity_id);
        let payload = state_payload(value);

        debug!("Publishing to topic {topic} : {payload}");
        self.sink.publish(topic, payload, false).await
    }

    async fn publish_all(&self, descriptors: &[SensorDescriptor]) -> Result<(), PublishError> {
        for descriptor in descriptors {
            self.publish_discovery(descriptor).await?;
        }
        Ok(())
    }

    pub async fn setup_current_sensors(&self) -> Result<(), PublishError> {
        self.publish_all(self.catalogue.current()).await
    }

    pub async fn setup_forecast_sensors(&self) -> Result<(), PublishError> {
        self.publish_all(self.catalogue.forecast()).await
    }

    pub async fn setup_sunmoon_sensors(&self) -> Result<(), PublishError> {
        self.publish_all(self.catalogue.sunmoon()).await
    }

    /// Declares the whole catalogue: current, forecast, then sun and moon
    pub async fn setup_sensors(&self) -> Result<(), PublishError> {
        self.setup_current_sensors().await?;
        self.setup_forecast_sensors().await?;
        self.setup_sunmoon_sensors().await
    }

    /// Publishes the current conditions that are present in the snapshot
    pub async fn publish_current_weather(
        &self,
        snapshot: &WeatherSnapshot,
    ) -> Result<(), PublishError> {
        let Some(current) = &snapshot.data_current else {
            return Ok(());
        };

        for sensor in CurrentSensor::iter() {
            if let Some(value) = sensor.value(current) {
                self.publish_state(&entity_id(sensor.name()), value).await?;
            }
        }
        Ok(())
    }

    /// Publishes the daily forecast, one state per day listed in `time`
    pub async fn publish_forecast(&self, snapshot: &WeatherSnapshot) -> Result<(), PublishError> {
        let Some(daily) = &snapshot.data_day else {
            return Ok(());
        };

        for day in 0..daily.days().len() {
            for sensor in ForecastSensor::iter() {
                if let Some(value) = sensor
                    .values(daily)
                    .and_then(|values| values.get(day))
                    .filter(|value| !value.is_null())
                {
                    self.publish_state(&entity_id(&sensor.name(day)), value)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Publishes today's sun and moon values. Later days are ignored.
    pub async fn publish_sunmoon(&self, snapshot: &WeatherSnapshot) -> Result<(), PublishError> {
        let Some(daily) = &snapshot.data_day else {
            return Ok(());
        };
        if daily.days().is_empty() {
            return Ok(());
        }

        for sensor in SunMoonSensor::iter() {
            if let Some(value) = sensor
                .values(daily)
                .and_then(|values| values.first())
                .filter(|value| !value.is_null())
            {
                self.publish_state(&entity_id(sensor.name()), value).await?;
            }
        }
        Ok(())
    }

    /// Publishes every section present in the snapshot
    pub async fn publish_snapshot(&self, snapshot: &WeatherSnapshot) -> Result<(), PublishError> {
        if snapshot.data_current.is_some() {
            self.publish_current_weather(snapshot).await?;
        }
        if snapshot.data_day.is_some() {
            self.publish_forecast(snapshot).await?;
            self.publish_sunmoon(snapshot).await?;
        }
        Ok(())
    }
}
