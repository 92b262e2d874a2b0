use crate::configuration::Units;
use crate::snapshot::{CurrentConditions, DailyData};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// Node id used in the discovery topics, and prefix of the state topics
pub const NODE_ID: &str = "meteoblue";

/// Builds the entity id from a sensor name
///
/// ```
/// use meteoblue_mqtt::home_assistant::entity_id;
///
/// assert_eq!(entity_id("Forecast Day 2 Temp Max"), "forecast_day_2_temp_max");
/// ```
pub fn entity_id(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Topic where the discovery message of an entity is sent
pub fn discovery_topic(prefix: &str, sensor_type: &str, entity_id: &str) -> String {
    format!("{prefix}/{sensor_type}/{NODE_ID}/{entity_id}/config")
}

/// Topic where the state of an entity is sent
pub fn state_topic(entity_id: &str) -> String {
    format!("{NODE_ID}/{entity_id}/state")
}

/// Describes one entity declared to Home Assistant
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescriptor {
    /// Type of platform. Always `sensor`
    pub sensor_type: &'static str,

    /// Name of the entity, shown in Home Assistant and converted into the entity id
    pub name: String,

    /// Unit of the reported values
    pub unit: Option<String>,

    /// Device class helps Home Assistant to know how to interpret the reported values.
    ///
    /// See <https://www.home-assistant.io/integrations/sensor#device-class> for possible values here
    pub device_class: Option<&'static str>,

    /// Describes how Home Assistant stores the data
    pub state_class: Option<&'static str>,

    pub icon: Option<&'static str>,
}

impl SensorDescriptor {
    fn sensor(
        name: impl Into<String>,
        unit: Option<String>,
        device_class: Option<&'static str>,
        state_class: Option<&'static str>,
        icon: &'static str,
    ) -> SensorDescriptor {
        SensorDescriptor {
            sensor_type: "sensor",
            name: name.into(),
            unit,
            device_class,
            state_class,
            icon: Some(icon),
        }
    }

    /// Entity id derived from the name
    pub fn entity_id(&self) -> String {
        entity_id(&self.name)
    }
}

/// Sensors for the current conditions
#[derive(Debug, PartialEq, Clone, Copy, EnumIter)]
pub enum CurrentSensor {
    Temperature,
    WindSpeed,
    WindDirection,
    Humidity,
    Pictocode,
    IsDaylight,
}

impl CurrentSensor {
    /// Name of the entity
    pub fn name(&self) -> &'static str {
        match self {
            CurrentSensor::Temperature => "Temperature",
            CurrentSensor::WindSpeed => "Wind Speed",
            CurrentSensor::WindDirection => "Wind Direction",
            CurrentSensor::Humidity => "Humidity",
            CurrentSensor::Pictocode => "Pictocode",
            CurrentSensor::IsDaylight => "Is Daylight",
        }
    }

    pub fn descriptor(&self, units: &Units) -> SensorDescriptor {
        let name = self.name();
        match self {
            CurrentSensor::Temperature => SensorDescriptor::sensor(
                name,
                Some(units.temperature_label()),
                Some("temperature"),
                Some("measurement"),
                "mdi:thermometer",
            ),
            CurrentSensor::WindSpeed => SensorDescriptor::sensor(
                name,
                Some(units.windspeed_label()),
                None,
                Some("measurement"),
                "mdi:weather-windy",
            ),
            CurrentSensor::WindDirection => SensorDescriptor::sensor(
                name,
                Some("°".to_string()),
                None,
                Some("measurement"),
                "mdi:compass",
            ),
            CurrentSensor::Humidity => SensorDescriptor::sensor(
                name,
                Some("%".to_string()),
                Some("humidity"),
                Some("measurement"),
                "mdi:water-percent",
            ),
            CurrentSensor::Pictocode => {
                SensorDescriptor::sensor(name, None, None, None, "mdi:weather-partly-cloudy")
            }
            CurrentSensor::IsDaylight => {
                SensorDescriptor::sensor(name, None, None, None, "mdi:weather-sunny")
            }
        }
    }

    /// Value of this sensor in the current conditions, if present
    pub fn value<'a>(&self, current: &'a CurrentConditions) -> Option<&'a Value> {
        match self {
            CurrentSensor::Temperature => current.temperature.as_ref(),
            CurrentSensor::WindSpeed => current.windspeed.as_ref(),
            CurrentSensor::WindDirection => current.winddirection.as_ref(),
            CurrentSensor::Humidity => current.relativehumidity.as_ref(),
            CurrentSensor::Pictocode => current.pictocode.as_ref(),
            CurrentSensor::IsDaylight => current.isdaylight.as_ref(),
        }
    }
}

/// Sensors declared for every forecast day
#[derive(Debug, PartialEq, Clone, Copy, EnumIter)]
pub enum ForecastSensor {
    TempMax,
    TempMin,
    Precipitation,
    Pictocode,
}

impl ForecastSensor {
    /// Name of the entity for the given day offset
    pub fn name(&self, day: usize) -> String {
        let suffix = match self {
            ForecastSensor::TempMax => "Temp Max",
            ForecastSensor::TempMin => "Temp Min",
            ForecastSensor::Precipitation => "Precipitation",
            ForecastSensor::Pictocode => "Pictocode",
        };
        format!("Forecast Day {day} {suffix}")
    }

    pub fn descriptor(&self, day: usize, units: &Units) -> SensorDescriptor {
        let name = self.name(day);
        match self {
            ForecastSensor::TempMax => SensorDescriptor::sensor(
                name,
                Some(units.temperature_label()),
                Some("temperature"),
                None,
                "mdi:thermometer-high",
            ),
            ForecastSensor::TempMin => SensorDescriptor::sensor(
                name,
                Some(units.temperature_label()),
                Some("temperature"),
                None,
                "mdi:thermometer-low",
            ),
            ForecastSensor::Precipitation => SensorDescriptor::sensor(
                name,
                Some(units.precipitation_label()),
                None,
                None,
                "mdi:weather-rainy",
            ),
            ForecastSensor::Pictocode => {
                SensorDescriptor::sensor(name, None, None, None, "mdi:weather-partly-cloudy")
            }
        }
    }

    /// Daily values of this sensor, if present
    pub fn values<'a>(&self, day: &'a DailyData) -> Option<&'a [Value]> {
        match self {
            ForecastSensor::TempMax => day.temperature_max.as_deref(),
            ForecastSensor::TempMin => day.temperature_min.as_deref(),
            ForecastSensor::Precipitation => day.precipitation.as_deref(),
            ForecastSensor::Pictocode => day.pictocode.as_deref(),
        }
    }
}

/// Sun and moon sensors, only reported for today
#[derive(Debug, PartialEq, Clone, Copy, EnumIter)]
pub enum SunMoonSensor {
    Sunrise,
    Sunset,
    Moonrise,
    Moonset,
    MoonPhase,
}

impl SunMoonSensor {
    pub fn name(&self) -> &'static str {
        match self {
            SunMoonSensor::Sunrise => "Sunrise",
            SunMoonSensor::Sunset => "Sunset",
            SunMoonSensor::Moonrise => "Moonrise",
            SunMoonSensor::Moonset => "Moonset",
            SunMoonSensor::MoonPhase => "Moon Phase",
        }
    }

    pub fn descriptor(&self) -> SensorDescriptor {
        let (device_class, icon) = match self {
            SunMoonSensor::Sunrise => (Some("timestamp"), "mdi:weather-sunset-up"),
            SunMoonSensor::Sunset => (Some("timestamp"), "mdi:weather-sunset-down"),
            SunMoonSensor::Moonrise => (Some("timestamp"), "mdi:moon-waxing-crescent"),
            SunMoonSensor::Moonset => (Some("timestamp"), "mdi:moon-waning-crescent"),
            SunMoonSensor::MoonPhase => (None, "mdi:moon-full"),
        };
        SensorDescriptor::sensor(self.name(), None, device_class, None, icon)
    }

    /// Daily values of this sensor, if present
    pub fn values<'a>(&self, day: &'a DailyData) -> Option<&'a [Value]> {
        match self {
            SunMoonSensor::Sunrise => day.sunrise.as_deref(),
            SunMoonSensor::Sunset => day.sunset.as_deref(),
            SunMoonSensor::Moonrise => day.moonrise.as_deref(),
            SunMoonSensor::Moonset => day.moonset.as_deref(),
            SunMoonSensor::MoonPhase => day.moonphasename.as_deref(),
        }
    }
}

/// Every entity declared at startup, in declaration order
#[derive(Debug, Clone)]
pub struct SensorCatalogue {
    current: Vec<SensorDescriptor>,
    forecast: Vec<SensorDescriptor>,
    sunmoon: Vec<SensorDescriptor>,
}

impl SensorCatalogue {
    /// Builds the catalogue for `forecast_days` days
    ///
    /// ```
    /// use meteoblue_mqtt::{SensorCatalogue, Units};
    ///
    /// let catalogue = SensorCatalogue::new(7, &Units::default());
    /// assert_eq!(catalogue.len(), 6 + 5 + 4 * 7);
    /// ```
    pub fn new(forecast_days: u32, units: &Units) -> SensorCatalogue {
        let forecast = (0..forecast_days as usize)
            .flat_map(move |day| ForecastSensor::iter().map(move |sensor| sensor.descriptor(day, units)))
            .collect();

        SensorCatalogue {
            current: CurrentSensor::iter()
                .map(|sensor| sensor.descriptor(units))
                .collect(),
            forecast,
            sunmoon: SunMoonSensor::iter()
                .map(|sensor| sensor.descriptor())
                .collect(),
        }
    }

    pub fn current(&self) -> &[SensorDescriptor] {
        &self.current
    }

    pub fn forecast(&self) -> &[SensorDescriptor] {
        &self.forecast
    }

    pub fn sunmoon(&self) -> &[SensorDescriptor] {
        &self.sunmoon
    }

    /// All the descriptors: current, then forecast, then sun and moon
    pub fn iter(&self) -> impl Iterator<Item = &SensorDescriptor> {
        self.current
            .iter()
            .chain(self.forecast.iter())
            .chain(self.sunmoon.iter())
    }

    pub fn len(&self) -> usize {
        self.current.len() + self.forecast.len() + self.sunmoon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Device sent to Home Assistant. All the entities belong to it.
#[derive(Serialize, Debug, Clone)]
pub struct Device {
    identifiers: [&'static str; 1],
    name: &'static str,
    model: &'static str,
    manufacturer: &'static str,
}

impl Default for Device {
    fn default() -> Self {
        Device {
            identifiers: ["meteoblue_weather"],
            name: "Meteoblue Weather",
            model: "Weather Station",
            manufacturer: "Meteoblue",
        }
    }
}

/// Describes the origin of the messages, in this case `meteoblue-mqtt`
#[derive(Serialize, Debug, Clone)]
pub struct Origin {
    /// Name of the origin, always `meteoblue-mqtt`
    name: &'static str,

    /// Version of `meteoblue-mqtt`
    sw_version: &'static str,

    /// URL of `meteoblue-mqtt`
    url: &'static str,
}

impl Default for Origin {
    fn default() -> Self {
        Origin {
            name: env!("CARGO_PKG_NAME"),
            sw_version: env!("CARGO_PKG_VERSION"),
            url: env!("CARGO_PKG_HOMEPAGE"),
        }
    }
}

/// Discovery message sent to Home Assistant for one entity
#[derive(Serialize, Debug)]
pub struct DiscoveryMessage<'a> {
    name: &'a str,

    /// Unique ID for the entity, `meteoblue_` followed by the entity id
    unique_id: String,

    /// Topic where the states of the entity are sent
    state_topic: String,

    device: &'a Device,

    origin: &'a Origin,

    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'static str>,
}

impl<'a> DiscoveryMessage<'a> {
    pub fn new(
        descriptor: &'a SensorDescriptor,
        device: &'a Device,
        origin: &'a Origin,
    ) -> DiscoveryMessage<'a> {
        let entity = descriptor.entity_id();
        DiscoveryMessage {
            name: &descriptor.name,
            unique_id: format!("{NODE_ID}_{entity}"),
            state_topic: state_topic(&entity),
            device,
            origin,
            unit_of_measurement: descriptor.unit.as_deref(),
            device_class: descriptor.device_class,
            state_class: descriptor.state_class,
            icon: descriptor.icon,
        }
    }
}

impl fmt::Display for DiscoveryMessage<'_> {
    /// Formats the message in JSON format
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Ok(message) = serde_json::to_string(&self) else {
            return Err(fmt::Error);
        };
        write!(f, "{message}")
    }
}
