use serde::Deserialize;
use serde_json::Value;

/// Response of the Meteoblue API for one poll
///
/// Both sections are optional since they depend on the requested packages.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct WeatherSnapshot {
    /// Current conditions, from the `current` package
    pub data_current: Option<CurrentConditions>,

    /// Daily values, from the `basic-day` and `sunmoon` packages
    pub data_day: Option<DailyData>,
}

/// Current conditions. Every field is optional and kept as raw JSON.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct CurrentConditions {
    pub temperature: Option<Value>,
    pub windspeed: Option<Value>,
    pub winddirection: Option<Value>,
    pub relativehumidity: Option<Value>,
    pub pictocode: Option<Value>,
    pub isdaylight: Option<Value>,
}

/// Daily values, as parallel arrays indexed by day offset
#[derive(Deserialize, Debug, Default, Clone)]
pub struct DailyData {
    pub time: Option<Vec<Value>>,
    pub temperature_max: Option<Vec<Value>>,
    pub temperature_min: Option<Vec<Value>>,
    pub precipitation: Option<Vec<Value>>,
    pub pictocode: Option<Vec<Value>>,
    pub sunrise: Option<Vec<Value>>,
    pub sunset: Option<Vec<Value>>,
    pub moonrise: Option<Vec<Value>>,
    pub moonset: Option<Vec<Value>>,
    pub moonphasename: Option<Vec<Value>>,
}

impl DailyData {
    /// Days listed in `time`, empty when the field is missing or null
    pub fn days(&self) -> &[Value] {
        self.time.as_deref().unwrap_or_default()
    }
}

/// Formats a value as an MQTT state payload
///
/// Strings are sent verbatim, everything else in its JSON form.
pub fn state_payload(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
