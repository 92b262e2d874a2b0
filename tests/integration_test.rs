use async_trait::async_trait;
use meteoblue_mqtt::daemon::CycleError;
use meteoblue_mqtt::meteoblue::{Coordinates, WeatherError};
use meteoblue_mqtt::publisher::PublishError;
use meteoblue_mqtt::supervisor::SupervisorError;
use meteoblue_mqtt::{
    Configuration, Daemon, MessageSink, MeteoblueClient, SupervisorClient, WeatherSnapshot,
    WeatherSource,
};
use reqwest::StatusCode;
use rumqttc::{AsyncClient, MqttOptions};
use serde_json::{Value, json};
use std::error::Error;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "supervisor-token";

/// Records every published message
#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<(String, String, bool)>>,
}

#[async_trait]
impl MessageSink for Recorder {
    async fn publish(
        &self,
        topic: String,
        payload: String,
        retain: bool,
    ) -> Result<(), PublishError> {
        self.messages
            .lock()
            .expect("poisoned")
            .push((topic, payload, retain));
        Ok(())
    }
}

impl Recorder {
    fn topics(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("poisoned")
            .iter()
            .map(|(topic, _, _)| topic.clone())
            .collect()
    }
}

fn configuration(value: Value) -> Configuration {
    Configuration::from_json(&value.to_string()).expect("Invalid test configuration")
}

fn weather_client(server: &MockServer, config: Configuration) -> MeteoblueClient {
    let http = reqwest::Client::new();
    let supervisor =
        SupervisorClient::new(http.clone(), Some(TOKEN.to_string())).with_base_url(&server.uri());

    MeteoblueClient::new(http, supervisor, config)
        .with_base_url(&format!("{}/packages", server.uri()))
}

fn sample_response() -> Value {
    json!({
        "metadata": {"latitude": 47.1, "longitude": 8.3, "height": 440},
        "data_current": {
            "time": "2024-06-01 12:00",
            "temperature": 18.4,
            "windspeed": 2.3,
            "winddirection": 250,
            "relativehumidity": 64,
            "pictocode": 3,
            "isdaylight": 1
        },
        "data_day": {
            "time": ["2024-06-01", "2024-06-02", "2024-06-03"],
            "temperature_max": [21.0, 23.5, 19.2],
            "temperature_min": [9.1, 11.0, 10.4],
            "precipitation": [0.0, 1.5, 6.2],
            "pictocode": [2, 4, 16],
            "sunrise": ["05:31", "05:30", "05:30"],
            "sunset": ["21:17", "21:18", "21:19"],
            "moonrise": ["02:12", "02:40", "---"],
            "moonset": ["16:02", "17:20", "18:39"],
            "moonphasename": ["waning crescent", "waning crescent", "new moon"]
        }
    })
}

#[tokio::test]
async fn test_broker_settings() -> Result<(), Box<dyn Error>> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services/mqtt"))
        .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok",
            "data": {"host": "mosquitto", "port": 1884, "username": "addons", "password": "pw"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let supervisor = SupervisorClient::new(reqwest::Client::new(), Some(TOKEN.to_string()))
        .with_base_url(&server.uri());
    let settings = supervisor.broker_settings().await?;

    assert_eq!(settings.host, "mosquitto");
    assert_eq!(settings.port, 1884);
    assert_eq!(settings.username.as_deref(), Some("addons"));
    assert_eq!(settings.password.as_deref(), Some("pw"));

    Ok(())
}

#[tokio::test]
async fn test_broker_settings_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services/mqtt"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let supervisor = SupervisorClient::new(reqwest::Client::new(), Some(TOKEN.to_string()))
        .with_base_url(&server.uri());

    assert!(matches!(
        supervisor.broker_settings().await,
        Err(SupervisorError::Status(StatusCode::UNAUTHORIZED))
    ));
}

#[tokio::test]
async fn test_coordinates_from_home_assistant() -> Result<(), Box<dyn Error>> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/core/api/config"))
        .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "latitude": 46.9,
            "longitude": 7.4,
            "elevation": 540
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = weather_client(&server, configuration(json!({"api_key": "key"})));

    assert_eq!(
        client.resolve_coordinates().await?,
        Coordinates {
            latitude: 46.9,
            longitude: 7.4,
            elevation: Some(540.0)
        }
    );

    Ok(())
}

#[tokio::test]
async fn test_configured_elevation_wins() -> Result<(), Box<dyn Error>> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/core/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"elevation": 540})))
        .expect(1)
        .mount(&server)
        .await;

    let client = weather_client(
        &server,
        configuration(json!({"api_key": "key", "longitude": 7.4, "elevation": 600})),
    );

    // The host omits the location, which defaults to 0/0
    assert_eq!(
        client.resolve_coordinates().await?,
        Coordinates {
            latitude: 0.0,
            longitude: 0.0,
            elevation: Some(600.0)
        }
    );

    Ok(())
}

#[tokio::test]
async fn test_configured_coordinates_skip_home_assistant() -> Result<(), Box<dyn Error>> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/core/api/config"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = weather_client(
        &server,
        configuration(json!({"api_key": "key", "latitude": 47.1, "longitude": 8.3})),
    );

    for _ in 0..3 {
        assert_eq!(
            client.resolve_coordinates().await?,
            Coordinates {
                latitude: 47.1,
                longitude: 8.3,
                elevation: None
            }
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_coordinates_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/core/api/config"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = weather_client(&server, configuration(json!({"api_key": "key"})));

    assert!(matches!(
        client.fetch_weather().await,
        Err(WeatherError::Coordinates(SupervisorError::Status(
            StatusCode::INTERNAL_SERVER_ERROR
        )))
    ));
}

#[tokio::test]
async fn test_fetch_weather() -> Result<(), Box<dyn Error>> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/packages/current_basic-day_sunmoon"))
        .and(query_param("lat", "47.1"))
        .and(query_param("lon", "8.3"))
        .and(query_param("apikey", "key"))
        .and(query_param("format", "json"))
        .and(query_param("temperature", "C"))
        .and(query_param("windspeed", "ms-1"))
        .and(query_param("precipitationamount", "mm"))
        .and(query_param("forecast_days", "3"))
        .and(query_param("tz", "UTC"))
        .and(query_param("asl", "440"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
        .expect(1)
        .mount(&server)
        .await;

    let client = weather_client(
        &server,
        configuration(json!({
            "api_key": "key",
            "latitude": 47.1,
            "longitude": 8.3,
            "elevation": 440,
            "forecast_days": 3,
            "packages": ["current", "basic-day", "sunmoon"]
        })),
    );

    let snapshot = client.fetch_weather().await?;

    let current = snapshot.data_current.ok_or("missing current section")?;
    assert_eq!(current.temperature, Some(json!(18.4)));
    assert_eq!(current.relativehumidity, Some(json!(64)));

    let daily = snapshot.data_day.ok_or("missing daily section")?;
    assert_eq!(daily.days().len(), 3);
    assert_eq!(daily.moonrise, Some(vec![json!("02:12"), json!("02:40"), json!("---")]));

    client.close();

    Ok(())
}

#[tokio::test]
async fn test_fetch_weather_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/packages/current"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": true, "error_message": "Invalid API key"})),
        )
        .mount(&server)
        .await;

    let client = weather_client(
        &server,
        configuration(json!({
            "api_key": "bad",
            "latitude": 47.1,
            "longitude": 8.3,
            "packages": ["current"]
        })),
    );

    match client.fetch_weather().await {
        Err(WeatherError::Api { status, body }) => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body.contains("Invalid API key"));
        }
        other => panic!("Unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_weather_invalid_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/packages/current"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = weather_client(
        &server,
        configuration(json!({
            "api_key": "key",
            "latitude": 47.1,
            "longitude": 8.3,
            "packages": ["current"]
        })),
    );

    assert!(matches!(
        client.fetch_weather().await,
        Err(WeatherError::Parse(_))
    ));
}

#[tokio::test]
async fn test_full_cycle() -> Result<(), Box<dyn Error>> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/packages/current_basic-1h_basic-day_sunmoon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
        .expect(1)
        .mount(&server)
        .await;

    let config = configuration(json!({
        "api_key": "key",
        "latitude": 47.1,
        "longitude": 8.3,
        "forecast_days": 7
    }));
    let daemon = Daemon::new(&config, weather_client(&server, config.clone()), Recorder::default());

    daemon.setup_sensors().await?;
    daemon.run_cycle().await?;

    let topics = daemon.publisher().sink().topics();
    let discovery_count = 6 + 5 + 4 * 7;

    // Every discovery message comes before the first state
    assert!(topics[..discovery_count].iter().all(|t| t.ends_with("/config")));
    assert!(topics[discovery_count..].iter().all(|t| t.ends_with("/state")));

    // The provider returned 3 days, fewer than the 7 declared
    let temp_max: Vec<&String> = topics
        .iter()
        .filter(|t| t.starts_with("meteoblue/forecast_day_") && t.ends_with("_temp_max/state"))
        .collect();
    assert_eq!(
        temp_max,
        vec![
            "meteoblue/forecast_day_0_temp_max/state",
            "meteoblue/forecast_day_1_temp_max/state",
            "meteoblue/forecast_day_2_temp_max/state",
        ]
    );

    // 6 current values, 4 values for each of the 3 days, 5 sun and moon values
    assert_eq!(topics.len(), discovery_count + 6 + 4 * 3 + 5);

    let messages = daemon.publisher().sink().messages.lock().expect("poisoned").clone();
    assert!(messages.contains(&(
        "meteoblue/moon_phase/state".to_string(),
        "waning crescent".to_string(),
        false
    )));
    assert!(messages.contains(&(
        "meteoblue/wind_direction/state".to_string(),
        "250".to_string(),
        false
    )));

    Ok(())
}

/// Weather source that always fails, remembering when it was called
#[derive(Default)]
struct FailingSource {
    calls: Mutex<Vec<Instant>>,
}

#[async_trait]
impl WeatherSource for FailingSource {
    async fn fetch_weather(&self) -> Result<WeatherSnapshot, WeatherError> {
        self.calls.lock().expect("poisoned").push(Instant::now());
        Err(WeatherError::Api {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycles_wait_full_interval() {
    let config = configuration(json!({"api_key": "key", "update_interval": 30}));
    let interval = Duration::from_secs(30 * 60);
    let daemon = Daemon::new(&config, FailingSource::default(), Recorder::default());

    let start = Instant::now();
    daemon
        .poll_loop(tokio::time::sleep(interval * 2 + Duration::from_secs(1)))
        .await;

    let (source, sink) = daemon.into_parts();
    let calls = source.calls.lock().expect("poisoned").clone();

    assert_eq!(
        calls,
        vec![start, start + interval, start + interval * 2]
    );
    assert!(sink.topics().is_empty());
}

/// Weather source that always returns the sample response, remembering when it was called
#[derive(Default)]
struct SampleSource {
    calls: Mutex<Vec<Instant>>,
}

#[async_trait]
impl WeatherSource for SampleSource {
    async fn fetch_weather(&self) -> Result<WeatherSnapshot, WeatherError> {
        self.calls.lock().expect("poisoned").push(Instant::now());
        Ok(serde_json::from_value(sample_response())?)
    }
}

/// MQTT client whose event loop is gone, so every publish fails
struct BrokenSink {
    client: AsyncClient,
}

impl BrokenSink {
    fn new() -> BrokenSink {
        let (client, event_loop) = AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 1);
        drop(event_loop);
        BrokenSink { client }
    }
}

#[async_trait]
impl MessageSink for BrokenSink {
    async fn publish(
        &self,
        topic: String,
        payload: String,
        retain: bool,
    ) -> Result<(), PublishError> {
        MessageSink::publish(&self.client, topic, payload, retain).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_publish_waits_full_interval() {
    let config = configuration(json!({"api_key": "key", "update_interval": 1}));
    let interval = Duration::from_secs(60);
    let daemon = Daemon::new(&config, SampleSource::default(), BrokenSink::new());

    assert!(matches!(
        daemon.run_cycle().await,
        Err(CycleError::Publish(_))
    ));

    let start = Instant::now();
    daemon
        .poll_loop(tokio::time::sleep(interval * 2 + Duration::from_secs(1)))
        .await;

    let (source, _) = daemon.into_parts();
    let calls = source.calls.lock().expect("poisoned").clone();

    // The first call comes from the single cycle above
    assert_eq!(
        calls[1..],
        [start, start + interval, start + interval * 2]
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_wait() {
    let config = configuration(json!({"api_key": "key", "update_interval": 5}));
    let daemon = Daemon::new(&config, FailingSource::default(), Recorder::default());

    let start = Instant::now();
    daemon
        .poll_loop(tokio::time::sleep(Duration::from_secs(10)))
        .await;

    assert_eq!(Instant::now() - start, Duration::from_secs(10));
    let (source, _) = daemon.into_parts();
    assert_eq!(source.calls.lock().expect("poisoned").len(), 1);
}
