use log::error;
use meteoblue_mqtt::configuration::Configuration;
use meteoblue_mqtt::daemon;

const DEFAULT_CONFIG_PATH: &str = "/data/options.json";

/// Log verbosity used until the configuration is read
const DEFAULT_VERBOSITY: usize = 3;

fn init_logging(verbosity: usize) {
    stderrlog::new()
        .module(module_path!())
        .verbosity(verbosity.saturating_sub(1))
        .timestamp(stderrlog::Timestamp::Second)
        .init()
        .unwrap_or_else(|e| eprintln!("Failed to initialize logging: {e}"));
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => path.as_str(),
        None => DEFAULT_CONFIG_PATH,
    };

    let config = match Configuration::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            init_logging(DEFAULT_VERBOSITY);
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(config.log_verbosity);

    if daemon::run(config).await.is_err() {
        std::process::exit(1);
    }
}
