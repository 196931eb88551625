use telecaller_dashboard::app;
use telecaller_dashboard::config::Config;

/// Main entry point for the dashboard web server
///
/// Reads the configuration from the environment, opens the record store
/// (remote spreadsheet or local files) and serves the JSON API.
///
/// # Environment
/// * `RUST_LOG` - log filter, `info` when unset
/// * See [`Config::from_env`] for the rest
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    app::run(config).await
}
