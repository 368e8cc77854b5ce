use sentinel_series::config::{self, Config};
use sentinel_series::ingest::earth_engine::EarthEngineClient;
use sentinel_series::logging::{self, Stage};
use sentinel_series::pipeline;
use sentinel_series::Result;

fn load() -> Result<Config> {
    let path = config::config_path_from_env();
    config::load_config(&path)
        .inspect_err(|e| eprintln!("Failed to load config {}: {}", path.display(), e))
}

fn run(config: &Config) -> Result<()> {
    let token = config::access_token_from_env()?;

    // No request timeout: a stalled transfer blocks the run.
    let http = reqwest::blocking::Client::builder()
        .timeout(None::<std::time::Duration>)
        .build()?;

    let earth_engine = EarthEngineClient::new(
        http.clone(),
        &config.project.api_base_url,
        &config.project.id,
        &token,
    );

    let summary = pipeline::run(&earth_engine, &http, config)?;
    logging::info(
        Stage::System,
        None,
        &format!("Download and processing successful! Cleaned CSV saved to {}", summary.output.display()),
    );
    Ok(())
}

fn main() {
    dotenv::dotenv().ok();

    let config = match load() {
        Ok(config) => config,
        Err(_) => std::process::exit(1),
    };

    logging::init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );
    logging::info(
        Stage::Config,
        Some(config.project.id.as_str()),
        &format!("{} bands from {}", config.query.bands.len(), config.query.collection),
    );

    if let Err(e) = run(&config) {
        logging::error(Stage::System, None, &format!("run aborted: {}", e));
        std::process::exit(1);
    }
}
