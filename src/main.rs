//! ER wait-time prediction server.
//!
//! Loads configuration, latches the prediction strategy with a startup
//! self-test and serves the HTTP API.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use er_wait_predictor::config::PredictorConfig;
use er_wait_predictor::engine::PredictionEngine;
use er_wait_predictor::feeds::{
    simulated_feeds, DataCollector, HospitalDirectory, OpenMeteoWeather, SimulatedTraffic, StaticDirectory,
};
use er_wait_predictor::server::{run_server, AppState};
use er_wait_predictor::telemetry::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = PredictorConfig::from_env()?;
    let _log_guard = init_logging(&config)?;

    println!("\n{}", "═".repeat(60));
    println!("🏥 ER Wait Time Predictor v{}", env!("CARGO_PKG_VERSION"));
    println!("{}\n", "═".repeat(60));

    let orchestrator = config.build_orchestrator().await;
    if orchestrator.model_backed_enabled() {
        info!("Predictions will use {} ({})", config.model, orchestrator.status().backend.unwrap_or_default());
    } else {
        warn!("Model-backed predictions disabled; serving rule-based estimates only");
    }

    let engine = PredictionEngine::new(orchestrator)
        .with_feeds(simulated_feeds(config.feed_seed))
        .with_max_concurrency(config.max_concurrency);

    let directory: Arc<dyn HospitalDirectory> = match &config.hospitals_file {
        Some(path) => Arc::new(StaticDirectory::from_json_file(path)?),
        None => {
            info!("HOSPITALS_FILE not set, using the built-in sample directory");
            Arc::new(StaticDirectory::sample())
        }
    };
    let mut collector = DataCollector::new(
        directory,
        Arc::new(OpenMeteoWeather::new()),
        Arc::new(SimulatedTraffic::new(config.feed_seed)),
    );
    if let Some(seed) = config.feed_seed {
        collector = collector.with_seed(seed);
    }

    run_server(AppState::new(engine, collector), &config.bind_addr).await
}
