use clap::Parser;
use emorec::{EmotionPredictor, Settings};
use eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Audio emotion recognition server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Directory holding the trained model artifacts.
    #[arg(long, default_value = "saved_models")]
    model_dir: PathBuf,

    /// Analysis window length in seconds when no chorus bounds are given.
    #[arg(long, default_value_t = 30.0)]
    segment_duration: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = Settings {
        host: args.host,
        port: args.port,
        model_dir: args.model_dir,
        default_segment_secs: args.segment_duration,
        ..Settings::default()
    };

    let predictor = EmotionPredictor::new(&settings.model_dir, settings.default_segment_secs)?;
    let models = predictor.list_models()?;
    tracing::info!(
        model_dir = %settings.model_dir.display(),
        models = ?models,
        "predictor initialized"
    );

    emorec::server::serve(settings, Arc::new(predictor)).await?;
    Ok(())
}
