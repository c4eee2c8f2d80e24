//! Binary entrypoint for the impact pipeline.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use impact_engine::LinearRiskModel;
use impact_pipeline::{router, Config, EventPatchFallback, Pipeline};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  if let Err(e) = run_server().await {
    eprintln!("impact-pipeline error: {}", e);
    std::process::exit(1);
  }
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
  let config = Config::from_env()?;
  let port = config.port;
  let model = LinearRiskModel::load_optional(config.risk_model_path.as_deref());

  let mut pipeline = Pipeline::new(config).with_fallback(Arc::new(EventPatchFallback));
  if let Some(model) = model {
    pipeline = pipeline.with_classifier(Arc::new(model));
  }
  let app = router(Arc::new(pipeline));

  let addr = SocketAddr::from(([127, 0, 0, 1], port));
  info!(%addr, "impact-pipeline listening");

  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app).await?;
  Ok(())
}
