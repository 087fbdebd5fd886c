//! HTTP server for the Lucy analytics API

use clap::Parser;
use lucy::config::LucyConfig;
use lucy::pipeline::AnalyticsPipeline;
use lucy::server::ApiServer;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "lucy-server")]
#[command(about = "HTTP API for natural-language analytics queries")]
struct Args {
    /// Address to bind (overrides LUCY_BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    lucy::init_tracing();

    let args = Args::parse();
    let config = LucyConfig::from_env()?;
    let addr = args.bind.unwrap_or_else(|| config.bind_addr.clone());

    info!("Starting Lucy analytics API on http://{}", addr);
    info!(
        "Models: query={}, explain={}, chart={}; catalog policy {:?}",
        config.llm.query_model, config.llm.explain_model, config.llm.chart_model, config.catalog_policy
    );

    let pipeline = Arc::new(AnalyticsPipeline::from_config(&config)?);
    Arc::new(ApiServer::new(pipeline)).serve(&addr).await?;
    Ok(())
}
