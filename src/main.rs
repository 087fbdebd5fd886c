use anyhow::Result;
use clap::{Parser, Subcommand};
use lucy::catalog::SchemaCatalog;
use lucy::config::LucyConfig;
use lucy::execution::ResultRow;
use lucy::pipeline::{AnalyticsPipeline, AskOptions};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "lucy")]
#[command(about = "Natural-language analytics over the platform database")]
struct Args {
    /// Override the query generation model (LUCY_QUERY_MODEL)
    #[arg(long, global = true)]
    query_model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, run, and optionally explain and chart a question
    Ask {
        question: String,
        #[arg(long)]
        explain: bool,
        #[arg(long)]
        chart: bool,
    },
    /// Generate SQL for a question without running it
    Generate { question: String },
    /// Run SQL through the remote execute_query procedure
    Execute { sql: String },
    /// Explain SQL clause by clause
    Explain { question: String, sql: String },
    /// Recommend a chart for rows stored as a JSON array in a file
    Chart {
        question: String,
        #[arg(long)]
        rows: PathBuf,
    },
    /// Check connectivity to the database and the execute_query procedure
    Diagnose,
    /// Print platform-wide dashboard statistics
    Stats,
    /// Print the schema catalog used for prompts and validation
    Catalog,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    lucy::init_tracing();

    let args = Args::parse();

    if let Command::Catalog = args.command {
        return print_json(&SchemaCatalog::platform());
    }

    let mut config = LucyConfig::from_env()?;
    if let Some(model) = args.query_model {
        config.llm.query_model = model;
    }
    let pipeline = AnalyticsPipeline::from_config(&config)?;

    match args.command {
        Command::Ask { question, explain, chart } => {
            info!("Question: {}", question);
            let outcome = pipeline.ask(&question, AskOptions { explain, chart }).await?;
            print_json(&outcome)
        }
        Command::Generate { question } => {
            let query = pipeline.generate_query(&question).await?;
            println!("{}", query.sql);
            Ok(())
        }
        Command::Execute { sql } => print_json(&pipeline.execute_query(&sql).await?),
        Command::Explain { question, sql } => print_json(&pipeline.explain_query(&question, &sql).await?),
        Command::Chart { question, rows } => {
            let rows: Vec<ResultRow> = serde_json::from_str(&std::fs::read_to_string(&rows)?)?;
            let config = pipeline.generate_chart_config(&rows, &question).await?;
            print_json(&serde_json::json!({ "config": config }))
        }
        Command::Diagnose => {
            let report = pipeline.test_database_connection().await;
            print_json(&report)?;
            if !report.success {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Stats => print_json(&serde_json::json!({ "stats": pipeline.dashboard_stats().await })),
        Command::Catalog => print_json(pipeline.catalog()),
    }
}
