use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sproc_streamer::{
    config::Config,
    database::Database,
    export::DocumentExporter,
    pipeline::Pipeline,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "sproc-streamer")]
#[command(version)]
#[command(about = "Invokes discovered stored procedures concurrently and streams their results as XML documents")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve documents over HTTP (default)
    Serve,
    /// Run the pipeline once and write one XML file per unit
    Export {
        /// Directory receiving `<unit>.xml` files
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with specified level
    let log_filter = if cli.log_level == "trace" {
        format!("sproc_streamer={},tower_http=trace", cli.log_level)
    } else {
        format!("sproc_streamer={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sproc-streamer v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    config.validate()?;

    info!("Using database: {}", config.database.url);
    let database = Database::new(&config.database).await?;
    info!("Database connection established ({:?})", database.backend());

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    let pipeline = Arc::new(Pipeline::from_database(database.clone(), &config.pipeline));

    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, pipeline, shutdown).await,
        Command::Export { output_dir } => export(pipeline, output_dir, shutdown).await,
    };

    database.close().await;
    outcome
}

async fn serve(config: &Config, pipeline: Arc<Pipeline>, shutdown: CancellationToken) -> Result<()> {
    let web_server = WebServer::new(config, AppState::new(pipeline, shutdown))?;
    info!("Starting web server on {}", web_server.addr());
    web_server.serve().await
}

async fn export(pipeline: Arc<Pipeline>, output_dir: PathBuf, shutdown: CancellationToken) -> Result<()> {
    let exporter = DocumentExporter::new(output_dir);
    let run = pipeline.run(shutdown).await.map_err(|e| {
        error!("Export aborted: {}", e);
        e
    })?;

    let summary = exporter.export(run).await?;
    let report = &summary.report;

    println!(
        "Exported {} of {} units to {}",
        summary.files.len(),
        report.discovered,
        exporter.output_dir().display()
    );
    for failure in &report.failures {
        println!(
            "  failed: {} ({}) at {}: {}",
            failure.unit_name, failure.procedure_name, failure.stage, failure.error
        );
    }
    if report.cancelled {
        println!("  run was cancelled before completion");
    }
    Ok(())
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down gracefully");
            token.cancel();
        }
        Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
    }
}
