//! ---
//! tw_section: "01-core-functionality"
//! tw_subsection: "binary"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Binary entrypoint for the TrackWatch daemon."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use trackwatch_classify::{Classifier, HttpClassifier};
use trackwatch_common::config::{AppConfig, Mode};
use trackwatch_common::logging::init_tracing;
use trackwatch_common::LocationDirectory;
use trackwatch_core::{
    new_registry, CorrelationEngine, FieldSynthesizer, IngestionPipeline, PipelineMetrics, SimFeed,
};
use trackwatch_msg::intake::{ChannelIntake, MqttIntake};
use trackwatch_msg::BroadcastHub;
use trackwatch_net::{AlertsApiBuilder, EventStreamBuilder};
use trackwatch_registry::AlertRegistry;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "TrackWatch daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.prod.toml"));
    candidates.push(PathBuf::from("configs/example.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    init_tracing("trackwatchd", &config.logging)?;
    info!(config_path = %loaded.source.display(), mode = ?config.mode, "configuration loaded");

    let metrics_registry = config.metrics.enabled.then(new_registry);

    let registry = Arc::new(AlertRegistry::open(&config.registry.data_file)?);
    info!(
        alerts = registry.len(),
        data_file = %config.registry.data_file.display(),
        "alert registry ready"
    );

    let directory = LocationDirectory::from_config(&config.locations);
    info!(nodes = directory.len(), "location directory loaded");

    let hub = BroadcastHub::new(config.events.hub_capacity);
    let classifier: Arc<dyn Classifier> = Arc::new(HttpClassifier::new(
        &config.classifier.url,
        config.classifier.timeout,
    )?);
    let correlation = CorrelationEngine::new(
        registry.clone(),
        directory,
        config.correlation.red_threshold,
    );
    let synthesizer = FieldSynthesizer::from_config(&config.synthesis);
    let pipeline_metrics = metrics_registry
        .as_ref()
        .map(PipelineMetrics::new)
        .transpose()?;

    let mut api_builder = AlertsApiBuilder::new(config.api.listen, registry.clone(), hub.clone());
    if let Some(metrics) = &metrics_registry {
        api_builder = api_builder.with_metrics_registry(metrics.clone());
    }
    let api_handle = api_builder.spawn().await?;
    let events_handle = EventStreamBuilder::new(config.events.listen, hub.clone())
        .spawn()
        .await?;

    let (shutdown_tx, _) = broadcast::channel(8);

    let pipeline_task: JoinHandle<()> = match config.mode {
        Mode::Production => {
            let intake = MqttIntake::new(
                &config.intake.broker_host,
                config.intake.broker_port,
                &config.intake.client_id,
                &config.intake.topic,
                config.intake.keep_alive,
            );
            info!(
                broker = %config.intake.broker_host,
                port = config.intake.broker_port,
                topic = %config.intake.topic,
                "consuming live telemetry"
            );
            let mut pipeline =
                IngestionPipeline::new(intake, classifier, synthesizer, correlation, hub.clone());
            if let Some(metrics) = pipeline_metrics {
                pipeline = pipeline.with_metrics(metrics);
            }
            tokio::spawn(pipeline.run(shutdown_tx.subscribe()))
        }
        Mode::Simulation => {
            let (intake_handle, intake) = ChannelIntake::new(config.intake.channel_capacity);
            let feed = SimFeed::from_config(&config.simulation, intake_handle);
            tokio::spawn(feed.run(shutdown_tx.subscribe()));
            info!("consuming synthetic telemetry");
            let mut pipeline =
                IngestionPipeline::new(intake, classifier, synthesizer, correlation, hub.clone());
            if let Some(metrics) = pipeline_metrics {
                pipeline = pipeline.with_metrics(metrics);
            }
            tokio::spawn(pipeline.run(shutdown_tx.subscribe()))
        }
    };

    shutdown_signal().await;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(());
    if let Err(err) = pipeline_task.await {
        error!(error = %err, "pipeline task join error");
    }
    api_handle.shutdown().await?;
    events_handle.shutdown().await?;
    info!("trackwatchd stopped");
    Ok(())
}

/// Wait for an operator interrupt or service termination signal.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = signal::ctrl_c() => {},
            _ = async {
                use tokio::signal::unix::{signal, SignalKind};
                let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
                term.recv().await;
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
