//! ---
//! tw_section: "01-core-functionality"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Shared primitives and utilities for the core runtime."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::directory::Location;
use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_broker_host() -> String {
    "broker.hivemq.com".to_owned()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "railway/sensor/+".to_owned()
}

fn default_client_id() -> String {
    "trackwatchd".to_owned()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(30)
}

fn default_channel_capacity() -> usize {
    64
}

fn default_classifier_url() -> String {
    "http://127.0.0.1:8000/predict".to_owned()
}

fn default_classifier_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_data_file() -> PathBuf {
    PathBuf::from("data/alerts.json")
}

fn default_red_threshold() -> f64 {
    -0.2
}

fn default_rms_ratio() -> f64 {
    0.7
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:3000".parse().expect("valid default api address")
}

fn default_events_listen() -> SocketAddr {
    "0.0.0.0:8081".parse().expect("valid default events address")
}

fn default_hub_capacity() -> usize {
    256
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_feed_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_anomaly_probability() -> f64 {
    0.15
}

fn default_simulation_seed() -> u64 {
    0x7AC42
}

fn default_simulation_nodes() -> Vec<String> {
    vec!["TRACK_SEC_42".to_owned(), "TRACK_SEC_43".to_owned()]
}

fn default_location_nodes() -> IndexMap<String, Location> {
    let mut nodes = IndexMap::new();
    nodes.insert(
        "TRACK_SEC_42".to_owned(),
        Location::new(28.6139, 77.2090, "New Delhi Central"),
    );
    nodes.insert(
        "TRACK_SEC_43".to_owned(),
        Location::new(28.5355, 77.3910, "Noida Sector 18"),
    );
    nodes
}

fn default_fallback_location() -> Location {
    Location::new(28.6139, 77.2090, "Unknown")
}

/// Primary configuration object for the TrackWatch runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub locations: LocationsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "TRACKWATCH_CONFIG";

    /// Load configuration from disk, respecting the `TRACKWATCH_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.intake.validate()?;
        self.classifier.validate()?;
        self.synthesis.validate()?;
        self.events.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            intake: IntakeConfig::default(),
            classifier: ClassifierConfig::default(),
            registry: RegistryConfig::default(),
            correlation: CorrelationConfig::default(),
            synthesis: SynthesisConfig::default(),
            api: ApiConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            simulation: SimulationConfig::default(),
            locations: LocationsConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Operating mode for the daemon.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Consume live telemetry from the configured broker.
    #[default]
    Production,
    /// Drive the pipeline from the built-in synthetic feed.
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

/// Transport subscription settings for the telemetry intake.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(default = "default_broker_host")]
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub keep_alive: Duration,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl IntakeConfig {
    fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(anyhow!("intake topic must not be empty"));
        }
        if self.channel_capacity == 0 {
            return Err(anyhow!("intake channel capacity must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            topic: default_topic(),
            client_id: default_client_id(),
            keep_alive: default_keep_alive(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Endpoint settings for the external anomaly classifier.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_url")]
    pub url: String,
    #[serde(default = "default_classifier_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl ClassifierConfig {
    fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!("classifier url must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("classifier timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: default_classifier_url(),
            timeout: default_classifier_timeout(),
        }
    }
}

/// Storage location for the durable alert collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

/// Tunables for the alert correlation decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Confidence scores below this cut-off escalate to RED severity.
    #[serde(default = "default_red_threshold")]
    pub red_threshold: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            red_threshold: default_red_threshold(),
        }
    }
}

/// Inclusive value range used when synthesizing absent sensor channels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ValueRange {
    pub lo: f64,
    pub hi: f64,
}

impl ValueRange {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    fn validate(&self, field: &str) -> Result<()> {
        if self.lo > self.hi {
            return Err(anyhow!(
                "synthesis range for {} is inverted ({} > {})",
                field,
                self.lo,
                self.hi
            ));
        }
        Ok(())
    }
}

/// Bounded baselines substituted for sensor channels the node did not send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Ratio applied to the raw vibration channel to derive a roll RMS value.
    #[serde(default = "default_rms_ratio")]
    pub rms_ratio: f64,
    #[serde(default = "SynthesisConfig::default_mag_norm")]
    pub mag_norm: ValueRange,
    #[serde(default = "SynthesisConfig::default_temperature")]
    pub temperature: ValueRange,
    #[serde(default = "SynthesisConfig::default_humidity")]
    pub humidity: ValueRange,
    #[serde(default = "SynthesisConfig::default_pressure")]
    pub pressure: ValueRange,
    /// Optional deterministic seed, primarily for tests and simulation runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SynthesisConfig {
    fn default_mag_norm() -> ValueRange {
        ValueRange::new(40.0, 45.0)
    }

    fn default_temperature() -> ValueRange {
        ValueRange::new(25.0, 27.0)
    }

    fn default_humidity() -> ValueRange {
        ValueRange::new(60.0, 65.0)
    }

    fn default_pressure() -> ValueRange {
        ValueRange::new(1013.0, 1023.0)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.rms_ratio) {
            return Err(anyhow!("synthesis rms_ratio must lie within [0, 1]"));
        }
        self.mag_norm.validate("mag_norm")?;
        self.temperature.validate("temperature")?;
        self.humidity.validate("humidity")?;
        self.pressure.validate("pressure")?;
        Ok(())
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            rms_ratio: default_rms_ratio(),
            mag_norm: Self::default_mag_norm(),
            temperature: Self::default_temperature(),
            humidity: Self::default_humidity(),
            pressure: Self::default_pressure(),
            seed: None,
        }
    }
}

/// REST query/command surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_api_listen(),
        }
    }
}

/// Observer event-stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_events_listen")]
    pub listen: SocketAddr,
    /// Broadcast buffer depth before slow observers start dropping frames.
    #[serde(default = "default_hub_capacity")]
    pub hub_capacity: usize,
}

impl EventsConfig {
    fn validate(&self) -> Result<()> {
        if self.hub_capacity == 0 {
            return Err(anyhow!("events hub capacity must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            listen: default_events_listen(),
            hub_capacity: default_hub_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

/// Synthetic feed settings used in simulation mode.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_feed_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub feed_interval: Duration,
    #[serde(default = "default_anomaly_probability")]
    pub anomaly_probability: f64,
    #[serde(default = "default_simulation_seed")]
    pub seed: u64,
    #[serde(default = "default_simulation_nodes")]
    pub nodes: Vec<String>,
}

impl SimulationConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.anomaly_probability) {
            return Err(anyhow!("anomaly probability must lie within [0, 1]"));
        }
        if self.nodes.is_empty() {
            return Err(anyhow!("simulation must declare at least one node"));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            feed_interval: default_feed_interval(),
            anomaly_probability: default_anomaly_probability(),
            seed: default_simulation_seed(),
            nodes: default_simulation_nodes(),
        }
    }
}

/// Deployment-supplied node-to-location table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationsConfig {
    #[serde(default = "default_location_nodes")]
    pub nodes: IndexMap<String, Location>,
    /// Returned for node identifiers absent from the table.
    #[serde(default = "default_fallback_location")]
    pub fallback: Location,
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            nodes: default_location_nodes(),
            fallback: default_fallback_location(),
        }
    }
}
