// Configuration management for the firewall path analyzer binary
// Supports CLI arguments, config file (TOML), and environment variables

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

use firewall_path_analyzer::trace::{AnalyzeOptions, Deadline, DEFAULT_MAX_HOPS};

/// Firewall Path Analyzer - trace flows through modeled firewall topologies
#[derive(Parser, Debug, Clone)]
#[command(name = "firewall-path-analyzer")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, global = true, env = "FPA_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "FPA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Maximum device passes before a flow is reported as looping
    #[arg(long, global = true, env = "FPA_MAX_HOPS")]
    pub max_hops: Option<usize>,

    /// Per-analysis time limit in milliseconds
    #[arg(long, global = true, env = "FPA_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Print single-line JSON
    #[arg(long, global = true, env = "FPA_COMPACT")]
    pub compact: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Trace one flow and print the result
    Analyze {
        /// Topology file (.json or .toml)
        #[arg(short, long)]
        topology: PathBuf,

        /// Start device; located from the source address when omitted
        #[arg(short, long)]
        device: Option<String>,

        #[arg(long)]
        src: String,

        #[arg(long)]
        dst: String,

        /// Destination port (ignored for icmp)
        #[arg(short, long, default_value_t = 0)]
        port: u16,

        #[arg(long, default_value = "tcp")]
        protocol: String,
    },

    /// Trace every flow of a flows file
    Batch {
        #[arg(short, long)]
        topology: PathBuf,

        #[arg(short, long)]
        flows: PathBuf,
    },

    /// Report flows whose verdict changes between two topologies
    WhatIf {
        /// Current topology
        #[arg(short, long)]
        topology: PathBuf,

        /// Proposed topology
        #[arg(long)]
        candidate: PathBuf,

        #[arg(short, long)]
        flows: PathBuf,
    },
}

/// Configuration file structure (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Hop ceiling for loop detection
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    /// Per-analysis time limit, unlimited when absent
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Pretty-print JSON output
    #[serde(default = "default_true")]
    pub pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_max_hops() -> usize {
    DEFAULT_MAX_HOPS
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            max_hops: default_max_hops(),
            timeout_ms: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            pretty: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub log_level: Level,
    pub max_hops: usize,
    pub timeout: Option<Duration>,
    pub pretty: bool,
}

impl Config {
    /// Load configuration from all sources (CLI args, config file, defaults)
    /// Priority: CLI args > Environment variables > Config file > Defaults
    pub fn load() -> anyhow::Result<Self> {
        let cli_args = CliArgs::parse();

        // Load config file if specified
        let config_file = if let Some(config_path) = &cli_args.config {
            tracing::info!("Loading configuration from: {}", config_path.display());
            let config_content = std::fs::read_to_string(config_path)?;
            toml::from_str::<ConfigFile>(&config_content)?
        } else {
            // Try loading from default locations
            let default_paths = vec![
                PathBuf::from("firewall-path-analyzer.toml"),
                PathBuf::from("config.toml"),
            ];

            let mut loaded_config = None;
            for path in default_paths {
                if path.exists() {
                    tracing::info!("Loading configuration from: {}", path.display());
                    let config_content = std::fs::read_to_string(&path)?;
                    loaded_config = Some(toml::from_str::<ConfigFile>(&config_content)?);
                    break;
                }
            }

            loaded_config.unwrap_or_default()
        };

        Self::merge(cli_args, config_file)
    }

    /// CLI args override the config file.
    fn merge(cli_args: CliArgs, config_file: ConfigFile) -> anyhow::Result<Self> {
        let level = cli_args.log_level.unwrap_or(config_file.logging.level);
        let log_level = parse_log_level(&level)?;

        let max_hops = cli_args.max_hops.unwrap_or(config_file.analysis.max_hops);
        if max_hops == 0 {
            anyhow::bail!("max_hops must be at least 1");
        }

        let timeout = cli_args
            .timeout_ms
            .or(config_file.analysis.timeout_ms)
            .map(Duration::from_millis);

        let pretty = !cli_args.compact && config_file.output.pretty;

        Ok(Config {
            command: cli_args.command,
            log_level,
            max_hops,
            timeout,
            pretty,
        })
    }

    /// Analysis options; the timeout is applied to each analysis separately.
    pub fn analyze_options(&self) -> AnalyzeOptions {
        AnalyzeOptions {
            max_hops: self.max_hops,
            deadline: Deadline::none(),
            timeout: self.timeout,
        }
    }
}

fn parse_log_level(level_str: &str) -> anyhow::Result<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level_str)),
    }
}
