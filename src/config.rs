use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use crate::aggregator::DEFAULT_FALLBACK_PROCESS;
use crate::error::{AgentError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Flattened comma-separated values
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "jsonl",
            OutputFormat::Csv => "csv",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Stdout,
    Folder(PathBuf),
}

#[derive(Parser, Debug)]
#[command(name = "HwScope Agent")]
#[command(about = "Agent sampling CPU, GPU and GPU process status", long_about = None)]
pub struct Cli {
    /// Output folder for snapshots, or '-' for stdout
    #[arg(short, long, default_value = "./snapshots")]
    pub output: String,

    /// Run continuously
    #[arg(long, default_value_t = false)]
    pub continuous: bool,

    /// Sampling period in seconds
    #[arg(short, long, default_value_t = 2.0)]
    pub period: f64,

    /// Feed format in continuous mode
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Process name reported when no GPU process is found
    #[arg(long, default_value = DEFAULT_FALLBACK_PROCESS)]
    pub fallback_process: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Validated agent settings
#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    pub output: Output,
    pub continuous: bool,
    pub interval: Duration,
    pub format: OutputFormat,
    pub fallback_process: String,
    pub log_level: LevelFilter,
}

impl TryFrom<Cli> for AgentConfig {
    type Error = AgentError;

    fn try_from(cli: Cli) -> Result<Self> {
        if !cli.period.is_finite() || cli.period <= 0.0 {
            return Err(AgentError::config(format!(
                "period must be a positive number of seconds, got {}",
                cli.period
            )));
        }

        let fallback_process = cli.fallback_process.trim().to_string();
        if fallback_process.is_empty() {
            return Err(AgentError::config("fallback process name cannot be empty"));
        }

        let output = match cli.output.as_str() {
            "-" => Output::Stdout,
            "" => return Err(AgentError::config("output folder cannot be empty")),
            folder => Output::Folder(PathBuf::from(folder)),
        };

        let interval = Duration::try_from_secs_f64(cli.period).map_err(|e| {
            AgentError::config(format!("period {} is out of range: {}", cli.period, e))
        })?;

        let log_level = match cli.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        Ok(AgentConfig {
            output,
            continuous: cli.continuous,
            interval,
            format: cli.format,
            fallback_process,
            log_level,
        })
    }
}

impl AgentConfig {
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| AgentError::config(e.to_string()))?;
        AgentConfig::try_from(cli)
    }
}
