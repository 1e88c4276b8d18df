use std::io;
use thiserror::Error;

use crate::metrics::Pid;

/// Error type shared by the collectors, the sampling loop and the sinks
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hardware interface unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("Process {0} not found")]
    ProcessNotFound(Pid),

    #[error("Sampling loop error: {0}")]
    Loop(String),
}

/// Result type alias for the agent
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        AgentError::Config(msg.into())
    }

    pub fn hardware_unavailable<S: Into<String>>(msg: S) -> Self {
        AgentError::HardwareUnavailable(msg.into())
    }

    pub fn loop_state<S: Into<String>>(msg: S) -> Self {
        AgentError::Loop(msg.into())
    }

    /// The process went away between enumeration and lookup
    pub fn is_process_gone(&self) -> bool {
        matches!(self, AgentError::ProcessNotFound(_))
    }
}
