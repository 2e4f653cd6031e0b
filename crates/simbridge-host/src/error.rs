use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionState;

/// Errors that abort session startup.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("engine library not found at {0}")]
    MissingBinary(PathBuf),
    #[error("failed to load engine library: {0}")]
    LibraryLoad(#[from] libloading::Error),
    #[error("engine library {path} does not export `{symbol}`")]
    MissingEntry { path: PathBuf, symbol: String },
    #[error("{variant} engine returned a null instance")]
    NullInstance { variant: &'static str },
    #[error("engine initialisation failed: {0}")]
    Initialization(String),
    #[error("session is {state:?}, cannot {operation}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },
    #[error(transparent)]
    Contract(#[from] MarshalError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn update loop: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("update loop thread panicked")]
    WorkerPanicked,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    pub(crate) fn missing_entry(path: PathBuf, symbol: impl Into<String>) -> Self {
        HostError::MissingEntry {
            path,
            symbol: symbol.into(),
        }
    }
}

/// Failure of a single update call. The loop reports it and carries on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepError {
    #[error("session has not created an engine yet")]
    NotStarted,
    #[error("session is closed")]
    Closed,
    #[error("engine rejected step at t={time_s}s: {reason}")]
    Engine { time_s: f64, reason: String },
    #[error("engine produced non-finite `{field}` at t={time_s}s")]
    NonFinite { time_s: f64, field: &'static str },
}

impl StepError {
    /// Whether the loop should stop issuing steps after this error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepError::NotStarted | StepError::Closed)
    }
}

/// A sample did not match the variant it was meant for.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("{variant} sample expects {expected} fields, got {actual}")]
    FieldCount {
        variant: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{variant} sample has no field `{field}`")]
    UnknownField { variant: &'static str, field: String },
    #[error("{variant} field {index} is `{expected}`, got `{actual}`")]
    FieldOrder {
        variant: &'static str,
        index: usize,
        expected: &'static str,
        actual: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("timestep must be finite and positive, got {0}")]
    Timestep(f64),
    #[error("start time must be finite and non-negative, got {0}")]
    StartTime(f64),
    #[error("run limit must be finite and non-negative, got {0}")]
    MaxTime(f64),
    #[error("record rate must be finite and non-negative, got {0}")]
    RecordRate(f64),
    #[error("range for `{field}` is empty or too wide ({low}..{high})")]
    EmptyRange { field: String, low: f64, high: f64 },
    #[error("unknown model variant `{0}`")]
    UnknownVariant(String),
    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}
