//! Structured error types for hollowwatch.
//!
//! Using thiserror for automatic Display implementation and error
//! chaining, matching spec.md §7's error taxonomy: initialization
//! failures are the only kind allowed to propagate to `main`; every
//! other kind is contained at its layer.

use thiserror::Error;

use super::types::Pid;

/// Initialization failures (spec.md §7 kind 1). Fatal — propagates to
/// `main` and causes a non-zero exit.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to subscribe to event source: {0}")]
    EventSourceInit(String),

    #[error("failed to enumerate processes: {0}")]
    EnumerationFailed(String),

    #[error("scheduling conflict for pid {0}: a worker was already active")]
    SchedulingConflict(Pid),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Configuration-loading failures: bad CLI arguments or a malformed
/// INI file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for --{flag}: {value}")]
    InvalidFlagValue { flag: String, value: String },

    #[error("malformed INI line {line}: {text}")]
    MalformedIniLine { line: usize, text: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Report rendering / write failures (spec.md §7 kind 5 — "logged to
/// stderr; does not affect the in-memory report").
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    SerializationFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Post-scan actuator failures (suspend/terminate). Per spec.md §4.7
/// these "may fail silently" from the perspective of the scan
/// pipeline, but the actuator itself still reports what happened so
/// callers can log it.
#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("failed to open process {0}: {1}")]
    OpenFailed(Pid, String),

    #[error("failed to suspend process {0}: {1}")]
    SuspendFailed(Pid, String),

    #[error("failed to terminate process {0}: {1}")]
    TerminateFailed(Pid, String),
}
