//! Domain model for hollowwatch.
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via the newtype pattern (`Pid`)
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

pub use errors::{ActuatorError, ConfigError, CoreError, ReportError};
pub use types::{
    basename_lower, Event, Finding, HHParams, InspectorOptions, InspectorOpts, Pid, Report,
    TcpIpKind, WallClockSecs,
};
