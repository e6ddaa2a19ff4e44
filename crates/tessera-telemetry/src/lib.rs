//! Log output for provider binaries.
//!
//! stdout carries the responses to the orchestrator, so readable logs go to stderr. Given a
//! log directory, the same events are also written as JSON lines to daily files named after
//! the provider.
mod logging;

pub use crate::logging::{Error, LOG_FILTER_ENV, LogGuard, TelemetryOptions, init};
