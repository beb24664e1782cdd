// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types.
//!
//! Admission-time and configuration errors are returned to the caller.
//! Submission errors ([`SubmitError`]) stay inside the engine: they only
//! decide whether a batch is delivered, requeued, isolated or dropped.

use thiserror::Error;

/// A measurement could not be built or admitted.
#[derive(Debug, Error, PartialEq)]
pub enum MeasurementError {
    #[error("measurement for {database}/{name} does not contain a field")]
    NoFields { database: String, name: String },

    #[error("measurement {0} has no target database")]
    NoDatabase(String),

    #[error("invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value {value:?} for {name}")]
    Environment { name: String, value: String },

    #[error("sample probability must be within [0, 1], got {0}")]
    SampleProbability(f64),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("no tokio runtime available; call from within a runtime or pass one explicitly")]
    NoRuntime,

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Classified outcome of a failed HTTP submission.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubmitError {
    /// The endpoint rejected the payload as malformed (HTTP 400).
    #[error("rejected as malformed (400): {body}")]
    BadRequest { body: String },

    /// The endpoint failed (HTTP 5xx).
    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },

    /// Connection, TLS or timeout failure before a response was read.
    #[error("transport error: {0}")]
    Transport(String),

    /// Any other non-success status.
    #[error("unexpected status ({status}): {body}")]
    Unexpected { status: u16, body: String },
}

impl SubmitError {
    /// Classify an HTTP status. Returns `None` for 2xx.
    pub fn from_status(status: u16, body: String) -> Option<Self> {
        match status {
            200..=299 => None,
            400 => Some(SubmitError::BadRequest { body }),
            500..=u16::MAX => Some(SubmitError::Server { status, body }),
            _ => Some(SubmitError::Unexpected { status, body }),
        }
    }

    /// Whether the same payload may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, SubmitError::Server { .. } | SubmitError::Transport(_))
    }
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
