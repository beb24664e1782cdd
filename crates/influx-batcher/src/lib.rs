// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Buffered InfluxDB measurement submission.
//!
//! Application code records measurements (tags, fields and a timestamp);
//! the engine buffers them per database and writes them to an InfluxDB 1.x
//! `/write` endpoint in batches.
//!
//! This crate provides:
//! - Line Protocol encoding with millisecond timestamps
//! - A per-database FIFO buffer with backpressure
//! - Size and idle-timeout write triggers
//! - Cycle-level sampling
//! - Retry of transient failures and line-by-line isolation of rejected batches
//! - Configuration from explicit options, the environment or a YAML file
//!
//! # Overview
//!
//! ```text
//! Measurement --> Engine::add_measurement --> Buffer --> write cycle --> POST /write?db=..&precision=ms
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use influx_batcher::InstallOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), influx_batcher::Error> {
//!     influx_batcher::install(InstallOptions::default())?;
//!
//!     let engine = influx_batcher::global();
//!     let mut m = engine.measurement("example", "jobs");
//!     {
//!         let mut timer = m.duration("elapsed");
//!         timer.set_tag("kind", "import");
//!     }
//!     m.set_field("rows", 1200)?;
//!     engine.add_measurement(m)?;
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod line_protocol;
pub mod mapping;
pub mod measurement;
pub mod sampler;
pub mod stats;
pub mod transport;

pub use config::{Credentials, InstallOptions, Settings};
pub use engine::{CycleReport, Engine, Lifecycle, WriteOutcome};
pub use error::{ConfigError, Error, MeasurementError, SubmitError};
pub use line_protocol::FieldValue;
pub use measurement::{DurationGuard, Measurement};
pub use stats::Stats;
pub use transport::{Connector, HttpConnector, HttpTransport, Transport};

use std::sync::OnceLock;

static GLOBAL: OnceLock<Engine> = OnceLock::new();

/// Process-wide engine used by [`install`] and [`add_measurement`].
pub fn global() -> &'static Engine {
    GLOBAL.get_or_init(Engine::new)
}

/// Install the process-wide engine. Returns `Ok(false)` on a second call.
pub fn install(options: InstallOptions) -> Result<bool, Error> {
    global().install(options)
}

/// Add a measurement to the process-wide engine.
pub fn add_measurement(measurement: Measurement) -> Result<(), MeasurementError> {
    global().add_measurement(measurement)
}
