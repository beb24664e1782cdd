// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Buffering and dispatch engine.
//!
//! ```text
//! add_measurement --> Buffer --> trigger (size | idle timeout)
//!                                   |
//!                                   v
//!            Sampler --> one POST per database --> reconcile
//!                                                   |  2xx: done
//!                                                   |  400: isolate line by line (own task)
//!                                                   |  5xx/transport: requeue at front
//!                                                   |  other: drop
//!                                                   v
//!                                     post-completion trigger evaluation
//! ```
//!
//! All buffer, trigger and dispatcher state sits behind one mutex that is
//! never held across an await. Admission is synchronous and never waits on
//! the network. At most one write cycle runs at a time (`writing`); cycles
//! and isolation run as tasks on the engine runtime.

use crate::buffer::Buffer;
use crate::config::{self, nonzero, Credentials, InstallOptions, Settings};
use crate::error::{ConfigError, Error, MeasurementError, SubmitError};
use crate::measurement::Measurement;
use crate::sampler::Sampler;
use crate::stats::{Counters, Stats};
use crate::transport::{Client, ClientSettings, Connector, HttpConnector};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use uuid::Uuid;

/// First delay before retrying a cycle that requeued work.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// First pause after a single line failed transiently during isolation.
const ISOLATION_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Pause between flush cycles that requeued work.
const FLUSH_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninstalled,
    /// Installed with submission switched off.
    Disabled,
    Installed,
    Stopping,
    Stopped,
}

/// Result of one [`Engine::write_measurements`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Another cycle was already in flight.
    Skipped,
    /// Nothing was pending.
    Idle,
    /// The sampler vetoed the cycle; this many lines were dropped.
    Discarded(usize),
    /// Batches were submitted and reconciled.
    Written(CycleReport),
    /// No client could be built, so nothing was taken from the buffer, or
    /// the cycle task was aborted.
    Failed(String),
}

/// Per-cycle reconciliation summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub batches: usize,
    pub delivered: usize,
    pub requeued: usize,
    /// Lines of rejected batches handed to line-by-line resubmission.
    pub isolated: usize,
    pub dropped_unclassified: usize,
}

struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

struct State<T> {
    lifecycle: Lifecycle,
    settings: Settings,
    runtime: Option<Handle>,
    buffer: Buffer,
    sampler: Sampler,
    client: Option<Arc<Client<T>>>,
    client_dirty: bool,
    writing: bool,
    isolating: usize,
    cycle_queued: bool,
    timer: Option<Timer>,
    timer_seq: u64,
    failure_streak: u32,
    last_full_warning: Option<Instant>,
    last_size_warning: Option<Instant>,
}

impl<T> State<T> {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            url: self.settings.url.clone(),
            credentials: self.settings.credentials.clone(),
            max_clients: self.settings.max_clients,
            http_timeout: self.settings.http_timeout,
        }
    }
}

struct Inner<C: Connector> {
    connector: C,
    state: Mutex<State<C::Transport>>,
    batch_done: Notify,
    counters: Counters,
}

struct Cycle<T> {
    client: Arc<Client<T>>,
    batches: Vec<(String, Vec<String>)>,
    runtime: Handle,
}

/// Clears `writing` if a cycle task ends before reconciling.
struct CycleGuard<C: Connector> {
    engine: Engine<C>,
    finished: bool,
}

impl<C: Connector> Drop for CycleGuard<C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let inner = &self.engine.inner;
        inner.state.lock().writing = false;
        inner.batch_done.notify_waiters();
    }
}

/// Accounts for one isolation task, however it ends.
struct IsolationGuard<C: Connector> {
    engine: Engine<C>,
}

impl<C: Connector> Drop for IsolationGuard<C> {
    fn drop(&mut self) {
        let inner = &self.engine.inner;
        {
            let mut state = inner.state.lock();
            state.isolating = state.isolating.saturating_sub(1);
        }
        inner.batch_done.notify_waiters();
    }
}

struct Submission {
    id: Uuid,
    database: String,
    lines: Vec<String>,
    result: Result<(), SubmitError>,
}

/// Handle to a batching engine. Clones share the same buffer.
///
/// # Example
///
/// ```no_run
/// use influx_batcher::{Engine, InstallOptions};
///
/// # async fn run() -> Result<(), influx_batcher::Error> {
/// let engine = Engine::new();
/// engine.install(InstallOptions::default())?;
///
/// let mut m = engine.measurement("example", "requests");
/// m.set_tag("handler", "users");
/// m.set_field("duration", 0.012)?;
/// engine.add_measurement(m)?;
///
/// engine.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Engine<C: Connector = HttpConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for Engine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Engine<HttpConnector> {
    /// Engine submitting over HTTP.
    pub fn new() -> Self {
        Self::with_connector(HttpConnector)
    }
}

impl Default for Engine<HttpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> Engine<C> {
    /// Engine submitting through `connector`.
    pub fn with_connector(connector: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                state: Mutex::new(State {
                    lifecycle: Lifecycle::Uninstalled,
                    settings: Settings::default(),
                    runtime: None,
                    buffer: Buffer::new(),
                    sampler: Sampler::default(),
                    client: None,
                    client_dirty: true,
                    writing: false,
                    isolating: 0,
                    cycle_queued: false,
                    timer: None,
                    timer_seq: 0,
                    failure_streak: 0,
                    last_full_warning: None,
                    last_size_warning: None,
                }),
                batch_done: Notify::new(),
                counters: Counters::default(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Resolve configuration and start accepting measurements.
    ///
    /// Returns `Ok(false)` when the engine was already installed or when
    /// submission is disabled. A password taken from `INFLUXDB_PASSWORD`
    /// is masked in the process environment once read.
    pub fn install(&self, options: InstallOptions) -> Result<bool, Error> {
        if self.lifecycle() != Lifecycle::Uninstalled {
            tracing::warn!("InfluxDB batcher already installed");
            return Ok(false);
        }
        let resolved = Settings::from_env(&options);
        config::mask_env_password();
        self.install_settings(resolved?, options.runtime)
    }

    /// Install with already resolved settings.
    pub fn install_settings(
        &self,
        settings: Settings,
        runtime: Option<Handle>,
    ) -> Result<bool, Error> {
        settings.validate()?;
        let mut state = self.inner.state.lock();
        if state.lifecycle != Lifecycle::Uninstalled {
            tracing::warn!("InfluxDB batcher already installed");
            return Ok(false);
        }

        if !settings.enabled {
            tracing::info!("InfluxDB submission disabled, measurements will be discarded");
            state.settings = settings;
            state.lifecycle = Lifecycle::Disabled;
            return Ok(false);
        }

        let runtime = match runtime
            .or_else(|| state.runtime.clone())
            .or_else(|| Handle::try_current().ok())
        {
            Some(handle) => handle,
            None => return Err(ConfigError::NoRuntime.into()),
        };

        state.sampler.set_probability(settings.sample_probability)?;
        tracing::info!(
            "InfluxDB batcher installed: url={} trigger_size={} timeout={:?} max_batch_size={}",
            settings.url,
            settings.trigger_size,
            settings.timeout_interval,
            settings.max_batch_size
        );
        state.settings = settings;
        state.runtime = Some(runtime);
        state.client_dirty = true;
        state.lifecycle = Lifecycle::Installed;
        Ok(true)
    }

    /// Stop accepting measurements and drain the buffer.
    ///
    /// A second call only logs a warning.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            match state.lifecycle {
                Lifecycle::Stopping | Lifecycle::Stopped => {
                    tracing::warn!("InfluxDB batcher shutdown already requested");
                    return;
                }
                Lifecycle::Uninstalled | Lifecycle::Disabled => {
                    state.lifecycle = Lifecycle::Stopped;
                    return;
                }
                Lifecycle::Installed => {}
            }
            state.lifecycle = Lifecycle::Stopping;
            state.cancel_timer();
            tracing::info!(
                "Stopping InfluxDB batcher, {} measurements pending",
                state.buffer.len()
            );
        }

        self.flush().await;

        self.inner.state.lock().lifecycle = Lifecycle::Stopped;
        tracing::info!("InfluxDB batcher stopped");
    }

    /// Resolve once the buffer is empty and no rejected batch is still
    /// being resubmitted line by line.
    ///
    /// Waits for an in-flight cycle, then keeps issuing cycles until
    /// nothing is pending, including lines requeued by failed batches and
    /// lines admitted while draining. Cancelling a flush leaves any cycle
    /// it started running to completion.
    pub async fn flush(&self) {
        loop {
            let done = self.inner.batch_done.notified();
            tokio::pin!(done);
            done.as_mut().enable();

            let (writing, pending, isolating) = {
                let state = self.inner.state.lock();
                (state.writing, state.buffer.len(), state.isolating)
            };
            if writing || (pending == 0 && isolating > 0) {
                done.await;
                continue;
            }
            if pending == 0 {
                return;
            }

            match self.write_measurements().await {
                WriteOutcome::Written(report) if report.requeued > 0 => {
                    tokio::time::sleep(FLUSH_RETRY_DELAY).await;
                }
                WriteOutcome::Failed(_) => tokio::time::sleep(FLUSH_RETRY_DELAY).await,
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// New measurement seeded with the engine's base tags.
    pub fn measurement(&self, database: impl Into<String>, name: impl Into<String>) -> Measurement {
        let state = self.inner.state.lock();
        Measurement::with_base_tags(database, name, &state.settings.base_tags)
    }

    /// Encode and buffer a measurement.
    ///
    /// Validation failures are returned. Measurements refused because the
    /// engine is not accepting or the buffer is full are logged and dropped.
    pub fn add_measurement(&self, measurement: Measurement) -> Result<(), MeasurementError> {
        measurement.validate()?;
        let line = measurement.marshall();

        let mut state = self.inner.state.lock();
        match state.lifecycle {
            Lifecycle::Installed => {}
            Lifecycle::Disabled => {
                tracing::debug!(
                    "InfluxDB submission disabled, discarding {}",
                    measurement.name()
                );
                return Ok(());
            }
            other => {
                tracing::warn!(
                    "InfluxDB batcher is {:?}, discarding {}",
                    other,
                    measurement.name()
                );
                Counters::add(&self.inner.counters.rejected, 1);
                return Ok(());
            }
        }

        let pending = state.buffer.len();
        if pending > state.settings.max_buffer_size {
            Counters::add(&self.inner.counters.rejected, 1);
            let cooldown = state.settings.warn_cooldown;
            if throttle(&mut state.last_full_warning, cooldown) {
                tracing::warn!(
                    "InfluxDB buffer full ({} pending), discarding new measurements",
                    pending
                );
            }
            return Ok(());
        }

        state.buffer.push(measurement.database(), line);
        Counters::add(&self.inner.counters.admitted, 1);

        let pending = state.buffer.len();
        if pending > state.settings.warn_threshold {
            let cooldown = state.settings.warn_cooldown;
            if throttle(&mut state.last_size_warning, cooldown) {
                tracing::warn!("InfluxDB measurement buffer has {} entries", pending);
            }
        }

        if pending >= state.settings.trigger_size {
            state.cancel_timer();
            if !state.writing {
                self.spawn_cycle(&mut state);
            }
        } else if state.timer.is_none() && !state.writing && !state.cycle_queued {
            let delay = state.settings.timeout_interval;
            self.arm_timer(&mut state, delay);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Run one write cycle.
    ///
    /// Slices up to `max_batch_size` of the oldest lines from every
    /// database, submits one request per database and reconciles every
    /// result before returning. The cycle runs on the engine runtime, so
    /// dropping the returned future does not abandon it.
    pub async fn write_measurements(&self) -> WriteOutcome {
        let cycle = match self.begin_cycle() {
            Ok(cycle) => cycle,
            Err(outcome) => return outcome,
        };

        let runtime = cycle.runtime.clone();
        let mut guard = CycleGuard {
            engine: self.clone(),
            finished: false,
        };
        let task = runtime.spawn(async move {
            let report = guard.engine.run_cycle(cycle).await;
            guard.engine.finish_cycle(&report);
            guard.finished = true;
            report
        });

        match task.await {
            Ok(report) => WriteOutcome::Written(report),
            Err(e) => {
                tracing::error!("InfluxDB write cycle aborted: {}", e);
                WriteOutcome::Failed(e.to_string())
            }
        }
    }

    fn begin_cycle(&self) -> Result<Cycle<C::Transport>, WriteOutcome> {
        let mut state = self.inner.state.lock();
        state.cycle_queued = false;

        if state.writing {
            tracing::debug!("Currently writing measurements, skipping write");
            return Err(WriteOutcome::Skipped);
        }
        if state.buffer.is_empty() {
            return Err(WriteOutcome::Idle);
        }
        let Some(runtime) = state.runtime.clone() else {
            return Err(WriteOutcome::Failed(ConfigError::NoRuntime.to_string()));
        };
        state.cancel_timer();

        let max = state.settings.max_batch_size;
        if !state.sampler.admit() {
            let discarded: usize = state
                .buffer
                .take_batches(max)
                .iter()
                .map(|(_, lines)| lines.len())
                .sum();
            Counters::add(&self.inner.counters.sampled_out, discarded);
            tracing::debug!("Sampler discarded {} measurements", discarded);
            self.reschedule(&mut state, false);
            return Err(WriteOutcome::Discarded(discarded));
        }

        let client = match self.client(&mut state) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Cannot create InfluxDB client: {}", e);
                self.reschedule(&mut state, true);
                return Err(WriteOutcome::Failed(e.to_string()));
            }
        };

        state.writing = true;
        let batches = state.buffer.take_batches(max);
        Ok(Cycle {
            client,
            batches,
            runtime,
        })
    }

    async fn run_cycle(&self, cycle: Cycle<C::Transport>) -> CycleReport {
        let mut report = CycleReport {
            batches: cycle.batches.len(),
            ..Default::default()
        };

        let mut submissions = JoinSet::new();
        for (database, lines) in cycle.batches {
            let id = Uuid::new_v4();
            let client = Arc::clone(&cycle.client);
            tracing::debug!(
                "Submitting batch {} to {} ({} measurements)",
                id,
                database,
                lines.len()
            );
            submissions.spawn(async move {
                let result = client.submit(&database, &lines).await;
                Submission {
                    id,
                    database,
                    lines,
                    result,
                }
            });
        }

        while let Some(joined) = submissions.join_next().await {
            match joined {
                Ok(submission) => {
                    self.reconcile(submission, &cycle.client, &cycle.runtime, &mut report)
                }
                Err(e) => tracing::error!("InfluxDB submission task failed: {}", e),
            }
        }
        report
    }

    fn reconcile(
        &self,
        submission: Submission,
        client: &Arc<Client<C::Transport>>,
        runtime: &Handle,
        report: &mut CycleReport,
    ) {
        let Submission {
            id,
            database,
            lines,
            result,
        } = submission;
        let counters = &self.inner.counters;
        let count = lines.len();

        match result {
            Ok(()) => {
                report.delivered += count;
                Counters::add(&counters.delivered, count);
                tracing::debug!("Batch {} to {} delivered", id, database);
            }
            Err(SubmitError::BadRequest { body }) => {
                tracing::warn!(
                    "Batch {} to {} rejected ({}), retrying {} measurements individually",
                    id,
                    database,
                    body,
                    count
                );
                report.isolated += count;
                self.spawn_isolation(runtime, Arc::clone(client), id, database, lines);
            }
            Err(err) if err.is_transient() => {
                tracing::info!(
                    "Requeueing {} {} measurements from batch {}: {}",
                    count,
                    database,
                    id,
                    err
                );
                report.requeued += count;
                Counters::add(&counters.requeued, count);
                self.inner.state.lock().buffer.requeue_front(&database, lines);
            }
            Err(err) => {
                tracing::error!(
                    "Error submitting {} batch {} to InfluxDB, dropping {} measurements: {}",
                    database,
                    id,
                    count,
                    err
                );
                report.dropped_unclassified += count;
                Counters::add(&counters.dropped_unclassified, count);
            }
        }
    }

    /// Hand a rejected batch to its own task so dispatch for every
    /// database can continue. `flush` waits until it is done.
    fn spawn_isolation(
        &self,
        runtime: &Handle,
        client: Arc<Client<C::Transport>>,
        batch: Uuid,
        database: String,
        lines: Vec<String>,
    ) {
        self.inner.state.lock().isolating += 1;
        let guard = IsolationGuard {
            engine: self.clone(),
        };
        runtime.spawn(async move {
            guard.engine.isolate(&client, batch, &database, lines).await;
            drop(guard);
        });
    }

    /// Resubmit a rejected batch one line at a time.
    ///
    /// A line answered with 400 is dropped. Any other failure sends it to
    /// the back of the worklist after a short pause.
    async fn isolate(
        &self,
        client: &Client<C::Transport>,
        batch: Uuid,
        database: &str,
        lines: Vec<String>,
    ) {
        let counters = &self.inner.counters;
        let cap = self.inner.state.lock().settings.timeout_interval;
        let mut worklist: VecDeque<String> = lines.into();
        let mut streak = 0u32;

        while let Some(line) = worklist.pop_front() {
            tracing::debug!(
                "Processing batch {} for {} by measurement, {} left",
                batch,
                database,
                worklist.len()
            );
            match client.submit(database, std::slice::from_ref(&line)).await {
                Ok(()) => {
                    streak = 0;
                    Counters::add(&counters.delivered, 1);
                }
                Err(SubmitError::BadRequest { body }) => {
                    streak = 0;
                    tracing::error!(
                        "Error writing {} measurement from batch {} to InfluxDB: {}",
                        database,
                        batch,
                        body
                    );
                    tracing::info!("Bad {} measurement from batch {}: {}", database, batch, line);
                    Counters::add(&counters.dropped_invalid, 1);
                }
                Err(err) => {
                    streak += 1;
                    tracing::debug!(
                        "Error submitting individual {} measurement from batch {}: {}",
                        database,
                        batch,
                        err
                    );
                    worklist.push_back(line);
                    tokio::time::sleep(backoff(ISOLATION_RETRY_DELAY, streak, cap)).await;
                }
            }
        }
        tracing::info!("All {} measurements from batch {} processed", database, batch);
    }

    fn finish_cycle(&self, report: &CycleReport) {
        let mut state = self.inner.state.lock();
        state.writing = false;
        self.inner.batch_done.notify_waiters();
        tracing::debug!(
            "Write cycle done: {} batches, {} delivered, {} requeued, {} isolated, {} pending",
            report.batches,
            report.delivered,
            report.requeued,
            report.isolated,
            state.buffer.len()
        );
        self.reschedule(&mut state, report.requeued > 0);
    }

    /// Post-completion trigger evaluation.
    ///
    /// Only an installed engine reschedules itself; `flush` drives the
    /// cycles while stopping.
    fn reschedule(&self, state: &mut State<C::Transport>, failed: bool) {
        if state.lifecycle != Lifecycle::Installed {
            return;
        }

        if failed {
            state.failure_streak = state.failure_streak.saturating_add(1);
            let delay = backoff(
                RETRY_BASE_DELAY,
                state.failure_streak,
                state.settings.timeout_interval,
            );
            tracing::debug!("Retrying requeued measurements in {:?}", delay);
            self.arm_timer(state, delay);
            return;
        }

        state.failure_streak = 0;
        let pending = state.buffer.len();
        if pending >= state.settings.trigger_size {
            self.spawn_cycle(state);
        } else if pending > 0 {
            let delay = state.settings.timeout_interval;
            self.arm_timer(state, delay);
        }
    }

    fn spawn_cycle(&self, state: &mut State<C::Transport>) {
        if state.cycle_queued {
            return;
        }
        let Some(runtime) = state.runtime.as_ref() else {
            return;
        };
        state.cycle_queued = true;
        let engine = self.clone();
        runtime.spawn(async move {
            engine.write_measurements().await;
        });
    }

    fn arm_timer(&self, state: &mut State<C::Transport>, delay: Duration) {
        state.cancel_timer();
        let Some(runtime) = state.runtime.as_ref() else {
            return;
        };
        state.timer_seq += 1;
        let id = state.timer_seq;
        let engine = self.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            engine.on_timeout(id);
        });
        state.timer = Some(Timer { id, handle });
    }

    fn on_timeout(&self, id: u64) {
        let mut state = self.inner.state.lock();
        if state.timer.as_ref().map(|t| t.id) != Some(id) {
            return;
        }
        state.timer = None;
        if state.lifecycle != Lifecycle::Installed || state.buffer.is_empty() {
            return;
        }
        tracing::debug!(
            "Idle timeout expired with {} measurements pending",
            state.buffer.len()
        );
        self.spawn_cycle(&mut state);
    }

    fn client(
        &self,
        state: &mut State<C::Transport>,
    ) -> Result<Arc<Client<C::Transport>>, ConfigError> {
        if let (Some(client), false) = (&state.client, state.client_dirty) {
            return Ok(Arc::clone(client));
        }
        let settings = state.client_settings();
        let transport = self.inner.connector.connect(&settings)?;
        let client = Arc::new(Client::new(transport, settings.max_clients));
        tracing::debug!(
            "Created InfluxDB client for {} (max_clients={})",
            settings.url,
            settings.max_clients
        );
        state.client = Some(Arc::clone(&client));
        state.client_dirty = false;
        Ok(client)
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn set_base_url(&self, url: impl Into<String>) {
        let mut state = self.inner.state.lock();
        state.settings.url = url.into();
        state.client_dirty = true;
    }

    pub fn set_auth_credentials(&self, username: impl Into<String>, password: impl Into<String>) {
        let mut state = self.inner.state.lock();
        state.settings.credentials = Credentials::new(username, password);
        state.client_dirty = true;
    }

    pub fn set_max_batch_size(&self, size: usize) -> Result<(), ConfigError> {
        nonzero("max_batch_size", size)?;
        self.inner.state.lock().settings.max_batch_size = size;
        Ok(())
    }

    pub fn set_max_buffer_size(&self, size: usize) -> Result<(), ConfigError> {
        nonzero("max_buffer_size", size)?;
        self.inner.state.lock().settings.max_buffer_size = size;
        Ok(())
    }

    pub fn set_max_clients(&self, limit: usize) -> Result<(), ConfigError> {
        nonzero("max_clients", limit)?;
        let mut state = self.inner.state.lock();
        state.settings.max_clients = limit;
        state.client_dirty = true;
        Ok(())
    }

    pub fn set_trigger_size(&self, size: usize) -> Result<(), ConfigError> {
        nonzero("trigger_size", size)?;
        self.inner.state.lock().settings.trigger_size = size;
        Ok(())
    }

    /// Idle timeout. Takes effect the next time the timer is armed.
    pub fn set_timeout(&self, interval: Duration) -> Result<(), ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::Zero("timeout_interval"));
        }
        self.inner.state.lock().settings.timeout_interval = interval;
        Ok(())
    }

    pub fn set_sample_probability(&self, probability: f64) -> Result<(), ConfigError> {
        let mut state = self.inner.state.lock();
        state.sampler.set_probability(probability)?;
        state.settings.sample_probability = probability;
        Ok(())
    }

    /// Runtime used for timers and write cycles.
    pub fn set_runtime(&self, runtime: Handle) {
        self.inner.state.lock().runtime = Some(runtime);
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.state.lock().lifecycle
    }

    pub fn pending(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    pub fn is_writing(&self) -> bool {
        self.inner.state.lock().writing
    }

    pub fn settings(&self) -> Settings {
        self.inner.state.lock().settings.clone()
    }

    pub fn base_tags(&self) -> BTreeMap<String, String> {
        self.inner.state.lock().settings.base_tags.clone()
    }

    pub fn stats(&self) -> Stats {
        let pending = self.pending();
        self.inner.counters.snapshot(pending)
    }
}

/// `true` when no warning was emitted within `cooldown`.
fn throttle(last: &mut Option<Instant>, cooldown: Duration) -> bool {
    let now = Instant::now();
    match last {
        Some(at) if now.duration_since(*at) < cooldown => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}

/// Doubling delay starting at `base`, capped at `cap`.
fn backoff(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift).min(cap.max(base))
}
