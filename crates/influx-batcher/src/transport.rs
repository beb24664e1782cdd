// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP submission to the InfluxDB write endpoint.
//!
//! Wire format:
//! ```text
//! POST <url>?db=<database>&precision=ms
//!
//! <line>\n<line>\n...
//! ```
//!
//! 2xx is success, 400 marks the payload as malformed, 5xx and transport
//! failures are transient. The [`Connector`]/[`Transport`] pair is the
//! seam the engine submits through, so tests can script responses without
//! a network.

use crate::config::Credentials;
use crate::error::{ConfigError, SubmitError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;

/// User agent sent with every write.
pub const USER_AGENT: &str = concat!("influx-batcher/v", env!("CARGO_PKG_VERSION"));

/// Settings a client is built from. A change to any of them marks the
/// engine's client dirty.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub url: String,
    pub credentials: Credentials,
    pub max_clients: usize,
    pub http_timeout: Duration,
}

/// Submits one newline-joined batch to one database.
pub trait Transport: Send + Sync + 'static {
    fn submit(
        &self,
        database: &str,
        body: String,
    ) -> impl Future<Output = Result<(), SubmitError>> + Send;
}

/// Builds transports from the current client settings.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(&self, settings: &ClientSettings) -> Result<Self::Transport, ConfigError>;
}

/// Shared client: a transport plus the `max_clients` admission gate.
pub struct Client<T> {
    transport: T,
    permits: Semaphore,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, max_clients: usize) -> Self {
        Self {
            transport,
            permits: Semaphore::new(max_clients.max(1)),
        }
    }

    /// Submit `lines` once a concurrency slot is free.
    pub async fn submit(&self, database: &str, lines: &[String]) -> Result<(), SubmitError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SubmitError::Transport("client closed".to_string()))?;
        self.transport.submit(database, lines.join("\n")).await
    }
}

/// [`Connector`] producing `reqwest` based transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    type Transport = HttpTransport;

    fn connect(&self, settings: &ClientSettings) -> Result<HttpTransport, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(settings.max_clients)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(HttpTransport {
            client,
            url: settings.url.clone(),
            credentials: settings.credentials.clone(),
        })
    }
}

/// InfluxDB 1.x `/write` endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    credentials: Credentials,
}

impl Transport for HttpTransport {
    async fn submit(&self, database: &str, body: String) -> Result<(), SubmitError> {
        let mut request = self
            .client
            .post(&self.url)
            .query(&[("db", database), ("precision", "ms")])
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        if let Some((user, password)) = self.credentials.basic_auth() {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        match SubmitError::from_status(status.as_u16(), body) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Gate {
        active: AtomicUsize,
        peak: AtomicUsize,
        bodies: Mutex<Vec<(String, String)>>,
    }

    impl Transport for Arc<Gate> {
        async fn submit(&self, database: &str, body: String) -> Result<(), SubmitError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.bodies.lock().push((database.to_string(), body));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert!(USER_AGENT.starts_with("influx-batcher/v"));
        assert!(USER_AGENT.ends_with(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_bounds_concurrency() {
        let gate = Arc::new(Gate {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
        });
        let client = Arc::new(Client::new(gate.clone(), 2));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..6 {
            let client = client.clone();
            tasks.spawn(async move {
                let lines = vec![format!("m v={}i 1", i), format!("m v={}i 2", i)];
                client.submit(&format!("db{}", i), &lines).await
            });
        }
        while let Some(result) = tasks.join_next().await {
            assert!(result.unwrap().is_ok());
        }

        assert_eq!(gate.peak.load(Ordering::SeqCst), 2);
        let bodies = gate.bodies.lock();
        assert_eq!(bodies.len(), 6);
        assert!(bodies.iter().all(|(_, body)| body.lines().count() == 2));
    }

    #[test]
    fn test_http_connector_builds_transport() {
        let settings = ClientSettings {
            url: "http://localhost:8086/write".to_string(),
            credentials: Credentials::new("user", "pass"),
            max_clients: 4,
            http_timeout: Duration::from_secs(5),
        };
        let transport = HttpConnector.connect(&settings).expect("connect");
        assert_eq!(transport.url, settings.url);
        assert_eq!(transport.credentials.basic_auth(), Some(("user", "pass")));
    }
}
