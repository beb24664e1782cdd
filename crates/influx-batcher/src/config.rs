// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine configuration.
//!
//! Every setting is resolved in the same order: an explicit value in
//! [`InstallOptions`], then the process environment, then the built-in
//! default.
//!
//! # Configuration File
//!
//! ```yaml
//! url: "http://influx.example.com:8086/write"
//! username: "metrics"
//! timeout_interval_ms: 5000
//! trigger_size: 1000
//! base_tags:
//!   service: "billing"
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_ENABLED: &str = "INFLUXDB_ENABLED";
pub const ENV_URL: &str = "INFLUXDB_URL";
pub const ENV_SCHEME: &str = "INFLUXDB_SCHEME";
pub const ENV_HOST: &str = "INFLUXDB_HOST";
pub const ENV_PORT: &str = "INFLUXDB_PORT";
pub const ENV_USER: &str = "INFLUXDB_USER";
pub const ENV_PASSWORD: &str = "INFLUXDB_PASSWORD";
pub const ENV_INTERVAL: &str = "INFLUXDB_INTERVAL";
pub const ENV_MAX_BATCH_SIZE: &str = "INFLUXDB_MAX_BATCH_SIZE";
pub const ENV_MAX_BUFFER_SIZE: &str = "INFLUXDB_MAX_BUFFER_SIZE";
pub const ENV_MAX_CLIENTS: &str = "INFLUXDB_MAX_CLIENTS";
pub const ENV_SAMPLE_PROBABILITY: &str = "INFLUXDB_SAMPLE_PROBABILITY";
pub const ENV_TRIGGER_SIZE: &str = "INFLUXDB_TRIGGER_SIZE";
pub const ENV_TAG_HOSTNAME: &str = "INFLUXDB_TAG_HOSTNAME";
pub const ENV_ENVIRONMENT: &str = "ENVIRONMENT";

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8086;
pub const DEFAULT_TIMEOUT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 25_000;
pub const DEFAULT_MAX_CLIENTS: usize = 10;
pub const DEFAULT_SAMPLE_PROBABILITY: f64 = 1.0;
pub const DEFAULT_TRIGGER_SIZE: usize = 60_000;
pub const DEFAULT_WARN_THRESHOLD: usize = 15_000;
pub const DEFAULT_WARN_COOLDOWN: Duration = Duration::from_secs(60);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Explicit settings passed to [`Engine::install`](crate::Engine::install).
///
/// `None` means "take it from the environment, or use the default".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallOptions {
    pub enabled: Option<bool>,
    /// Full write endpoint, e.g. `http://localhost:8086/write`.
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Idle timeout before a non-empty buffer is written.
    pub timeout_interval_ms: Option<u64>,
    pub max_batch_size: Option<usize>,
    pub max_buffer_size: Option<usize>,
    pub max_clients: Option<usize>,
    pub sample_probability: Option<f64>,
    pub trigger_size: Option<usize>,
    pub warn_threshold: Option<usize>,
    pub http_timeout_ms: Option<u64>,
    /// Add a `hostname` base tag (default `true`).
    pub tag_hostname: Option<bool>,
    /// Tags merged over the `hostname` and `environment` defaults.
    pub base_tags: BTreeMap<String, String>,
    /// Runtime used for timers and submissions. Defaults to the runtime
    /// `install` is called from.
    #[serde(skip)]
    pub runtime: Option<tokio::runtime::Handle>,
}

impl InstallOptions {
    /// Parse options from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let options: InstallOptions = serde_yaml::from_str(yaml)?;
        Ok(options)
    }

    /// Parse options from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// HTTP basic-auth credentials.
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Username and password, only when both are set.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.as_str(), pass.as_str()))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}

/// Fully resolved engine settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub enabled: bool,
    pub url: String,
    pub credentials: Credentials,
    pub timeout_interval: Duration,
    pub max_batch_size: usize,
    pub max_buffer_size: usize,
    pub max_clients: usize,
    pub sample_probability: f64,
    pub trigger_size: usize,
    pub warn_threshold: usize,
    pub warn_cooldown: Duration,
    pub http_timeout: Duration,
    pub base_tags: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_url(DEFAULT_SCHEME, DEFAULT_HOST, &DEFAULT_PORT.to_string()),
            credentials: Credentials::default(),
            timeout_interval: DEFAULT_TIMEOUT_INTERVAL,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_clients: DEFAULT_MAX_CLIENTS,
            sample_probability: DEFAULT_SAMPLE_PROBABILITY,
            trigger_size: DEFAULT_TRIGGER_SIZE,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            warn_cooldown: DEFAULT_WARN_COOLDOWN,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            base_tags: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Resolve settings from explicit options and the process environment.
    pub fn from_env(options: &InstallOptions) -> Result<Self, ConfigError> {
        Self::resolve(options, |name| std::env::var(name).ok())
    }

    /// Resolve settings from explicit options and an environment lookup.
    pub fn resolve<E>(options: &InstallOptions, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let url = match options.url.clone().or_else(|| env(ENV_URL)) {
            Some(url) => url,
            None => default_url(
                &env(ENV_SCHEME).unwrap_or_else(|| DEFAULT_SCHEME.to_string()),
                &env(ENV_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string()),
                &env(ENV_PORT).unwrap_or_else(|| DEFAULT_PORT.to_string()),
            ),
        };

        let credentials = Credentials {
            username: options.username.clone().or_else(|| env(ENV_USER)),
            password: options.password.clone().or_else(|| env(ENV_PASSWORD)),
        };

        let timeout_ms = pick(options.timeout_interval_ms, &env, ENV_INTERVAL)?;

        let mut base_tags = BTreeMap::new();
        let tag_hostname = match options.tag_hostname {
            Some(flag) => flag,
            None => parse_bool(&env, ENV_TAG_HOSTNAME)?.unwrap_or(true),
        };
        if tag_hostname {
            base_tags.insert("hostname".to_string(), hostname());
        }
        if let Some(environment) = env(ENV_ENVIRONMENT).filter(|e| !e.is_empty()) {
            base_tags.insert("environment".to_string(), environment);
        }
        base_tags.extend(options.base_tags.clone());

        let settings = Self {
            enabled: match options.enabled {
                Some(flag) => flag,
                None => parse_bool(&env, ENV_ENABLED)?.unwrap_or(true),
            },
            url,
            credentials,
            timeout_interval: timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TIMEOUT_INTERVAL),
            max_batch_size: pick(options.max_batch_size, &env, ENV_MAX_BATCH_SIZE)?
                .unwrap_or(DEFAULT_MAX_BATCH_SIZE),
            max_buffer_size: pick(options.max_buffer_size, &env, ENV_MAX_BUFFER_SIZE)?
                .unwrap_or(DEFAULT_MAX_BUFFER_SIZE),
            max_clients: pick(options.max_clients, &env, ENV_MAX_CLIENTS)?
                .unwrap_or(DEFAULT_MAX_CLIENTS),
            sample_probability: pick(options.sample_probability, &env, ENV_SAMPLE_PROBABILITY)?
                .unwrap_or(DEFAULT_SAMPLE_PROBABILITY),
            trigger_size: pick(options.trigger_size, &env, ENV_TRIGGER_SIZE)?
                .unwrap_or(DEFAULT_TRIGGER_SIZE),
            warn_threshold: options.warn_threshold.unwrap_or(DEFAULT_WARN_THRESHOLD),
            warn_cooldown: DEFAULT_WARN_COOLDOWN,
            http_timeout: options
                .http_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
            base_tags,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_sample_probability(self.sample_probability)?;
        nonzero("max_batch_size", self.max_batch_size)?;
        nonzero("max_clients", self.max_clients)?;
        nonzero("trigger_size", self.trigger_size)?;
        if self.timeout_interval.is_zero() {
            return Err(ConfigError::Zero("timeout_interval"));
        }
        Ok(())
    }
}

pub(crate) fn validate_sample_probability(p: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(ConfigError::SampleProbability(p))
    }
}

pub(crate) fn nonzero(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero(name))
    } else {
        Ok(())
    }
}

/// Overwrite a password taken from the environment so it cannot be read
/// back by anything else in the process.
pub fn mask_env_password() {
    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        if !password.is_empty() {
            std::env::set_var(ENV_PASSWORD, "X".repeat(password.chars().count()));
        }
    }
}

fn default_url(scheme: &str, host: &str, port: &str) -> String {
    format!("{}://{}:{}/write", scheme, host, port)
}

fn pick<T, E>(explicit: Option<T>, env: &E, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    E: Fn(&str) -> Option<String>,
{
    if explicit.is_some() {
        return Ok(explicit);
    }
    match env(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Environment {
                name: name.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

fn parse_bool<E>(env: &E, name: &str) -> Result<Option<bool>, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    match env(name) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::Environment {
                name: name.to_string(),
                value,
            }),
        },
        None => Ok(None),
    }
}

/// Local hostname, or `localhost` when it cannot be read.
pub fn hostname() -> String {
    #[cfg(unix)]
    {
        let mut buf = vec![0u8; 256];
        // SAFETY:
        // - buf is a valid, writable allocation of buf.len() bytes
        // - gethostname writes at most buf.len() bytes and does not retain the pointer
        let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
        if ret == 0 {
            let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            buf.truncate(len);
            if let Ok(name) = String::from_utf8(buf) {
                if !name.is_empty() {
                    return name;
                }
            }
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
