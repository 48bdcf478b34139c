//! Benchmark configuration: YAML file, environment fallbacks, validation.

use crate::backoff::BackoffPolicy;
use crate::store::config::parse_engine;
use crate::store::{ConnectOptions, Engine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PASSWORD_ENV: &str = "DOCDB_BENCH_PASSWORD";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("unknown store engine '{0}'")]
    UnknownEngine(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub workers: usize,
    pub documents: u64,
    pub batch_size: u64,
    pub partition_key: String,
    pub template: Option<PathBuf>,
    pub cost_refresh_batches: u64,
    pub store: StoreConfig,
    pub backoff: BackoffPolicy,
    pub monitor: MonitorConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub engine: String,
    pub endpoint: String,
    pub port: u16,
    pub database: String,
    pub collection: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub tls: bool,
    pub partitioned: bool,
    pub pre_provisioned: bool,
    /// Extra backend-specific connect parameters.
    pub params: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tick_ms: u64,
    pub csv: Option<PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            documents: 10_000,
            batch_size: 1,
            partition_key: "pk".into(),
            template: None,
            cost_refresh_batches: 0,
            store: StoreConfig::default(),
            backoff: BackoffPolicy::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            engine: "mock".into(),
            endpoint: "127.0.0.1".into(),
            port: 10255,
            database: "bench".into(),
            collection: "docs".into(),
            username: None,
            password: None,
            tls: true,
            partitioned: false,
            pre_provisioned: false,
            params: BTreeMap::new(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            csv: None,
        }
    }
}

impl BenchConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Fill the password from the environment when nothing else set it.
    pub fn apply_env(&mut self) {
        if self.store.password.is_none() {
            if let Ok(pw) = std::env::var(PASSWORD_ENV) {
                self.store.password = Some(pw);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.documents == 0 {
            return Err(ConfigError::Invalid("documents must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.partition_key.trim().is_empty() {
            return Err(ConfigError::Invalid("partition_key must not be empty".into()));
        }
        if self.monitor.tick_ms == 0 {
            return Err(ConfigError::Invalid("monitor.tick_ms must be at least 1".into()));
        }
        self.engine()?;
        Ok(())
    }

    pub fn engine(&self) -> Result<Engine, ConfigError> {
        parse_engine(&self.store.engine)
            .ok_or_else(|| ConfigError::UnknownEngine(self.store.engine.clone()))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.monitor.tick_ms)
    }

    /// Typed store fields flattened into backend params; explicit `params` win.
    pub fn connect_options(&self) -> ConnectOptions {
        let s = &self.store;
        let mut opts = ConnectOptions::default();
        let mut set = |k: &str, v: String| {
            opts.params.insert(k.to_string(), v);
        };
        set("endpoint", s.endpoint.clone());
        set("port", s.port.to_string());
        set("database", s.database.clone());
        set("collection", s.collection.clone());
        set("tls", s.tls.to_string());
        set("partitioned", s.partitioned.to_string());
        set("pre_provisioned", s.pre_provisioned.to_string());
        set("partition_key", self.partition_key.clone());
        set("max_pool_size", self.workers.to_string());
        if let Some(u) = &s.username {
            set("username", u.clone());
        }
        if let Some(p) = &s.password {
            set("password", p.clone());
        }
        opts.params
            .extend(s.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        opts
    }

    /// Human-readable summary printed before the run; never includes secrets.
    pub fn banner(&self) -> Vec<String> {
        let rule = "-".repeat(69);
        vec![
            "Summary:".to_string(),
            rule.clone(),
            format!("Engine: {}", self.store.engine),
            format!("Endpoint: {}:{}", self.store.endpoint, self.store.port),
            format!("Collection: {}.{}", self.store.database, self.store.collection),
            format!(
                "Document Template: {}",
                self.template
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(built-in)".into())
            ),
            format!("Documents: {}", self.documents),
            format!("Degree of parallelism: {}", self.workers),
            format!("Batchsize: {}", self.batch_size),
            rule,
        ]
    }
}
