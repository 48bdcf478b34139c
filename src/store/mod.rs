//! Store abstraction: client trait, error taxonomy, and builder factory.

pub mod config;
#[cfg(any(test, feature = "store-mock"))]
pub mod mock;
#[cfg(feature = "store-mongo")]
pub mod mongo;

use crate::document::Document;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Engine {
    Mongo,
    #[cfg(any(test, feature = "store-mock"))]
    Mock,
}

#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    pub params: BTreeMap<String, String>,
}

impl ConnectOptions {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true" | "1" | "yes"))
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum StoreError {
    #[error("throttled (code {code}): {message}")]
    Throttled { code: i32, message: String },
    #[error("transient connection failure: {0}")]
    Transient(String),
    #[error("command failed (code {code}): {message}")]
    Command { code: i32, message: String },
    #[error("connect: {0}")]
    Connect(String),
    #[error("other: {0}")]
    Other(String),
}

/// How a worker must react to a failed submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Throttle,
    Transient,
    Fatal,
}

impl StoreError {
    /// A `Command` error carrying `throttle_code` counts as throttling too;
    /// some backends can only surface the raw server code.
    pub fn classify(&self, throttle_code: i32) -> ErrorClass {
        match self {
            Self::Throttled { .. } => ErrorClass::Throttle,
            Self::Command { code, .. } if *code == throttle_code => ErrorClass::Throttle,
            Self::Transient(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }
}

#[async_trait::async_trait]
pub trait StoreClient: Send + Sync {
    /// Unordered insert of the whole batch. `Ok` means acknowledged.
    async fn submit_batch(&self, docs: &[Document]) -> Result<(), StoreError>;
    /// Request charge of the most recent write, if the store reports one.
    async fn last_operation_cost(&self) -> Result<Option<f64>, StoreError>;
    /// One-shot collection setup run before any worker starts.
    async fn prepare(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn shutdown(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct StoreBuilder;

impl StoreBuilder {
    pub async fn connect(
        engine: Engine,
        opts: ConnectOptions,
    ) -> Result<Arc<dyn StoreClient>, StoreError> {
        match engine {
            Engine::Mongo => {
                #[cfg(feature = "store-mongo")]
                {
                    crate::store::mongo::connect(opts).await
                }
                #[cfg(not(feature = "store-mongo"))]
                {
                    let _ = opts;
                    Err(StoreError::Connect("mongo feature disabled".into()))
                }
            }
            #[cfg(any(test, feature = "store-mock"))]
            Engine::Mock => Ok(Arc::new(crate::store::mock::MockStore::from_options(&opts))),
        }
    }
}
