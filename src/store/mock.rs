//! In-process store for dry runs and tests. Faults can be scripted per call.
use crate::document::Document;
use crate::store::{ConnectOptions, StoreClient, StoreError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub const MOCK_THROTTLE_CODE: i32 = 16500;

/// Outcome forced onto a single `submit_batch` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    Ok,
    Throttle,
    Transient,
    Fatal,
}

/// Reply forced onto a single `last_operation_cost` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChargeReply {
    Value(f64),
    Missing,
    Fail,
}

pub struct MockStore {
    script: Mutex<VecDeque<Fault>>,
    throttle_every: Option<u64>,
    charge: Option<f64>,
    charge_script: Mutex<VecDeque<ChargeReply>>,
    latency: Option<Duration>,
    capture_key: Option<String>,
    captured: Mutex<Vec<String>>,
    calls: AtomicU64,
    acknowledged: AtomicU64,
    cost_queries: AtomicU64,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            throttle_every: None,
            charge: None,
            charge_script: Mutex::new(VecDeque::new()),
            latency: None,
            capture_key: None,
            captured: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
            acknowledged: AtomicU64::new(0),
            cost_queries: AtomicU64::new(0),
        }
    }

    /// Recognised params: `charge`, `throttle_every`, `latency_ms`.
    pub fn from_options(opts: &ConnectOptions) -> Self {
        let mut store = Self::new();
        store.charge = opts.get_parsed("charge");
        store.throttle_every = opts.get_parsed::<u64>("throttle_every").filter(|n| *n > 0);
        store.latency = opts.get_parsed::<u64>("latency_ms").map(Duration::from_millis);
        store
    }

    /// Faults consumed one per call, in order, before falling back to success.
    pub fn with_script(mut self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.script = Mutex::new(faults.into_iter().collect());
        self
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = Some(charge);
        self
    }

    /// Charge replies consumed one per query before falling back to `charge`.
    pub fn with_charge_script(mut self, replies: impl IntoIterator<Item = ChargeReply>) -> Self {
        self.charge_script = Mutex::new(replies.into_iter().collect());
        self
    }

    pub fn with_throttle_every(mut self, n: u64) -> Self {
        self.throttle_every = Some(n).filter(|n| *n > 0);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Remember the value of `field` for every acknowledged document.
    pub fn capturing(mut self, field: impl Into<String>) -> Self {
        self.capture_key = Some(field.into());
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn acknowledged(&self) -> u64 {
        self.acknowledged.load(Ordering::Relaxed)
    }

    pub fn cost_queries(&self) -> u64 {
        self.cost_queries.load(Ordering::Relaxed)
    }

    pub async fn captured_keys(&self) -> Vec<String> {
        self.captured.lock().await.clone()
    }

    async fn next_fault(&self, call: u64) -> Fault {
        if let Some(f) = self.script.lock().await.pop_front() {
            return f;
        }
        match self.throttle_every {
            Some(n) if call % n == 0 => Fault::Throttle,
            _ => Fault::Ok,
        }
    }
}

#[async_trait::async_trait]
impl StoreClient for MockStore {
    async fn submit_batch(&self, docs: &[Document]) -> Result<(), StoreError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
        match self.next_fault(call).await {
            Fault::Ok => {}
            Fault::Throttle => {
                return Err(StoreError::Throttled {
                    code: MOCK_THROTTLE_CODE,
                    message: "Request rate is large".into(),
                });
            }
            Fault::Transient => {
                return Err(StoreError::Transient("connection reset by peer".into()));
            }
            Fault::Fatal => {
                return Err(StoreError::Command {
                    code: 2,
                    message: "BadValue".into(),
                });
            }
        }
        if let Some(field) = &self.capture_key {
            let mut captured = self.captured.lock().await;
            captured.extend(
                docs.iter()
                    .filter_map(|d| d.get(field).and_then(|v| v.as_str()).map(str::to_string)),
            );
        }
        self.acknowledged.fetch_add(docs.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn last_operation_cost(&self) -> Result<Option<f64>, StoreError> {
        self.cost_queries.fetch_add(1, Ordering::Relaxed);
        match self.charge_script.lock().await.pop_front() {
            Some(ChargeReply::Value(ru)) => Ok(Some(ru)),
            Some(ChargeReply::Missing) => Ok(None),
            Some(ChargeReply::Fail) => Err(StoreError::Transient("statistics unavailable".into())),
            None => Ok(self.charge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(pk: &str) -> Document {
        json!({ "pk": pk }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn script_then_success() {
        let store =
            MockStore::new().with_script([Fault::Throttle, Fault::Transient, Fault::Fatal]);
        assert!(matches!(
            store.submit_batch(&[doc("a")]).await,
            Err(StoreError::Throttled { code: 16500, .. })
        ));
        assert!(matches!(
            store.submit_batch(&[doc("a")]).await,
            Err(StoreError::Transient(_))
        ));
        assert!(matches!(
            store.submit_batch(&[doc("a")]).await,
            Err(StoreError::Command { code: 2, .. })
        ));
        store.submit_batch(&[doc("a"), doc("b")]).await.unwrap();
        assert_eq!(store.calls(), 4);
        assert_eq!(store.acknowledged(), 2);
    }

    #[tokio::test]
    async fn periodic_throttle_and_capture() {
        let store = MockStore::new().with_throttle_every(2).capturing("pk");
        store.submit_batch(&[doc("x")]).await.unwrap();
        assert!(store.submit_batch(&[doc("y")]).await.is_err());
        store.submit_batch(&[doc("z")]).await.unwrap();
        assert_eq!(store.captured_keys().await, vec!["x", "z"]);
    }

    #[tokio::test]
    async fn charge_script_then_fixed_charge() {
        let store = MockStore::new()
            .with_charge(1.0)
            .with_charge_script([ChargeReply::Fail, ChargeReply::Missing, ChargeReply::Value(3.5)]);
        assert!(store.last_operation_cost().await.is_err());
        assert_eq!(store.last_operation_cost().await.unwrap(), None);
        assert_eq!(store.last_operation_cost().await.unwrap(), Some(3.5));
        assert_eq!(store.last_operation_cost().await.unwrap(), Some(1.0));
        assert_eq!(store.cost_queries(), 4);
    }

    #[tokio::test]
    async fn options_are_parsed() {
        let mut opts = ConnectOptions::default();
        opts.params.insert("charge".into(), "7.25".into());
        opts.params.insert("throttle_every".into(), "0".into());
        let store = MockStore::from_options(&opts);
        assert_eq!(store.last_operation_cost().await.unwrap(), Some(7.25));
        assert!(store.throttle_every.is_none());
    }
}
