use crate::store::{ErrorClass, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server code for "request rate is large".
pub const DEFAULT_THROTTLE_CODE: i32 = 16500;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Multiplied by the current backoff factor after each throttle.
    pub throttle_interval_ms: u64,
    /// Fixed pause after a refused or reset connection.
    pub transient_delay_ms: u64,
    pub throttle_code: i32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            throttle_interval_ms: 1000,
            transient_delay_ms: 5000,
            throttle_code: DEFAULT_THROTTLE_CODE,
        }
    }
}

impl BackoffPolicy {
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    pub fn transient_delay(&self) -> Duration {
        Duration::from_millis(self.transient_delay_ms)
    }
}

#[derive(Debug)]
pub enum Decision {
    Success,
    RetryAfter { delay: Duration, cause: ErrorClass },
    Fatal(StoreError),
}

/// Per-worker backoff: additive increase on throttling, decay by one toward a
/// floor of 1 on success. There is no ceiling.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    factor: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, factor: 0 }
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }

    pub fn observe(&mut self, result: Result<(), StoreError>) -> Decision {
        let err = match result {
            Ok(()) => {
                if self.factor > 1 {
                    self.factor -= 1;
                }
                return Decision::Success;
            }
            Err(e) => e,
        };
        match err.classify(self.policy.throttle_code) {
            ErrorClass::Throttle => {
                self.factor = self.factor.saturating_add(1);
                Decision::RetryAfter {
                    delay: self.policy.throttle_interval().saturating_mul(self.factor),
                    cause: ErrorClass::Throttle,
                }
            }
            ErrorClass::Transient => Decision::RetryAfter {
                delay: self.policy.transient_delay(),
                cause: ErrorClass::Transient,
            },
            ErrorClass::Fatal => Decision::Fatal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttled() -> Result<(), StoreError> {
        Err(StoreError::Throttled {
            code: 16500,
            message: "rate".into(),
        })
    }

    #[test]
    fn throttle_grows_linearly_and_decays_to_one() {
        let mut b = Backoff::new(BackoffPolicy::default());
        let mut sleeps = Vec::new();
        for _ in 0..3 {
            match b.observe(throttled()) {
                Decision::RetryAfter {
                    delay,
                    cause: ErrorClass::Throttle,
                } => sleeps.push(delay.as_millis()),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(sleeps, vec![1000, 2000, 3000]);
        assert_eq!(b.factor(), 3);

        assert!(matches!(b.observe(Ok(())), Decision::Success));
        assert_eq!(b.factor(), 2);
        b.observe(Ok(()));
        assert_eq!(b.factor(), 1);
        b.observe(Ok(()));
        b.observe(Ok(()));
        assert_eq!(b.factor(), 1);
    }

    #[test]
    fn success_without_throttle_keeps_zero() {
        let mut b = Backoff::new(BackoffPolicy::default());
        for _ in 0..10 {
            b.observe(Ok(()));
        }
        assert_eq!(b.factor(), 0);
    }

    #[test]
    fn transient_uses_fixed_delay_and_leaves_factor() {
        let mut b = Backoff::new(BackoffPolicy::default());
        b.observe(throttled());
        let d = b.observe(Err(StoreError::Transient("refused".into())));
        assert!(matches!(
            d,
            Decision::RetryAfter {
                delay,
                cause: ErrorClass::Transient
            } if delay == Duration::from_secs(5)
        ));
        assert_eq!(b.factor(), 1);
    }

    #[test]
    fn raw_command_with_throttle_code_is_throttle() {
        let mut b = Backoff::new(BackoffPolicy {
            throttle_interval_ms: 10,
            ..Default::default()
        });
        let d = b.observe(Err(StoreError::Command {
            code: 16500,
            message: "Request rate is large".into(),
        }));
        assert!(matches!(
            d,
            Decision::RetryAfter {
                delay,
                cause: ErrorClass::Throttle
            } if delay == Duration::from_millis(10)
        ));
    }

    #[test]
    fn other_errors_are_fatal() {
        let mut b = Backoff::new(BackoffPolicy::default());
        let d = b.observe(Err(StoreError::Command {
            code: 13,
            message: "Unauthorized".into(),
        }));
        assert!(matches!(d, Decision::Fatal(StoreError::Command { code: 13, .. })));
        assert_eq!(b.factor(), 0);
    }

    #[test]
    fn factor_never_drops_below_one_after_throttle() {
        let mut b = Backoff::new(BackoffPolicy::default());
        let pattern = [true, false, false, true, true, false, false, false, false];
        let mut seen_throttle = false;
        for throttle in pattern {
            let before = b.factor();
            if throttle {
                b.observe(throttled());
                seen_throttle = true;
            } else {
                b.observe(Ok(()));
                assert!(b.factor() <= before);
            }
            if seen_throttle {
                assert!(b.factor() >= 1);
            }
        }
    }
}
