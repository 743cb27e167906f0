// Circuit Breaker for storage-backed service calls
//
// Count-based sliding window with half-open trial calls.
//
// States:
// - Closed: calls pass through, outcomes recorded in the window
// - Open: calls rejected immediately until the cooldown elapses
// - HalfOpen: a fixed number of trial calls decide between Closed and Open

use super::error::{ServiceError, ServiceResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure percentage (0-100) at or above which the circuit opens
    pub failure_rate_threshold: f64,
    /// Number of most recent outcomes kept in the window
    pub sliding_window_size: usize,
    /// Outcomes required before the failure rate is evaluated
    pub minimum_number_of_calls: usize,
    /// Cooldown before Open moves to HalfOpen
    pub wait_duration_in_open: Duration,
    /// Trial calls admitted in HalfOpen
    pub permitted_calls_in_half_open: usize,
    /// Upper bound for a single guarded call
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            sliding_window_size: 10,
            minimum_number_of_calls: 5,
            wait_duration_in_open: Duration::from_secs(10),
            permitted_calls_in_half_open: 3,
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Observable circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Snapshot for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct BreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    /// Failure percentage of the current window, None until enough calls
    pub failure_rate: Option<f64>,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub not_permitted_calls: u64,
}

#[derive(Debug)]
enum Phase {
    Closed,
    Open { since: Instant },
    HalfOpen { admitted: usize },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    /// Bumped on every phase change; outcomes from an older epoch are dropped
    epoch: u64,
    /// true = failure
    window: VecDeque<bool>,
}

impl Inner {
    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.epoch += 1;
        self.window.clear();
    }
}

/// How a permitted call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// Client-class error; neither success nor failure
    Ignored,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    not_permitted: AtomicU64,
}

/// Admission ticket for one call, stamped with the epoch it was admitted in
///
/// Dropping it without recording (caller cancelled) releases a half-open
/// trial slot so the breaker cannot get stuck.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    recorded: bool,
}

impl CallPermit<'_> {
    fn record(mut self, outcome: Outcome) {
        self.recorded = true;
        self.breaker.on_outcome(self.epoch, outcome);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.on_outcome(self.epoch, Outcome::Ignored);
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, mut config: CircuitBreakerConfig) -> Self {
        // Zero trials would keep HalfOpen forever
        config.permitted_calls_in_half_open = config.permitted_calls_in_half_open.max(1);
        config.sliding_window_size = config.sliding_window_size.max(1);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                phase: Phase::Closed,
                epoch: 0,
                window: VecDeque::new(),
            }),
            not_permitted: AtomicU64::new(0),
        }
    }

    /// Current state (an expired Open reports HalfOpen)
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.expire_open(&mut inner);
        match inner.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn metrics(&self) -> BreakerMetrics {
        let state = self.state();
        let inner = self.inner.lock();
        let buffered_calls = inner.window.len();
        let failed_calls = inner.window.iter().filter(|failed| **failed).count();
        let failure_rate = (buffered_calls >= self.config.minimum_number_of_calls
            && buffered_calls > 0)
            .then(|| failed_calls as f64 * 100.0 / buffered_calls as f64);
        BreakerMetrics {
            name: self.name.clone(),
            state,
            failure_rate,
            buffered_calls,
            failed_calls,
            not_permitted_calls: self.not_permitted.load(Ordering::Relaxed),
        }
    }

    /// Run `f` under the breaker with the configured call timeout
    ///
    /// Returns `CircuitOpen` without running `f` when the circuit rejects
    /// the call. Infrastructure errors and timeouts count as failures;
    /// client-class errors pass through uncounted.
    pub async fn call<T, F, Fut>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let Some(permit) = self.try_acquire() else {
            self.not_permitted.fetch_add(1, Ordering::Relaxed);
            return Err(ServiceError::CircuitOpen(self.name.clone()));
        };

        match tokio::time::timeout(self.config.call_timeout, f()).await {
            Ok(Ok(value)) => {
                permit.record(Outcome::Success);
                Ok(value)
            }
            Ok(Err(e)) if e.is_infrastructure() => {
                tracing::debug!(breaker = %self.name, error = %e, "Guarded call failed");
                permit.record(Outcome::Failure);
                Err(e)
            }
            Ok(Err(e)) => {
                permit.record(Outcome::Ignored);
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    breaker = %self.name,
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "Guarded call timed out"
                );
                permit.record(Outcome::Failure);
                Err(ServiceError::Timeout(self.config.call_timeout))
            }
        }
    }

    fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.inner.lock();
        self.expire_open(&mut inner);
        match &mut inner.phase {
            Phase::Closed => {}
            Phase::Open { .. } => return None,
            Phase::HalfOpen { admitted } => {
                if *admitted >= self.config.permitted_calls_in_half_open {
                    return None;
                }
                *admitted += 1;
            }
        }
        Some(CallPermit {
            breaker: self,
            epoch: inner.epoch,
            recorded: false,
        })
    }

    /// Open -> HalfOpen once the cooldown has elapsed
    fn expire_open(&self, inner: &mut Inner) {
        if let Phase::Open { since } = inner.phase
            && since.elapsed() >= self.config.wait_duration_in_open
        {
            inner.enter(Phase::HalfOpen { admitted: 0 });
            tracing::info!(breaker = %self.name, "Circuit breaker entering half-open state");
        }
    }

    fn on_outcome(&self, epoch: u64, outcome: Outcome) {
        let mut inner = self.inner.lock();
        if epoch != inner.epoch {
            // Admitted before the last transition; its outcome describes an older state
            return;
        }

        match &mut inner.phase {
            Phase::HalfOpen { admitted } => {
                if outcome == Outcome::Ignored {
                    *admitted = admitted.saturating_sub(1);
                    return;
                }
                inner.window.push_back(outcome == Outcome::Failure);
                if inner.window.len() >= self.config.permitted_calls_in_half_open {
                    if self.failure_rate(&inner.window) >= self.config.failure_rate_threshold {
                        self.trip(&mut inner);
                    } else {
                        inner.enter(Phase::Closed);
                        tracing::info!(breaker = %self.name, "Circuit breaker closed after successful recovery");
                    }
                }
            }
            Phase::Closed => {
                if outcome == Outcome::Ignored {
                    return;
                }
                inner.window.push_back(outcome == Outcome::Failure);
                while inner.window.len() > self.config.sliding_window_size {
                    inner.window.pop_front();
                }
                if inner.window.len() >= self.config.minimum_number_of_calls
                    && self.failure_rate(&inner.window) >= self.config.failure_rate_threshold
                {
                    self.trip(&mut inner);
                }
            }
            Phase::Open { .. } => {}
        }
    }

    fn failure_rate(&self, window: &VecDeque<bool>) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        let failed = window.iter().filter(|failed| **failed).count();
        failed as f64 * 100.0 / window.len() as f64
    }

    fn trip(&self, inner: &mut Inner) {
        let failure_rate = self.failure_rate(&inner.window);
        inner.enter(Phase::Open {
            since: Instant::now(),
        });
        tracing::warn!(
            breaker = %self.name,
            failure_rate,
            wait_ms = self.config.wait_duration_in_open.as_millis() as u64,
            "Circuit breaker opened"
        );
    }
}

/// Shares one breaker per operation group name
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Get or create the breaker for `name`
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }

    /// Metrics of every registered breaker, sorted by name
    pub fn metrics(&self) -> Vec<BreakerMetrics> {
        let mut all: Vec<_> = self.breakers.iter().map(|b| b.metrics()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StorageError;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_rate_threshold: 50.0,
            sliding_window_size: 4,
            minimum_number_of_calls: 4,
            wait_duration_in_open: Duration::from_millis(50),
            permitted_calls_in_half_open: 2,
            call_timeout: Duration::from_millis(100),
        }
    }

    fn infra_error() -> ServiceError {
        ServiceError::Storage(StorageError::ProductNotFound(0))
    }

    async fn fail(breaker: &CircuitBreaker) -> ServiceResult<()> {
        breaker.call(|| async { Err(infra_error()) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> ServiceResult<()> {
        breaker.call(|| async { Ok(()) }).await
    }

    #[tokio::test]
    async fn test_stays_closed_below_minimum_calls() {
        let breaker = CircuitBreaker::new("test", config());
        for _ in 0..3 {
            assert!(fail(&breaker).await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.metrics().failure_rate.is_none());
    }

    #[tokio::test]
    async fn test_opens_at_threshold_and_rejects() {
        let breaker = CircuitBreaker::new("test", config());
        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);

        let mut ran = false;
        let err = breaker
            .call(|| {
                ran = true;
                async { Ok(()) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CircuitOpen(ref name) if name == "test"));
        assert!(!ran);
        assert_eq!(breaker.metrics().not_permitted_calls, 1);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let breaker = CircuitBreaker::new("test", config());
        fail(&breaker).await.unwrap_err();
        for _ in 0..4 {
            succeed(&breaker).await.unwrap();
        }
        // The early failure has left the window
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().failed_calls, 1);
    }

    #[tokio::test]
    async fn test_client_errors_not_counted() {
        let breaker = CircuitBreaker::new("test", config());
        for _ in 0..10 {
            let err = breaker
                .call::<(), _, _>(|| async { Err(ServiceError::CategoryNotFound("X".into())) })
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::CategoryNotFound(_)));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().buffered_calls, 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new("test", config());
        let err = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));
        assert_eq!(breaker.metrics().failed_calls, 1);
    }

    async fn trip(breaker: &CircuitBreaker) {
        for _ in 0..4 {
            fail(breaker).await.unwrap_err();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_successful_trials() {
        let breaker = CircuitBreaker::new("test", config());
        trip(&breaker).await;

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_reopens_on_failed_trials() {
        let breaker = CircuitBreaker::new("test", config());
        trip(&breaker).await;

        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_limits_trial_calls() {
        let breaker = Arc::new(CircuitBreaker::new("test", config()));
        trip(&breaker).await;

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let slow = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async move {
                        let _ = rx.await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        let second = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Both trial slots are taken
        assert!(matches!(
            succeed(&breaker).await.unwrap_err(),
            ServiceError::CircuitOpen(_)
        ));

        tx.send(()).unwrap();
        slow.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_zero_half_open_calls_still_recovers() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                sliding_window_size: 2,
                minimum_number_of_calls: 2,
                wait_duration_in_open: Duration::from_millis(10),
                permitted_calls_in_half_open: 0,
                ..config()
            },
        );
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // A single trial is always admitted and decides the round
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        for _ in 0..5 {
            succeed(&breaker).await.unwrap();
        }
        assert_eq!(breaker.metrics().not_permitted_calls, 0);
    }

    #[tokio::test]
    async fn test_late_outcome_from_previous_closed_period_is_dropped() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                permitted_calls_in_half_open: 1,
                ..config()
            },
        );
        // Admitted while closed, reports only after a full open/recover cycle
        let slow = breaker.try_acquire().unwrap();
        trip(&breaker).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);

        slow.record(Outcome::Failure);
        let metrics = breaker.metrics();
        assert_eq!(metrics.buffered_calls, 0);
        assert_eq!(metrics.failed_calls, 0);
    }

    #[tokio::test]
    async fn test_cancelled_closed_call_does_not_free_trial_slot() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                permitted_calls_in_half_open: 1,
                ..config()
            },
        );
        let abandoned = breaker.try_acquire().unwrap();
        trip(&breaker).await;

        let trial = breaker.try_acquire().unwrap();
        drop(abandoned);
        // The only trial slot is still held
        assert!(breaker.try_acquire().is_none());

        trial.record(Outcome::Success);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_registry_shares_breakers() {
        let registry = CircuitBreakerRegistry::new(config());
        let a = registry.breaker("product_service");
        let b = registry.breaker("product_service");
        let other = registry.breaker("other");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));

        let names: Vec<_> = registry.metrics().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["other".to_string(), "product_service".to_string()]);
    }
}
