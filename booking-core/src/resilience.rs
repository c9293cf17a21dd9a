//! Circuit breaker guarding calls to the flight service.
//!
//! - **Closed**: calls pass through; outcomes go into a count-based sliding
//!   window. The breaker trips once the window holds enough calls and the
//!   failure rate reaches the threshold.
//! - **Open**: calls are rejected without running. After the cool-down the
//!   next call moves the breaker to half-open.
//! - **HalfOpen**: a bounded number of trial calls run. When all of them have
//!   reported, the breaker closes or re-opens depending on their failure rate.

use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure percentage (0-100) at or above which the breaker opens.
    pub failure_rate_threshold: f64,
    /// Number of most recent calls considered while closed.
    pub sliding_window_size: usize,
    /// Calls that must be recorded before the failure rate is evaluated.
    pub minimum_number_of_calls: usize,
    /// Cool-down spent open before trial calls are allowed.
    pub wait_duration_in_open_state: Duration,
    /// Trial calls allowed while half-open.
    pub permitted_calls_in_half_open_state: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            sliding_window_size: 10,
            minimum_number_of_calls: 5,
            wait_duration_in_open_state: Duration::from_secs(30),
            permitted_calls_in_half_open_state: 3,
        }
    }
}

impl CircuitBreakerConfig {
    fn normalized(mut self) -> Self {
        self.sliding_window_size = self.sliding_window_size.max(1);
        self.minimum_number_of_calls = self
            .minimum_number_of_calls
            .clamp(1, self.sliding_window_size);
        self.permitted_calls_in_half_open_state = self.permitted_calls_in_half_open_state.max(1);
        self.failure_rate_threshold = self.failure_rate_threshold.clamp(0.0, 100.0);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker [{0}] is open")]
    Open(String),
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub failure_rate: f64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    // Bumped on every transition; outcomes from an older generation are ignored.
    generation: u64,
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    trials_in_flight: usize,
    trial_outcomes: Vec<bool>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

/// Admission ticket for one call. A trial permit dropped before its outcome
/// is recorded hands its half-open slot back.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            let mut inner = self.breaker.lock();
            if inner.generation == self.generation && inner.state == CircuitState::HalfOpen {
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
            }
        }
    }
}

fn failure_rate(outcomes: impl Iterator<Item = bool>) -> (usize, usize, f64) {
    let (total, failed) = outcomes.fold((0usize, 0usize), |(t, f), failed| {
        (t + 1, f + usize::from(failed))
    });
    let rate = if total == 0 {
        0.0
    } else {
        failed as f64 * 100.0 / total as f64
    };
    (total, failed, rate)
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: config.normalized(),
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                window: VecDeque::new(),
                opened_at: None,
                trials_in_flight: 0,
                trial_outcomes: Vec::new(),
            }),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An open breaker whose cool-down has elapsed still
    /// reports `Open` until the next call arrives.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns `CircuitBreakerError::Open` without running the operation when
    /// no call is permitted, and `CircuitBreakerError::Inner` when it fails.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let mut permit = match self.try_acquire() {
            Some(permit) => permit,
            None => {
                self.total_rejections.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Circuit Breaker [{}] is OPEN, rejecting call", self.name);
                return Err(CircuitBreakerError::Open(self.name.clone()));
            }
        };

        match operation().await {
            Ok(value) => {
                self.settle(&mut permit, false);
                Ok(value)
            }
            Err(err) => {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                self.settle(&mut permit, true);
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Force the breaker closed and forget recorded outcomes.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Force the breaker open; the usual cool-down applies.
    pub fn force_open(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Open);
        tracing::warn!("Circuit Breaker [{}] force-opened", self.name);
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.lock();
        let (buffered_calls, failed_calls, failure_rate) = match inner.state {
            CircuitState::HalfOpen => failure_rate(inner.trial_outcomes.iter().copied()),
            _ => failure_rate(inner.window.iter().copied()),
        };
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: inner.state,
            buffered_calls,
            failed_calls,
            failure_rate,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let cooled_down = inner
                .opened_at
                .map(|at| at.elapsed() >= self.config.wait_duration_in_open_state)
                .unwrap_or(true);
            if !cooled_down {
                return None;
            }
            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        match inner.state {
            CircuitState::Closed => Some(CallPermit {
                breaker: self,
                generation: inner.generation,
                trial: false,
                settled: false,
            }),
            CircuitState::HalfOpen => {
                let used = inner.trials_in_flight + inner.trial_outcomes.len();
                if used >= self.config.permitted_calls_in_half_open_state {
                    return None;
                }
                inner.trials_in_flight += 1;
                Some(CallPermit {
                    breaker: self,
                    generation: inner.generation,
                    trial: true,
                    settled: false,
                })
            }
            CircuitState::Open => None,
        }
    }

    fn settle(&self, permit: &mut CallPermit<'_>, failed: bool) {
        permit.settled = true;
        let mut inner = self.lock();
        if inner.generation != permit.generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.window.push_back(failed);
                while inner.window.len() > self.config.sliding_window_size {
                    inner.window.pop_front();
                }
                let (calls, failures, rate) = failure_rate(inner.window.iter().copied());
                if calls >= self.config.minimum_number_of_calls
                    && rate >= self.config.failure_rate_threshold
                {
                    tracing::error!(
                        "Circuit Breaker [{}] TRIPPED to Open. Failures: {}/{} ({:.1}%)",
                        self.name,
                        failures,
                        calls,
                        rate
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
                inner.trial_outcomes.push(failed);
                if inner.trial_outcomes.len() >= self.config.permitted_calls_in_half_open_state {
                    let (_, failures, rate) = failure_rate(inner.trial_outcomes.iter().copied());
                    if rate >= self.config.failure_rate_threshold {
                        tracing::error!(
                            "Circuit Breaker [{}] trial calls failed ({} failures), re-opening",
                            self.name,
                            failures
                        );
                        self.transition(&mut inner, CircuitState::Open);
                    } else {
                        self.transition(&mut inner, CircuitState::Closed);
                        tracing::info!("Circuit Breaker [{}] recovered to Closed", self.name);
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.trials_in_flight = 0;
        inner.trial_outcomes.clear();
        match to {
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
            CircuitState::Closed => {
                inner.window.clear();
                inner.opened_at = None;
            }
            CircuitState::HalfOpen => {}
        }
        if from != to {
            tracing::info!("Circuit Breaker [{}] moving {} -> {}", self.name, from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn config(wait: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_rate_threshold: 50.0,
            sliding_window_size: 4,
            minimum_number_of_calls: 4,
            wait_duration_in_open_state: wait,
            permitted_calls_in_half_open_state: 2,
        }
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<&'static str, CircuitBreakerError<String>> {
        cb.call(|| async { Ok::<_, String>("ok") }).await
    }

    async fn fail(cb: &CircuitBreaker) -> Result<&'static str, CircuitBreakerError<String>> {
        cb.call(|| async { Err::<&'static str, _>("boom".to_string()) }).await
    }

    #[tokio::test]
    async fn test_circuit_stays_closed_below_minimum_calls() {
        let cb = CircuitBreaker::with_config("flight", config(Duration::from_secs(60)));
        for _ in 0..3 {
            assert!(matches!(fail(&cb).await, Err(CircuitBreakerError::Inner(_))));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_opens_at_failure_rate() {
        let cb = CircuitBreaker::with_config("flight", config(Duration::from_secs(60)));
        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_sliding_window_forgets_old_failures() {
        let cb = CircuitBreaker::with_config("flight", config(Duration::from_secs(60)));
        let _ = fail(&cb).await;
        for _ in 0..4 {
            succeed(&cb).await.unwrap();
        }
        let _ = fail(&cb).await;
        // Window now holds [ok, ok, ok, fail]: 25%
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().failed_calls, 1);
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_calling() {
        let cb = CircuitBreaker::with_config("flight", config(Duration::from_secs(60)));
        cb.force_open();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = cb
            .call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Open(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.metrics().total_rejections, 1);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_successful_trials() {
        let cb = CircuitBreaker::with_config("flight", config(Duration::ZERO));
        cb.force_open();

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().buffered_calls, 0);
    }

    #[tokio::test]
    async fn test_half_open_reopens_after_failed_trials() {
        let cb = CircuitBreaker::with_config("flight", config(Duration::from_millis(50)));
        cb.force_open();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        // Cool-down restarted
        assert!(matches!(succeed(&cb).await, Err(CircuitBreakerError::Open(_))));
    }

    #[tokio::test]
    async fn test_half_open_limits_concurrent_trials() {
        let cb = Arc::new(CircuitBreaker::with_config("flight", config(Duration::ZERO)));
        cb.force_open();

        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let mut trials = Vec::new();
        for _ in 0..2 {
            let cb = cb.clone();
            let mut rx = release_rx.clone();
            trials.push(tokio::spawn(async move {
                cb.call(|| async move {
                    while !*rx.borrow() {
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                    Ok::<_, String>(())
                })
                .await
            }));
        }
        tokio::task::yield_now().await;
        while cb.lock().trials_in_flight < 2 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(succeed(&cb).await, Err(CircuitBreakerError::Open(_))));

        release_tx.send(true).unwrap();
        for trial in trials {
            trial.await.unwrap().unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_abandoned_trial_frees_its_slot() {
        let cb = CircuitBreaker::with_config("flight", config(Duration::ZERO));
        cb.force_open();

        let pending = cb.call(|| std::future::pending::<Result<(), String>>());
        let _ = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert_eq!(cb.lock().trials_in_flight, 0);

        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let cb = CircuitBreaker::with_config("flight", config(Duration::from_secs(60)));
        cb.force_open();
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        succeed(&cb).await.unwrap();
    }

    #[test]
    fn test_config_is_normalized() {
        let cb = CircuitBreaker::with_config(
            "flight",
            CircuitBreakerConfig {
                failure_rate_threshold: 150.0,
                sliding_window_size: 0,
                minimum_number_of_calls: 10,
                wait_duration_in_open_state: Duration::ZERO,
                permitted_calls_in_half_open_state: 0,
            },
        );
        assert_eq!(cb.config().sliding_window_size, 1);
        assert_eq!(cb.config().minimum_number_of_calls, 1);
        assert_eq!(cb.config().permitted_calls_in_half_open_state, 1);
        assert_eq!(cb.config().failure_rate_threshold, 100.0);
    }
}
