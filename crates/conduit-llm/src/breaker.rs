//! Per-provider circuit breakers
//!
//! A breaker tracks call outcomes over a sliding window. Once at least
//! `volume_threshold` calls are in the window and the failure share
//! reaches `error_threshold_percent`, it opens and rejects calls without
//! touching the network. After the cool-down a single probe is admitted;
//! concurrent callers fail fast while the probe is in flight. A failed
//! probe reopens the breaker with a longer cool-down.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use conduit_config::CircuitBreakerConfig;
use conduit_routing::ProviderAvailability;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::ProviderError;
use crate::provider::duration_ms;

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected until the cool-down ends
    Open,
    /// Cool-down over, one probe call allowed
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Outcomes in the window, `true` for failures
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    cool_down: Duration,
    probe_in_flight: bool,
}

/// Failure-isolation state machine for one provider
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Admission to make one call through the breaker
///
/// Dropping an unresolved probe permit releases the probe slot so an
/// abandoned call cannot wedge the breaker in half-open.
pub(crate) struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl Permit<'_> {
    pub(crate) fn success(mut self) {
        self.resolved = true;
        self.breaker.on_success(self.probe);
    }

    pub(crate) fn failure(mut self) {
        self.resolved = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.resolved {
            self.breaker.lock().probe_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let cool_down = Duration::from_millis(config.reset_timeout_ms);
        Self {
            provider: provider.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                outcomes: VecDeque::new(),
                opened_at: None,
                cool_down,
                probe_in_flight: false,
            }),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Current state, reporting an expired cool-down as half-open
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match inner.state {
            CircuitState::Open if remaining(&inner).is_zero() => CircuitState::HalfOpen,
            state => state,
        }
    }

    /// Run `op` through the breaker with a timeout
    ///
    /// Errors that do not trip the breaker (4xx) count as a response
    /// from the provider and close a half-open breaker.
    pub async fn call<T, F, Fut>(&self, timeout: Duration, op: F) -> Result<T, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let permit = self.acquire()?;

        let result = tokio::time::timeout(timeout, op())
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout {
                    after_ms: duration_ms(timeout),
                })
            });

        match &result {
            Err(e) if e.trips_breaker() => permit.failure(),
            _ => permit.success(),
        }

        result
    }

    pub(crate) fn acquire(&self) -> Result<Permit<'_>, ProviderError> {
        let mut inner = self.lock();

        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let wait = remaining(&inner);
                if !wait.is_zero() {
                    return Err(self.open_error(wait));
                }
                tracing::info!(provider = %self.provider, "circuit half-open, admitting probe");
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(self.open_error(Duration::ZERO));
                }
                inner.probe_in_flight = true;
                true
            }
        };

        Ok(Permit {
            breaker: self,
            probe,
            resolved: false,
        })
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            tracing::info!(provider = %self.provider, "probe succeeded, circuit closed");
            inner.state = CircuitState::Closed;
            inner.outcomes.clear();
            inner.opened_at = None;
            inner.cool_down = Duration::from_millis(self.config.reset_timeout_ms);
            inner.probe_in_flight = false;
        } else if inner.state == CircuitState::Closed {
            self.push_outcome(&mut inner, false);
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        if probe {
            let max = Duration::from_millis(self.config.max_reset_timeout_ms);
            let grown = Duration::try_from_secs_f64(inner.cool_down.as_secs_f64() * self.config.backoff_multiplier)
                .unwrap_or(max);
            inner.cool_down = grown.min(max);
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            inner.probe_in_flight = false;
            tracing::warn!(
                provider = %self.provider,
                cool_down_ms = duration_ms(inner.cool_down),
                "probe failed, circuit reopened"
            );
            return;
        }

        if inner.state != CircuitState::Closed {
            return;
        }

        self.push_outcome(&mut inner, true);

        let total = inner.outcomes.len();
        let failures = inner.outcomes.iter().filter(|(_, failed)| *failed).count();
        let volume = usize::try_from(self.config.volume_threshold).unwrap_or(usize::MAX);

        if total >= volume && failures as f64 * 100.0 >= self.config.error_threshold_percent * total as f64 {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            inner.cool_down = Duration::from_millis(self.config.reset_timeout_ms);
            inner.outcomes.clear();
            tracing::warn!(
                provider = %self.provider,
                failures,
                calls = total,
                "circuit breaker opened for provider"
            );
        }
    }

    fn push_outcome(&self, inner: &mut BreakerInner, failed: bool) {
        let now = Instant::now();
        let window = Duration::from_millis(self.config.window_ms);

        inner.outcomes.push_back((now, failed));
        while inner
            .outcomes
            .front()
            .is_some_and(|(at, _)| now.duration_since(*at) > window)
        {
            inner.outcomes.pop_front();
        }
    }

    fn open_error(&self, retry_after: Duration) -> ProviderError {
        ProviderError::CircuitOpen {
            provider: self.provider.clone(),
            retry_after,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cool-down left before an open breaker admits a probe
fn remaining(inner: &BreakerInner) -> Duration {
    inner
        .opened_at
        .map_or(Duration::ZERO, |at| inner.cool_down.saturating_sub(at.elapsed()))
}

/// One breaker per provider name
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Breaker for a provider, created on first use
    pub fn get(&self, provider: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(provider) {
            return Arc::clone(&breaker);
        }

        Arc::clone(
            &self
                .breakers
                .entry(provider.to_owned())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(provider, self.config.clone()))),
        )
    }

    /// State of every breaker created so far, ordered by provider
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        let mut states: Vec<(String, CircuitState)> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

impl ProviderAvailability for BreakerRegistry {
    fn is_open(&self, provider_name: &str) -> bool {
        self.breakers
            .get(provider_name)
            .is_some_and(|breaker| breaker.state() == CircuitState::Open)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            error_threshold_percent: 50.0,
            window_ms: 10_000,
            volume_threshold: 4,
            reset_timeout_ms: 1_000,
            backoff_multiplier: 2.0,
            max_reset_timeout_ms: 3_000,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), ProviderError> {
        breaker
            .call(Duration::from_secs(1), || async { Err(ProviderError::Transient { status: 500 }) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), ProviderError> {
        breaker.call(Duration::from_secs(1), || async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn stays_closed_below_volume_threshold() {
        let breaker = CircuitBreaker::new("local", config());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn opens_once_threshold_is_crossed() {
        let breaker = CircuitBreaker::new("local", config());
        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_does_not_call_through() {
        let breaker = CircuitBreaker::new("local", config());
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }

        let calls = AtomicU32::new(0);
        let result = breaker
            .call(Duration::from_secs(1), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ProviderError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn single_probe_after_cool_down() {
        let breaker = CircuitBreaker::new("local", config());
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }

        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let probe = breaker.acquire().unwrap();
        assert!(matches!(breaker.acquire(), Err(ProviderError::CircuitOpen { .. })));

        probe.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_grows_cool_down() {
        let breaker = CircuitBreaker::new("local", config());
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }

        tokio::time::advance(Duration::from_millis(1_001)).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_probe_releases_slot() {
        let breaker = CircuitBreaker::new("local", config());
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_millis(1_001)).await;

        drop(breaker.acquire().unwrap());
        assert!(breaker.acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_count_as_failures() {
        let breaker = CircuitBreaker::new("local", config());
        for _ in 0..4 {
            let result: Result<(), _> = breaker
                .call(Duration::from_millis(50), || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
                .await;
            assert_eq!(result, Err(ProviderError::Timeout { after_ms: 50 }));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_do_not_trip() {
        let breaker = CircuitBreaker::new("hosted", config());
        for _ in 0..10 {
            let _: Result<(), _> = breaker
                .call(Duration::from_secs(1), || async { Err(ProviderError::BadRequest { status: 400 }) })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn old_failures_leave_the_window() {
        let breaker = CircuitBreaker::new("local", config());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn registry_returns_one_breaker_per_provider() {
        let registry = BreakerRegistry::new(config());
        let a = registry.get("local");
        let b = registry.get("local");
        let c = registry.get("hosted");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.states().len(), 2);
        assert!(!registry.is_open("local"));
        assert!(!registry.is_open("never-used"));
    }
}
