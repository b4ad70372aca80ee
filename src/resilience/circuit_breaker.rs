//! Circuit breaker guarding one external dependency.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls go straight to the fallback
//! - Half-Open: a single probe call tests whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: error rate within the rolling window > threshold
//! Open → Half-Open: after reset timeout (evaluated on access)
//! Half-Open → Closed: probe succeeds (window cleared)
//! Half-Open → Open: probe fails (reset timer restarted)
//! ```
//!
//! # Design Decisions
//! - One breaker instance per guarded dependency, owned and injected
//! - Every guarded call carries a hard deadline; expiry counts as a failure
//! - Any failure is handed to the fallback; the fallback's result is final
//! - State lives behind a mutex that is never held across an await

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the guarded call did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The circuit rejected the call without attempting it.
    Open,
    /// The call exceeded the breaker deadline.
    Timeout(Duration),
    /// The call returned an error.
    Failed(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Open => write!(f, "circuit open"),
            FailureCause::Timeout(d) => write!(f, "timed out after {:?}", d),
            FailureCause::Failed(e) => write!(f, "call failed: {}", e),
        }
    }
}

/// The external call a breaker protects.
#[async_trait]
pub trait GuardedCall: Send + Sync {
    type Output: Send;
    type Error: fmt::Display + Send;

    async fn call(&self, arg: &str) -> Result<Self::Output, Self::Error>;
}

/// Substitute logic used whenever the guarded call is skipped or fails.
#[async_trait]
pub trait Fallback<T>: Send + Sync {
    type Error: Send;

    async fn recover(&self, arg: &str, cause: FailureCause) -> Result<T, Self::Error>;
}

/// Tuning for one breaker.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub timeout: Duration,
    pub error_threshold_percentage: u32,
    pub reset_timeout: Duration,
    pub rolling_window: Duration,
    pub rolling_buckets: u32,
    pub volume_threshold: u32,
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            timeout: config.timeout(),
            error_threshold_percentage: config.error_threshold_percentage,
            reset_timeout: config.reset_timeout(),
            rolling_window: config.rolling_window(),
            rolling_buckets: config.rolling_buckets,
            volume_threshold: config.volume_threshold,
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub fires: u32,
    pub failures: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    successes: u32,
    failures: u32,
}

/// Outcome counts over the last `span`, kept in time-sliced buckets.
#[derive(Debug)]
struct RollingWindow {
    span: Duration,
    bucket_span: Duration,
    buckets: VecDeque<(Instant, Bucket)>,
}

impl RollingWindow {
    fn new(span: Duration, buckets: u32) -> Self {
        Self {
            span,
            bucket_span: span / buckets.max(1),
            buckets: VecDeque::new(),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some((start, _)) = self.buckets.front() {
            if now.duration_since(*start) >= self.span {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn record(&mut self, now: Instant, success: bool) {
        self.evict(now);
        let fresh = self
            .buckets
            .back()
            .map_or(true, |(start, _)| now.duration_since(*start) >= self.bucket_span);
        if fresh {
            self.buckets.push_back((now, Bucket::default()));
        }
        if let Some((_, bucket)) = self.buckets.back_mut() {
            if success {
                bucket.successes += 1;
            } else {
                bucket.failures += 1;
            }
        }
    }

    /// (fires, failures) still inside the window.
    fn totals(&mut self, now: Instant) -> (u32, u32) {
        self.evict(now);
        self.buckets.iter().fold((0, 0), |(fires, failures), (_, b)| {
            (fires + b.successes + b.failures, failures + b.failures)
        })
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    window: RollingWindow,
}

enum Admission {
    Pass,
    Probe,
    Reject,
}

/// Circuit breaker around `G` with fallback `F`.
pub struct CircuitBreaker<G, F> {
    name: String,
    settings: BreakerSettings,
    call: G,
    fallback: F,
    inner: Mutex<BreakerInner>,
}

impl<G, F> fmt::Debug for CircuitBreaker<G, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<G, F> CircuitBreaker<G, F>
where
    G: GuardedCall,
    F: Fallback<G::Output>,
{
    pub fn new(name: impl Into<String>, settings: BreakerSettings, call: G, fallback: F) -> Self {
        let name = name.into();
        let window = RollingWindow::new(settings.rolling_window, settings.rolling_buckets);
        metrics::record_breaker_state(&name, BreakerState::Closed);
        Self {
            name,
            settings,
            call,
            fallback,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                opened_at: None,
                probe_in_flight: false,
                window,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Current state; an expired open period is promoted to half-open here.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        let (fires, failures) = inner.window.totals(now);
        BreakerSnapshot {
            state: inner.state,
            fires,
            failures,
        }
    }

    /// Invoke the guarded call if the circuit permits, falling back otherwise.
    pub async fn fire(&self, arg: &str) -> Result<G::Output, F::Error> {
        let probe = match self.admit() {
            Admission::Pass => false,
            Admission::Probe => true,
            Admission::Reject => {
                tracing::debug!(breaker = %self.name, arg, "Circuit open, short-circuiting to fallback");
                metrics::record_fallback(&self.name, "short_circuit");
                return self.fallback.recover(arg, FailureCause::Open).await;
            }
        };
        let _probe_slot = probe.then(|| ProbeSlot(&self.inner));

        let cause = match with_deadline(self.settings.timeout, self.call.call(arg)).await {
            Ok(Ok(output)) => {
                self.on_success(probe);
                return Ok(output);
            }
            Ok(Err(e)) => FailureCause::Failed(e.to_string()),
            Err(deadline) => FailureCause::Timeout(deadline.0),
        };

        tracing::warn!(breaker = %self.name, arg, cause = %cause, probe, "Guarded call failed, using fallback");
        self.on_failure(probe);
        metrics::record_fallback(&self.name, "call_failed");
        self.fallback.recover(arg, cause).await
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state != BreakerState::Open {
            return;
        }
        let elapsed = inner.opened_at.map_or(Duration::MAX, |at| now.duration_since(at));
        if elapsed >= self.settings.reset_timeout {
            self.transition(inner, BreakerState::HalfOpen);
        }
    }

    fn admit(&self) -> Admission {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        match inner.state {
            BreakerState::Closed => Admission::Pass,
            BreakerState::Open => Admission::Reject,
            BreakerState::HalfOpen if inner.probe_in_flight => Admission::Reject,
            BreakerState::HalfOpen => {
                inner.probe_in_flight = true;
                Admission::Probe
            }
        }
    }

    fn on_success(&self, probe: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.state {
            BreakerState::HalfOpen if probe => {
                inner.window.clear();
                self.transition(&mut inner, BreakerState::Closed);
            }
            BreakerState::Closed => inner.window.record(now, true),
            _ => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.state {
            BreakerState::HalfOpen if probe => {
                inner.opened_at = Some(now);
                self.transition(&mut inner, BreakerState::Open);
            }
            BreakerState::Closed => {
                inner.window.record(now, false);
                let (fires, failures) = inner.window.totals(now);
                if fires >= self.settings.volume_threshold
                    && u64::from(failures) * 100
                        > u64::from(self.settings.error_threshold_percentage) * u64::from(fires)
                {
                    tracing::warn!(
                        breaker = %self.name,
                        fires,
                        failures,
                        threshold = self.settings.error_threshold_percentage,
                        "Error rate above threshold"
                    );
                    inner.opened_at = Some(now);
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.probe_in_flight = false;
        tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit state changed");
        metrics::record_breaker_transition(&self.name, from, to);
    }
}

/// Frees the half-open probe slot even if the probing future is dropped.
struct ProbeSlot<'a>(&'a Mutex<BreakerInner>);

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        inner.probe_in_flight = false;
    }
}
