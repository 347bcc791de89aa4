use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Tracks consecutive failures of an upstream collaborator and fails fast
// while it is unhealthy.
//
// - Closed:   calls pass through
// - Open:     calls rejected until the cooldown elapses
// - HalfOpen: trial calls; enough successes close it, one failure reopens it
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding (0=Closed, 1=Open, 2=HalfOpen)
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Time spent open before probing
    pub cooldown: Duration,
    /// Successes needed in half-open before closing
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => f.write_str("upstream circuit open"),
            CircuitBreakerError::OperationFailed(e) => e.fmt(f),
        }
    }
}

impl<E: std::error::Error> std::error::Error for CircuitBreakerError<E> {}

/// Mutable part of the breaker, guarded by one lock
#[derive(Default)]
struct Tally {
    state: Option<CircuitState>,
    consecutive_failures: u32,
    trial_successes: u32,
    opened_at: Option<Instant>,
}

impl Tally {
    fn current(&self) -> CircuitState {
        self.state.unwrap_or(CircuitState::Closed)
    }

    fn trip(&mut self) {
        self.state = Some(CircuitState::Open);
        self.trial_successes = 0;
        self.opened_at = Some(Instant::now());
    }

    fn reset(&mut self) {
        *self = Tally::default();
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    tally: Arc<Mutex<Tally>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            tally: Arc::new(Mutex::new(Tally::default())),
            config,
        }
    }

    /// Runs `operation` unless the circuit is open and still cooling down.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        let outcome = operation.await;
        self.settle(outcome.is_ok()).await;
        outcome.map_err(CircuitBreakerError::OperationFailed)
    }

    pub async fn state(&self) -> CircuitState {
        self.tally.lock().await.current()
    }

    async fn admit(&self) -> bool {
        let mut tally = self.tally.lock().await;
        if tally.current() != CircuitState::Open {
            return true;
        }

        let cooling = tally
            .opened_at
            .is_some_and(|at| at.elapsed() < self.config.cooldown);
        if cooling {
            return false;
        }

        tracing::info!(breaker = self.name, "Cooldown elapsed, sending a trial call");
        tally.state = Some(CircuitState::HalfOpen);
        tally.trial_successes = 0;
        true
    }

    async fn settle(&self, succeeded: bool) {
        let mut tally = self.tally.lock().await;

        match (tally.current(), succeeded) {
            (CircuitState::Closed, true) => tally.consecutive_failures = 0,
            (CircuitState::Closed, false) => {
                tally.consecutive_failures += 1;
                if tally.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = self.name,
                        failures = tally.consecutive_failures,
                        "Upstream unhealthy, failing fast"
                    );
                    tally.trip();
                }
            }
            (CircuitState::HalfOpen, true) => {
                tally.trial_successes += 1;
                if tally.trial_successes >= self.config.success_threshold {
                    tracing::info!(breaker = self.name, "Upstream recovered");
                    tally.reset();
                }
            }
            (CircuitState::HalfOpen, false) => {
                tracing::warn!(breaker = self.name, "Trial call failed, reopening");
                tally.trip();
            }
            (CircuitState::Open, _) => {}
        }
    }
}
