//! Three-state circuit breaker.
//!
//! Closed admits everything; enough consecutive failures open the circuit;
//! after the open interval elapses the breaker admits a bounded number of
//! probes (half-open), and either closes on enough successes or reopens on
//! the first failure. Transitions are serialized by one lock; the current
//! state is mirrored in an atomic so the closed-state hot path stays
//! lock-free.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerOptions {
    /// Consecutive failures in closed state before opening. Minimum 1.
    pub failures_to_open: u32,
    /// How long the circuit stays open before admitting probes.
    pub open_interval: Duration,
    /// Concurrent probes admitted while half-open. Minimum 1.
    pub half_open_max_inflight: u32,
    /// Consecutive probe successes required to close. Minimum 1.
    pub successes_to_close: u32,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            failures_to_open: 5,
            open_interval: Duration::from_millis(2000),
            half_open_max_inflight: 1,
            successes_to_close: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerCounters {
    consecutive_failures: u32,
    consecutive_successes: u32,
    half_open_inflight: u32,
    opened_at: Instant,
}

pub struct CircuitBreaker {
    opts: CircuitBreakerOptions,
    state: AtomicU8,
    counters: Mutex<BreakerCounters>,
}

impl CircuitBreaker {
    pub fn new(mut opts: CircuitBreakerOptions) -> Self {
        if opts.failures_to_open == 0 {
            opts.failures_to_open = 1;
        }
        if opts.half_open_max_inflight == 0 {
            opts.half_open_max_inflight = 1;
        }
        if opts.successes_to_close == 0 {
            opts.successes_to_close = 1;
        }
        Self {
            opts,
            state: AtomicU8::new(CircuitState::Closed as u8),
            counters: Mutex::new(BreakerCounters {
                consecutive_failures: 0,
                consecutive_successes: 0,
                half_open_inflight: 0,
                opened_at: Instant::now(),
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn try_transition_to_half_open_locked(&self, counters: &mut BreakerCounters, now: Instant) {
        if CircuitState::from_u8(self.state.load(Ordering::Relaxed)) != CircuitState::Open {
            return;
        }
        if now.duration_since(counters.opened_at) < self.opts.open_interval {
            return;
        }

        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);
        counters.consecutive_failures = 0;
        counters.consecutive_successes = 0;
        counters.half_open_inflight = 0;
    }

    /// Whether a request may proceed right now. In half-open state a `true`
    /// return claims one probe slot; balance it with `on_success` or
    /// `on_failure`.
    pub fn allow_request(&self) -> bool {
        if self.state() == CircuitState::Closed {
            return true;
        }

        let now = Instant::now();
        let mut counters = self.counters.lock();

        self.try_transition_to_half_open_locked(&mut counters, now);

        match CircuitState::from_u8(self.state.load(Ordering::Relaxed)) {
            CircuitState::Open => false,
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if counters.half_open_inflight >= self.opts.half_open_max_inflight {
                    return false;
                }
                counters.half_open_inflight += 1;
                true
            }
        }
    }

    pub fn on_success(&self) {
        let mut counters = self.counters.lock();

        match CircuitState::from_u8(self.state.load(Ordering::Relaxed)) {
            CircuitState::Closed => {
                counters.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                if counters.half_open_inflight > 0 {
                    counters.half_open_inflight -= 1;
                }
                counters.consecutive_successes += 1;
                if counters.consecutive_successes >= self.opts.successes_to_close {
                    self.state
                        .store(CircuitState::Closed as u8, Ordering::Release);
                    counters.consecutive_failures = 0;
                    counters.consecutive_successes = 0;
                    counters.half_open_inflight = 0;
                }
            }
            CircuitState::Open => {
                // success callbacks while open are ignored
            }
        }
    }

    pub fn on_failure(&self) {
        let mut counters = self.counters.lock();

        match CircuitState::from_u8(self.state.load(Ordering::Relaxed)) {
            CircuitState::Closed => {
                counters.consecutive_failures += 1;
                if counters.consecutive_failures >= self.opts.failures_to_open {
                    self.state.store(CircuitState::Open as u8, Ordering::Release);
                    counters.opened_at = Instant::now();
                    counters.consecutive_successes = 0;
                }
            }
            CircuitState::HalfOpen => {
                if counters.half_open_inflight > 0 {
                    counters.half_open_inflight -= 1;
                }
                // any probe failure reopens immediately
                self.state.store(CircuitState::Open as u8, Ordering::Release);
                counters.opened_at = Instant::now();
                counters.consecutive_failures = 0;
                counters.consecutive_successes = 0;
                counters.half_open_inflight = 0;
            }
            CircuitState::Open => {
                // stays open
            }
        }
    }
}
