//! Global request budget
//!
//! A token reservoir with periodic replenishment, a concurrency cap and a
//! minimum spacing between dispatches. Every attempt against the API takes a
//! permit from the one limiter shared by the run.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};
use tracing::trace;

use crate::downloader::config::{
    DEFAULT_MAX_CONCURRENT, DEFAULT_MIN_TIME_MS, DEFAULT_RESERVOIR,
    DEFAULT_RESERVOIR_INCREASE_AMOUNT, DEFAULT_RESERVOIR_INCREASE_INTERVAL_MS,
    DEFAULT_RESERVOIR_INCREASE_MAXIMUM,
};
use crate::metrics::RateLimiterMetrics;

/// Budget parameters of a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Tokens available when the limiter is created
    pub reservoir: u32,
    /// How often the reservoir is topped up
    pub reservoir_increase_interval: Duration,
    /// Tokens added per top-up
    pub reservoir_increase_amount: u32,
    /// Top-ups never raise the reservoir above this
    pub reservoir_increase_maximum: u32,
    /// Maximum permits outstanding at once
    pub max_concurrent: usize,
    /// Minimum time between two dispatches
    pub min_time: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            reservoir: DEFAULT_RESERVOIR,
            reservoir_increase_interval: Duration::from_millis(
                DEFAULT_RESERVOIR_INCREASE_INTERVAL_MS,
            ),
            reservoir_increase_amount: DEFAULT_RESERVOIR_INCREASE_AMOUNT,
            reservoir_increase_maximum: DEFAULT_RESERVOIR_INCREASE_MAXIMUM,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            min_time: Duration::from_millis(DEFAULT_MIN_TIME_MS),
        }
    }
}

impl RateLimitSettings {
    /// Settings that never delay; useful for tests and local mirrors.
    pub fn unlimited(max_concurrent: usize) -> Self {
        Self {
            reservoir: u32::MAX,
            reservoir_increase_interval: Duration::from_secs(1),
            reservoir_increase_amount: u32::MAX,
            reservoir_increase_maximum: u32::MAX,
            max_concurrent,
            min_time: Duration::ZERO,
        }
    }

    fn replenishes(&self) -> bool {
        !self.reservoir_increase_interval.is_zero() && self.reservoir_increase_amount > 0
    }

    /// Largest reservoir the limiter can ever hold.
    fn capacity(&self) -> u32 {
        if self.replenishes() {
            self.reservoir.max(self.reservoir_increase_maximum)
        } else {
            self.reservoir
        }
    }
}

/// Mutable budget state, only touched while holding the limiter's queue lock.
#[derive(Debug)]
struct RateBudget {
    reservoir: u32,
    next_refill: Instant,
    last_dispatch: Option<Instant>,
}

impl RateBudget {
    /// Apply every replenishment tick that fell due up to `now`.
    fn replenish(&mut self, now: Instant, settings: &RateLimitSettings) {
        if !settings.replenishes() || now < self.next_refill {
            return;
        }

        let interval = settings.reservoir_increase_interval.as_nanos();
        let ticks = (now - self.next_refill).as_nanos() / interval + 1;
        let added = u128::from(settings.reservoir_increase_amount).saturating_mul(ticks);

        if self.reservoir < settings.reservoir_increase_maximum {
            let topped = (u128::from(self.reservoir) + added)
                .min(u128::from(settings.reservoir_increase_maximum));
            self.reservoir = u32::try_from(topped).unwrap_or(u32::MAX);
        }

        let advance = u64::try_from(interval.saturating_mul(ticks)).unwrap_or(u64::MAX);
        self.next_refill += Duration::from_nanos(advance);
    }
}

struct LimiterInner {
    settings: RateLimitSettings,
    // tokio's Mutex is fair: waiters acquire it in the order they queued,
    // and the head of the queue holds it until its permit is granted.
    budget: Mutex<RateBudget>,
    slots: Arc<Semaphore>,
}

/// Shared request budget for one run
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

/// Proof of dispatch. Holds one concurrency slot until dropped;
/// reservoir tokens are consumed on grant and never returned.
#[derive(Debug)]
pub struct RatePermit {
    _slot: OwnedSemaphorePermit,
}

impl RateLimiter {
    /// Create a limiter whose reservoir starts full at `settings.reservoir`.
    pub fn new(settings: RateLimitSettings) -> Self {
        let now = Instant::now();
        let budget = RateBudget {
            reservoir: settings.reservoir,
            next_refill: now + settings.reservoir_increase_interval,
            last_dispatch: None,
        };
        let slots = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));

        Self {
            inner: Arc::new(LimiterInner {
                settings,
                budget: Mutex::new(budget),
                slots,
            }),
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.inner.settings
    }

    /// Number of permits currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.inner.settings.max_concurrent.max(1) - self.inner.slots.available_permits()
    }

    /// Tokens left in the reservoir, or `None` while a waiter owns the queue.
    pub fn available_tokens(&self) -> Option<u32> {
        let mut budget = self.inner.budget.try_lock().ok()?;
        budget.replenish(Instant::now(), &self.inner.settings);
        Some(budget.reservoir)
    }

    /// Wait for a permit costing `cost` tokens (at least one).
    ///
    /// Suspends until the reservoir holds `cost` tokens, a concurrency slot is
    /// free and `min_time` has passed since the previous dispatch. Callers are
    /// served first come, first served.
    ///
    /// # Errors
    /// Only when the request can never be satisfied: `cost` exceeds what the
    /// reservoir can ever hold, or the reservoir is empty and never refills.
    pub async fn acquire(&self, cost: u32) -> Result<RatePermit, RateLimitError> {
        let settings = &self.inner.settings;
        let cost = cost.max(1);
        if cost > settings.capacity() {
            return Err(RateLimitError::CostExceedsCapacity {
                cost,
                capacity: settings.capacity(),
            });
        }

        let wait_started = Instant::now();
        let mut budget = self.inner.budget.lock().await;

        let slot = self
            .inner
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        loop {
            budget.replenish(Instant::now(), settings);
            if budget.reservoir >= cost {
                break;
            }
            if !settings.replenishes() {
                return Err(RateLimitError::ReservoirDepleted);
            }
            trace!(
                reservoir = budget.reservoir,
                cost,
                "Reservoir empty, waiting for replenishment"
            );
            sleep_until(budget.next_refill).await;
        }

        if let Some(last) = budget.last_dispatch {
            let earliest = last + settings.min_time;
            if earliest > Instant::now() {
                sleep_until(earliest).await;
            }
        }

        budget.reservoir -= cost;
        budget.last_dispatch = Some(Instant::now());

        RateLimiterMetrics::record_permit(wait_started.elapsed(), budget.reservoir);

        Ok(RatePermit { _slot: slot })
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire a concurrency slot
    #[error("failed to acquire rate limit permits: {0}")]
    AcquireError(String),

    /// The requested cost can never be covered by the reservoir
    #[error("permit cost {cost} exceeds reservoir capacity {capacity}")]
    CostExceedsCapacity { cost: u32, capacity: u32 },

    /// Reservoir is empty and replenishment is disabled
    #[error("rate limit reservoir depleted and replenishment is disabled")]
    ReservoirDepleted,
}
