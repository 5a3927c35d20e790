//! Progress reporting for a run's pages.
//!
//! Pages settle out of order; the state counts settled pages and records so
//! far, and decides when another progress line is worth logging.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
const MIN_DOWNLOAD_DURATION: Duration = Duration::from_secs(10);

/// Controls update cadence.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    update_interval: Duration,
    min_percentage_step: f64,
}

impl ProgressTracker {
    /// Create a tracker with custom interval and percentage step.
    pub fn new(update_interval: Duration, min_percentage_step: f64) -> Self {
        Self {
            update_interval,
            min_percentage_step,
        }
    }

    /// Build a [`ProgressState`] for a run of `pages_total` pages.
    pub fn create_state(&self, pages_total: usize, records_expected: u64) -> ProgressState {
        let mut state = ProgressState::new(pages_total, records_expected);
        state.update_interval = self.update_interval;
        state.min_percentage_step = self.min_percentage_step;
        state
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INTERVAL, 10.0)
    }
}

/// Progress of one run.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Pages dispatched.
    pub pages_total: usize,
    /// Pages that finished, successfully or not.
    pub pages_settled: usize,
    /// Pages that failed.
    pub pages_failed: usize,
    /// Records received so far.
    pub records_downloaded: u64,
    /// Record count reported by the probe.
    pub records_expected: u64,
    pub start_time: Instant,
    pub last_update: Instant,
    pub update_interval: Duration,
    /// Last reported completion percentage (0-100).
    pub last_reported_percentage: f64,
    /// Minimum percentage delta required to emit a new update.
    pub min_percentage_step: f64,
}

impl ProgressState {
    pub fn new(pages_total: usize, records_expected: u64) -> Self {
        let now = Instant::now();
        Self {
            pages_total,
            pages_settled: 0,
            pages_failed: 0,
            records_downloaded: 0,
            records_expected,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            last_reported_percentage: 0.0,
            min_percentage_step: 10.0,
        }
    }

    /// Count a page that returned `records` records.
    pub fn record_page(&mut self, records: u64) {
        self.pages_settled += 1;
        self.records_downloaded = self.records_downloaded.saturating_add(records);
    }

    /// Count a page that failed.
    pub fn record_failure(&mut self) {
        self.pages_settled += 1;
        self.pages_failed += 1;
    }

    /// Whether a progress update should be emitted based on time or percentage.
    pub fn should_emit_update(&self) -> bool {
        if self.pages_settled == 0 {
            return false;
        }
        if self.pages_settled == self.pages_total {
            return true;
        }
        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }

        self.start_time.elapsed() >= MIN_DOWNLOAD_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting a progress log to reset timers and cached percentage.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Settled pages as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.pages_total == 0 {
            return 100.0;
        }
        (self.pages_settled as f64 / self.pages_total as f64) * 100.0
    }

    /// Estimate remaining time from the page completion rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let remaining = self.pages_total.saturating_sub(self.pages_settled);
        if self.pages_settled == 0 || remaining == 0 {
            return None;
        }
        let per_page = self.start_time.elapsed().as_secs_f64() / self.pages_settled as f64;
        Some(Duration::from_secs_f64(per_page * remaining as f64))
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} pages - {} of {} records",
            self.pages_settled, self.pages_total, self.records_downloaded, self.records_expected
        )];

        parts.push(format!("- {:.1}% complete", self.percentage()));

        if self.pages_failed > 0 {
            parts.push(format!("({} failed)", self.pages_failed));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
