use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct PollHealthReport {
    pub uptime_seconds: u64,
    pub ticks: u64,
    pub fetches: u64,
    pub skipped_ticks: u64,
    pub failures: u64,
    pub discarded_results: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

/// Compteurs du polling, partagés entre la tâche de poll et l'API HTTP
#[derive(Clone)]
pub struct PollHealth {
    start_time: Instant,
    ticks: Arc<AtomicU64>,
    fetches: Arc<AtomicU64>,
    skipped_ticks: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    discarded: Arc<AtomicU64>,
    last_success: Arc<parking_lot::Mutex<Option<OffsetDateTime>>>,
    last_error: Arc<parking_lot::Mutex<Option<String>>>,
}

impl PollHealth {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            ticks: Arc::new(AtomicU64::new(0)),
            fetches: Arc::new(AtomicU64::new(0)),
            skipped_ticks: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
            discarded: Arc::new(AtomicU64::new(0)),
            last_success: Arc::new(parking_lot::Mutex::new(None)),
            last_error: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_started(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_tick(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        *self.last_success.lock() = Some(OffsetDateTime::now_utc());
        *self.last_error.lock() = None;
    }

    pub fn record_failure(&self, error: &str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> PollHealthReport {
        PollHealthReport {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            ticks: self.ticks.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            discarded_results: self.discarded.load(Ordering::Relaxed),
            last_success: *self.last_success.lock(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

impl Default for PollHealth {
    fn default() -> Self {
        Self::new()
    }
}
