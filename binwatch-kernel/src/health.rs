use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

use crate::config::KernelConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub alert_level: u8,
    pub history_retention_days: i64,
    pub bins_tracked: u32,
    pub bins_alerted: u32,
    pub history_records: u32,
    pub passes_run: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_pass_at: Option<OffsetDateTime>,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub memory_usage_mb: f32,
}

/// Compteurs partagés entre l'API, l'évaluateur et le dispatcher
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    passes_run: Arc<AtomicU64>,
    last_pass_at: Arc<parking_lot::Mutex<Option<OffsetDateTime>>>,
    notifications_sent: Arc<AtomicU64>,
    notifications_failed: Arc<AtomicU64>,
    bins_tracked: Arc<AtomicU64>,
    bins_alerted: Arc<AtomicU64>,
    history_records: Arc<AtomicU64>,
}

/// Taille des stores, publiée par l'évaluateur après chaque mutation.
/// `/system/health` la lit sans attendre la fin d'une passe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCounts {
    pub bins: usize,
    pub alerted: usize,
    pub history: usize,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            passes_run: Arc::new(AtomicU64::new(0)),
            last_pass_at: Arc::new(parking_lot::Mutex::new(None)),
            notifications_sent: Arc::new(AtomicU64::new(0)),
            notifications_failed: Arc::new(AtomicU64::new(0)),
            bins_tracked: Arc::new(AtomicU64::new(0)),
            bins_alerted: Arc::new(AtomicU64::new(0)),
            history_records: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_pass(&self, at: OffsetDateTime) {
        self.passes_run.fetch_add(1, Ordering::Relaxed);
        *self.last_pass_at.lock() = Some(at);
    }

    pub fn record_delivery(&self, ok: bool) {
        if ok {
            self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.notifications_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_counts(&self, counts: StoreCounts) {
        self.bins_tracked.store(counts.bins as u64, Ordering::Relaxed);
        self.bins_alerted.store(counts.alerted as u64, Ordering::Relaxed);
        self.history_records.store(counts.history as u64, Ordering::Relaxed);
    }

    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            bins: self.bins_tracked.load(Ordering::Relaxed) as usize,
            alerted: self.bins_alerted.load(Ordering::Relaxed) as usize,
            history: self.history_records.load(Ordering::Relaxed) as usize,
        }
    }

    /// (envoyées, échouées)
    pub fn deliveries(&self) -> (u64, u64) {
        (
            self.notifications_sent.load(Ordering::Relaxed),
            self.notifications_failed.load(Ordering::Relaxed),
        )
    }

    pub fn get_health(&self, cfg: &KernelConfig) -> KernelHealth {
        let (sent, failed) = self.deliveries();
        let counts = self.counts();
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            alert_level: cfg.alert_level,
            history_retention_days: cfg.history_retention_days,
            bins_tracked: counts.bins as u32,
            bins_alerted: counts.alerted as u32,
            history_records: counts.history as u32,
            passes_run: self.passes_run.load(Ordering::Relaxed),
            last_pass_at: *self.last_pass_at.lock(),
            notifications_sent: sent,
            notifications_failed: failed,
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb) = line.split_whitespace().nth(1).and_then(|s| s.parse::<u64>().ok()) {
                        return (kb as f32) / 1024.0; // KB -> MB
                    }
                }
            }
        }
    }

    0.0
}
