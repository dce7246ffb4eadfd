//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps the periodic counters
/// to get a consistent snapshot.
pub struct Metrics {
    /// Total location samples ever received (monotonic)
    samples_total: AtomicU64,
    /// Samples since last report (reset on report)
    samples_since_report: AtomicU64,
    /// Samples accepted into a session (monotonic)
    samples_accepted: AtomicU64,
    /// Samples rejected by validation or session state (monotonic)
    samples_rejected: AtomicU64,
    /// Samples dropped because no session is registered (monotonic)
    samples_unmatched: AtomicU64,
    /// Messages published to the broker (monotonic)
    publishes_total: AtomicU64,
    /// Publish attempts that needed a retry (monotonic)
    publish_retries: AtomicU64,
    /// Publishes that exhausted all retry attempts (monotonic)
    publish_failures: AtomicU64,
    /// Control commands received (monotonic)
    control_commands: AtomicU64,
    /// Acknowledgements sent for control commands (monotonic)
    acks_sent: AtomicU64,
    /// Geofence boundary violations observed (monotonic)
    boundary_violations: AtomicU64,
    /// Broker reconnects observed (monotonic)
    reconnects: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples_total: AtomicU64::new(0),
            samples_since_report: AtomicU64::new(0),
            samples_accepted: AtomicU64::new(0),
            samples_rejected: AtomicU64::new(0),
            samples_unmatched: AtomicU64::new(0),
            publishes_total: AtomicU64::new(0),
            publish_retries: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            control_commands: AtomicU64::new(0),
            acks_sent: AtomicU64::new(0),
            boundary_violations: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a location sample arriving from the broker (lock-free)
    #[inline]
    pub fn record_sample_received(&self) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        self.samples_since_report.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sample accepted into a session (lock-free)
    #[inline]
    pub fn record_sample_accepted(&self) {
        self.samples_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sample rejected by validation or session state (lock-free)
    #[inline]
    pub fn record_sample_rejected(&self) {
        self.samples_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sample with no registered session (lock-free)
    #[inline]
    pub fn record_sample_unmatched(&self) {
        self.samples_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful publish (lock-free)
    #[inline]
    pub fn record_publish(&self) {
        self.publishes_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a publish retry attempt (lock-free)
    #[inline]
    pub fn record_publish_retry(&self) {
        self.publish_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a publish that exhausted all retries (lock-free)
    #[inline]
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a control command received (lock-free)
    #[inline]
    pub fn record_control_command(&self) {
        self.control_commands.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acknowledgement sent (lock-free)
    #[inline]
    pub fn record_ack_sent(&self) {
        self.acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a geofence boundary violation (lock-free)
    #[inline]
    pub fn record_boundary_violation(&self) {
        self.boundary_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a broker reconnect (lock-free)
    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total samples received
    #[inline]
    pub fn samples_total(&self) -> u64 {
        self.samples_total.load(Ordering::Relaxed)
    }

    /// Get total samples accepted
    #[inline]
    pub fn samples_accepted(&self) -> u64 {
        self.samples_accepted.load(Ordering::Relaxed)
    }

    /// Get total samples rejected
    #[inline]
    pub fn samples_rejected(&self) -> u64 {
        self.samples_rejected.load(Ordering::Relaxed)
    }

    /// Get total boundary violations observed
    #[inline]
    pub fn boundary_violations(&self) -> u64 {
        self.boundary_violations.load(Ordering::Relaxed)
    }

    /// Get total acknowledgements sent
    #[inline]
    pub fn acks_sent(&self) -> u64 {
        self.acks_sent.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset the periodic counter
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self, active_sessions: usize) -> MetricsSummary {
        let samples_count = self.samples_since_report.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let samples_per_sec = if elapsed.as_secs_f64() > 0.0 {
            samples_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            samples_total: self.samples_total.load(Ordering::Relaxed),
            samples_per_sec,
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
            samples_unmatched: self.samples_unmatched.load(Ordering::Relaxed),
            publishes_total: self.publishes_total.load(Ordering::Relaxed),
            publish_retries: self.publish_retries.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            control_commands: self.control_commands.load(Ordering::Relaxed),
            acks_sent: self.acks_sent.load(Ordering::Relaxed),
            boundary_violations: self.boundary_violations.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            active_sessions,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub samples_total: u64,
    pub samples_per_sec: f64,
    pub samples_accepted: u64,
    pub samples_rejected: u64,
    pub samples_unmatched: u64,
    pub publishes_total: u64,
    pub publish_retries: u64,
    pub publish_failures: u64,
    pub control_commands: u64,
    pub acks_sent: u64,
    pub boundary_violations: u64,
    pub reconnects: u64,
    pub active_sessions: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            samples_total = %self.samples_total,
            samples_per_sec = format!("{:.1}", self.samples_per_sec),
            accepted = %self.samples_accepted,
            rejected = %self.samples_rejected,
            unmatched = %self.samples_unmatched,
            publishes = %self.publishes_total,
            publish_retries = %self.publish_retries,
            publish_failures = %self.publish_failures,
            control_commands = %self.control_commands,
            acks_sent = %self.acks_sent,
            boundary_violations = %self.boundary_violations,
            reconnects = %self.reconnects,
            active_sessions = %self.active_sessions,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.samples_total(), 0);
        assert_eq!(metrics.acks_sent(), 0);
    }

    #[test]
    fn test_record_samples() {
        let metrics = Metrics::new();

        metrics.record_sample_received();
        metrics.record_sample_accepted();
        metrics.record_sample_received();
        metrics.record_sample_rejected();

        assert_eq!(metrics.samples_total(), 2);
        assert_eq!(metrics.samples_accepted(), 1);
        assert_eq!(metrics.samples_rejected.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_report_resets_periodic_counter() {
        let metrics = Metrics::new();

        metrics.record_sample_received();
        metrics.record_sample_received();
        metrics.record_sample_received();
        metrics.record_publish();

        let summary = metrics.report(4);

        assert_eq!(summary.samples_total, 3);
        assert_eq!(summary.publishes_total, 1);
        assert_eq!(summary.active_sessions, 4);

        // Periodic counter resets, monotonic counters do not
        assert_eq!(metrics.samples_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.samples_total(), 3);
    }

    #[test]
    fn test_report_empty() {
        let metrics = Metrics::new();
        let summary = metrics.report(0);

        assert_eq!(summary.samples_total, 0);
        assert_eq!(summary.boundary_violations, 0);
        assert_eq!(summary.samples_per_sec, 0.0);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        // Spawn 10 threads, each recording 1000 samples
        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    m.record_sample_received();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.samples_total(), 10_000);
    }
}
