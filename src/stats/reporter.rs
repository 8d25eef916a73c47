// src/stats/reporter.rs
use crossbeam_channel::{Receiver, Sender, select, tick};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Point-in-time copy of the mining counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Total number of hashes computed
    pub hashes_total: u64,
    /// Work units handed to the execution group
    pub work_dispatched: u64,
    /// Solutions produced by the execution group
    pub solutions_found: u64,
    /// Solutions the node accepted
    pub solutions_submitted: u64,
    /// Submissions that failed
    pub submit_failures: u64,
    /// Solutions dropped because their challenge was no longer current
    pub stale_solutions: u64,
    /// Average hashrate since start (hashes per second)
    pub avg_hashrate: f64,
}

/// Counters shared by the coordinator, the miners and the solution handler
#[derive(Debug)]
pub struct MiningStats {
    hashes: AtomicU64,
    dispatched: AtomicU64,
    found: AtomicU64,
    submitted: AtomicU64,
    failed: AtomicU64,
    stale: AtomicU64,
    start_time: Instant,
}

impl Default for MiningStats {
    fn default() -> Self {
        MiningStats {
            hashes: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            found: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            stale: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl MiningStats {
    /// Creates a fresh, shareable set of counters
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds `count` computed hashes
    pub fn record_hashes(&self, count: u64) {
        self.hashes.fetch_add(count, Ordering::Relaxed);
    }

    /// Counts one work unit handed to the miners
    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one solution produced by the miners
    pub fn record_found(&self) {
        self.found.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one accepted submission
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one failed submission
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one solution dropped as stale or duplicate
    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the current mining statistics
    pub fn snapshot(&self) -> StatsSnapshot {
        let seconds = self.start_time.elapsed().as_secs_f64().max(1.0);
        let hashes = self.hashes.load(Ordering::Relaxed);

        StatsSnapshot {
            hashes_total: hashes,
            work_dispatched: self.dispatched.load(Ordering::Relaxed),
            solutions_found: self.found.load(Ordering::Relaxed),
            solutions_submitted: self.submitted.load(Ordering::Relaxed),
            submit_failures: self.failed.load(Ordering::Relaxed),
            stale_solutions: self.stale.load(Ordering::Relaxed),
            avg_hashrate: hashes as f64 / seconds,
        }
    }
}

/// Periodically logs mining statistics on a background thread
pub struct StatsReporter {
    stats: Arc<MiningStats>,
    report_interval: Duration,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl StatsReporter {
    /// Creates a new StatsReporter with the specified reporting interval
    ///
    /// # Arguments
    /// * `stats` - Counters to report on
    /// * `report_interval` - How often to log statistics
    pub fn new(stats: Arc<MiningStats>, report_interval: Duration) -> Self {
        StatsReporter {
            stats,
            report_interval,
            stop_tx: None,
            thread: None,
        }
    }

    /// Starts the periodic reporting of statistics
    ///
    /// Calling it on a reporter that is already running does nothing.
    pub fn start_reporting(&mut self) {
        if self.thread.is_some() {
            return;
        }
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let stats = self.stats.clone();
        let interval = self.report_interval;

        self.stop_tx = Some(stop_tx);
        self.thread = Some(std::thread::spawn(move || report_loop(stats, interval, stop_rx)));
    }

    /// Stops the reporting thread and logs one final summary
    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            log_summary(&self.stats.snapshot());
        }
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn report_loop(stats: Arc<MiningStats>, interval: Duration, stop_rx: Receiver<()>) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => log_summary(&stats.snapshot()),
            // Disconnect is the only message
            recv(stop_rx) -> _ => return,
        }
    }
}

fn log_summary(s: &StatsSnapshot) {
    log::info!(
        "Hashrate: {:.2} H/s | Work: {} | Found/Submitted/Failed/Stale: {}/{}/{}/{}",
        s.avg_hashrate,
        s.work_dispatched,
        s.solutions_found,
        s.solutions_submitted,
        s.submit_failures,
        s.stale_solutions
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = MiningStats::new();
        stats.record_hashes(500);
        stats.record_hashes(250);
        stats.record_dispatch();
        stats.record_found();
        stats.record_submitted();
        stats.record_failure();
        stats.record_stale();
        stats.record_stale();

        let s = stats.snapshot();
        assert_eq!(s.hashes_total, 750);
        assert_eq!(s.work_dispatched, 1);
        assert_eq!(s.solutions_found, 1);
        assert_eq!(s.solutions_submitted, 1);
        assert_eq!(s.submit_failures, 1);
        assert_eq!(s.stale_solutions, 2);
        assert!(s.avg_hashrate > 0.0);
    }

    #[test]
    fn reporter_stops_promptly() {
        let mut reporter = StatsReporter::new(MiningStats::new(), Duration::from_secs(3600));
        reporter.start_reporting();
        let started = Instant::now();
        reporter.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
