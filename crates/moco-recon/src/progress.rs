//! Progress tracking and cancellation for the projection drivers.
//!
//! The drivers report once per processed projection. A callback can ask the
//! driver to stop; the request is honoured before the next projection is
//! launched, never in the middle of one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Progress information for one driver step.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Driver name, for logging.
    pub stage: &'static str,
    /// Projections completed so far.
    pub completed: usize,
    /// Total projections in this call.
    pub total: usize,
    /// Projection number just processed.
    pub projection: i64,
    /// Time elapsed since the call started.
    pub elapsed: Duration,
}

impl ProgressInfo {
    /// Calculate progress percentage.
    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }

    /// Estimated remaining time, once at least one projection is done.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        let per_projection = self.elapsed.as_secs_f64() / self.completed as f64;
        let remaining = self.total.saturating_sub(self.completed);
        Some(Duration::from_secs_f64(per_projection * remaining as f64))
    }
}

/// What the driver should do after a progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Progress callback trait for monitoring the drivers.
pub trait ProgressCallback: Send + Sync {
    /// Called after each projection. Returning [`Control::Stop`] cancels the call.
    fn on_progress(&self, info: &ProgressInfo) -> Control;

    /// Called when a driver call starts.
    fn on_start(&self, _stage: &'static str, _total: usize) {
        // Default: no-op
    }

    /// Called when a driver call completes successfully.
    fn on_complete(&self, _info: &ProgressInfo) {
        // Default: no-op
    }
}

/// Logs progress through `tracing` every `log_interval` projections.
#[derive(Debug, Clone)]
pub struct TracingProgress {
    pub log_interval: usize,
}

impl Default for TracingProgress {
    fn default() -> Self {
        Self { log_interval: 10 }
    }
}

impl TracingProgress {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for TracingProgress {
    fn on_progress(&self, info: &ProgressInfo) -> Control {
        if info.completed % self.log_interval == 0 || info.completed == info.total {
            let remaining = info
                .estimated_remaining()
                .map(|d| format!("{:.2}s", d.as_secs_f64()))
                .unwrap_or_else(|| "N/A".to_string());
            tracing::info!(
                "{}: projection {} ({}/{}, {:.1}%) | Elapsed: {:.2}s | ETA: {}",
                info.stage,
                info.projection,
                info.completed,
                info.total,
                info.progress_percent(),
                info.elapsed.as_secs_f64(),
                remaining
            );
        }
        Control::Continue
    }

    fn on_start(&self, stage: &'static str, total: usize) {
        tracing::info!("{}: started ({} projections)", stage, total);
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!("{}: completed in {:.2}s", info.stage, info.elapsed.as_secs_f64());
    }
}

/// Cooperative cancellation flag, shareable across threads.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect before the next projection.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl ProgressCallback for CancellationToken {
    fn on_progress(&self, _info: &ProgressInfo) -> Control {
        if self.is_cancelled() {
            Control::Stop
        } else {
            Control::Continue
        }
    }
}

/// Records every report; used by tests and tools that post-process timings.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded history.
    pub fn get_history(&self) -> Vec<ProgressInfo> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) -> Control {
        if let Ok(mut history) = self.history.lock() {
            history.push(info.clone());
        }
        Control::Continue
    }
}

/// Fans reports out to several callbacks and tracks elapsed time.
///
/// Stops as soon as any callback asks to stop.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback.
    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.add_callback(callback);
        self
    }

    /// Begin a driver call.
    pub fn start(&self, stage: &'static str, total: usize) -> ProgressRun<'_> {
        for callback in &self.callbacks {
            callback.on_start(stage, total);
        }
        ProgressRun {
            tracker: self,
            stage,
            total,
            completed: 0,
            start: Instant::now(),
        }
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Per-call progress state handed out by [`ProgressTracker::start`].
pub struct ProgressRun<'a> {
    tracker: &'a ProgressTracker,
    stage: &'static str,
    total: usize,
    completed: usize,
    start: Instant,
}

impl ProgressRun<'_> {
    fn info(&self, projection: i64) -> ProgressInfo {
        ProgressInfo {
            stage: self.stage,
            completed: self.completed,
            total: self.total,
            projection,
            elapsed: self.start.elapsed(),
        }
    }

    /// Record that `projection` finished; returns whether to continue.
    pub fn step(&mut self, projection: i64) -> Control {
        self.completed += 1;
        let info = self.info(projection);
        let mut control = Control::Continue;
        for callback in &self.tracker.callbacks {
            if callback.on_progress(&info) == Control::Stop {
                control = Control::Stop;
            }
        }
        control
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Close the call successfully.
    pub fn finish(self, last_projection: i64) {
        let info = self.info(last_projection);
        for callback in &self.tracker.callbacks {
            callback.on_complete(&info);
        }
    }
}
