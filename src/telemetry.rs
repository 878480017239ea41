//! Load progress: telemetry events from the loader, aggregated statistics
//! and progress bars.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backup::Chunk;
use crate::load::{BackupLoaderManager, CompletedWork, LoadListener, LoadTable};

/// Telemetry events sent from load workers to the progress task
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// Every row of a chunk was handed to the commit executor
    ChunkCompleted {
        rows: u64,
        bytes: u64,
        duration_ms: u64,
    },
    TableCompleted,
    ConstraintCompleted,
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub tables_completed: u64,
    pub chunks_completed: u64,
    pub constraints_completed: u64,
    pub rows_loaded: u64,
    pub bytes_processed: u64,
    pub chunk_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::ChunkCompleted {
                rows,
                bytes,
                duration_ms,
            } => {
                self.chunks_completed += 1;
                self.rows_loaded += rows;
                self.bytes_processed += bytes;
                self.chunk_durations_ms.push(*duration_ms);
            }
            TelemetryEvent::TableCompleted => self.tables_completed += 1,
            TelemetryEvent::ConstraintCompleted => self.constraints_completed += 1,
        }
    }

    /// Percentile of chunk durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.chunk_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.chunk_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}

/// Expected totals for the progress bars
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressTotals {
    pub tables: u64,
    pub chunks: u64,
    pub rows: u64,
    pub constraints: u64,
}

/// Turns load hooks into telemetry events
pub struct ProgressListener {
    tx: mpsc::UnboundedSender<TelemetryEvent>,
    started: Mutex<HashMap<String, Instant>>,
}

impl ProgressListener {
    pub fn new(tx: mpsc::UnboundedSender<TelemetryEvent>) -> Self {
        Self {
            tx,
            started: Mutex::new(HashMap::new()),
        }
    }

    fn send(&self, event: TelemetryEvent) {
        // The progress task may already be gone
        let _ = self.tx.send(event);
    }
}

impl LoadListener for ProgressListener {
    fn chunk_started(&self, _table: &LoadTable, chunk: &Chunk) {
        if let Ok(mut started) = self.started.lock() {
            started.insert(chunk.name.clone(), Instant::now());
        }
    }

    fn chunk_completed(&self, _table: &LoadTable, chunk: &Chunk) {
        let started = self
            .started
            .lock()
            .ok()
            .and_then(|mut started| started.remove(&chunk.name));
        self.send(TelemetryEvent::ChunkCompleted {
            rows: chunk.row_count,
            bytes: chunk.size,
            duration_ms: started.map_or(0, |s| s.elapsed().as_millis() as u64),
        });
    }

    fn work_completed(&self, _manager: &Arc<BackupLoaderManager>, work: &CompletedWork<'_>) {
        match work {
            CompletedWork::Table(_) => self.send(TelemetryEvent::TableCompleted),
            CompletedWork::Constraint(_) => self.send(TelemetryEvent::ConstraintCompleted),
        }
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// Starts the progress bars. The task ends once every sender, i.e. the
/// returned listener, is dropped.
pub fn setup_progress_tracking(totals: ProgressTotals) -> (ProgressListener, JoinHandle<ProgressStats>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let multi_progress = MultiProgress::new();

    let tables_bar = multi_progress.add(ProgressBar::new(totals.tables));
    tables_bar.set_style(bar_style(
        "[{elapsed_precise}] Tables:      [{bar:30.cyan/blue}] {pos}/{len} ({percent}%)",
    ));
    let chunks_bar = multi_progress.add(ProgressBar::new(totals.chunks));
    chunks_bar.set_style(bar_style(
        "[{elapsed_precise}] Chunks:      [{bar:30.cyan/blue}] {pos}/{len} ({percent}%)",
    ));
    let rows_bar = multi_progress.add(ProgressBar::new(totals.rows));
    rows_bar.set_style(bar_style(
        "[{elapsed_precise}] Rows:        [{bar:30.green/blue}] {human_pos}/{human_len} ({percent}%) | {per_sec}",
    ));
    let constraints_bar = multi_progress.add(ProgressBar::new(totals.constraints));
    constraints_bar.set_style(bar_style(
        "[{elapsed_precise}] Constraints: [{bar:30.yellow/blue}] {pos}/{len} ({percent}%)",
    ));
    let stats_bar = multi_progress.add(ProgressBar::new(0));
    stats_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] Chunk Time:  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let handle = tokio::spawn(async move {
        let mut stats = ProgressStats::new();

        while let Some(event) = rx.recv().await {
            stats.update(&event);

            tables_bar.set_position(stats.tables_completed);
            chunks_bar.set_position(stats.chunks_completed);
            rows_bar.set_position(stats.rows_loaded);
            constraints_bar.set_position(stats.constraints_completed);

            if let (Some(p50), Some(p90), Some(p99)) = stats.get_percentiles() {
                stats_bar.set_message(format!("p50: {}ms, p90: {}ms, p99: {}ms", p50, p90, p99));
            }
        }

        tables_bar.finish();
        chunks_bar.finish();
        rows_bar.finish();
        constraints_bar.finish();
        stats_bar.finish();
        stats
    });

    (ProgressListener::new(tx), handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_update() {
        let mut stats = ProgressStats::new();
        for (rows, duration_ms) in [(100, 30), (50, 10), (25, 20)] {
            stats.update(&TelemetryEvent::ChunkCompleted {
                rows,
                bytes: rows * 10,
                duration_ms,
            });
        }
        stats.update(&TelemetryEvent::TableCompleted);
        stats.update(&TelemetryEvent::ConstraintCompleted);

        assert_eq!(stats.chunks_completed, 3);
        assert_eq!(stats.rows_loaded, 175);
        assert_eq!(stats.bytes_processed, 1750);
        assert_eq!(stats.tables_completed, 1);
        assert_eq!(stats.constraints_completed, 1);
        assert_eq!(stats.get_percentiles(), (Some(20), Some(30), Some(30)));
    }

    #[test]
    fn test_percentile_without_samples() {
        assert_eq!(ProgressStats::new().percentile(50.0), None);
    }

    #[tokio::test]
    async fn test_progress_task_ends_with_listener() {
        let (listener, handle) = setup_progress_tracking(ProgressTotals::default());
        listener.send(TelemetryEvent::TableCompleted);
        listener.send(TelemetryEvent::ConstraintCompleted);
        drop(listener);

        let stats = handle.await.unwrap();
        assert_eq!(stats.tables_completed, 1);
        assert_eq!(stats.constraints_completed, 1);
    }
}
