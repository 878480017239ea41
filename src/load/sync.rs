//! Completion gate for the three phases of a load.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Schema,
    Data,
    Constraints,
}

const PHASES: [Phase; 3] = [Phase::Schema, Phase::Data, Phase::Constraints];

/// One permit per phase; [`BackupLoaderSync::wait`] returns once all three
/// are released. A failure releases them all.
#[derive(Debug)]
pub struct BackupLoaderSync {
    schema: AtomicBool,
    data: AtomicBool,
    constraints: AtomicBool,
    failed: AtomicBool,
    remaining: watch::Sender<usize>,
}

impl Default for BackupLoaderSync {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupLoaderSync {
    pub fn new() -> Self {
        Self {
            schema: AtomicBool::new(false),
            data: AtomicBool::new(false),
            constraints: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            remaining: watch::Sender::new(PHASES.len()),
        }
    }

    fn permit(&self, phase: Phase) -> &AtomicBool {
        match phase {
            Phase::Schema => &self.schema,
            Phase::Data => &self.data,
            Phase::Constraints => &self.constraints,
        }
    }

    /// Releases a phase's permit; returns false if it was already released
    pub fn release(&self, phase: Phase) -> bool {
        let released = self
            .permit(phase)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if released {
            debug!(?phase, "Phase released");
            self.remaining.send_modify(|n| *n = n.saturating_sub(1));
        }
        released
    }

    pub fn is_released(&self, phase: Phase) -> bool {
        self.permit(phase).load(Ordering::Acquire)
    }

    pub fn load_failed(&self) {
        self.failed.store(true, Ordering::Release);
        for phase in PHASES {
            self.release(phase);
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    pub async fn wait(&self) {
        let mut receiver = self.remaining.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = receiver.wait_for(|n| *n == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_release_once() {
        let sync = BackupLoaderSync::new();
        assert!(sync.release(Phase::Data));
        assert!(!sync.release(Phase::Data), "second release is a no-op");
        assert_eq!(sync.remaining(), 2);
        assert!(sync.is_released(Phase::Data));
        assert!(!sync.is_released(Phase::Schema));
    }

    #[tokio::test]
    async fn test_wait_for_all_phases() {
        let sync = Arc::new(BackupLoaderSync::new());
        let waiter = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.wait().await })
        };

        sync.release(Phase::Schema);
        sync.release(Phase::Constraints);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "data is still pending");

        sync.release(Phase::Data);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should return once every phase is released")
            .unwrap();
    }

    #[tokio::test]
    async fn test_failure_releases_everything() {
        let sync = BackupLoaderSync::new();
        sync.release(Phase::Schema);
        sync.load_failed();
        assert!(sync.is_failed());
        assert_eq!(sync.remaining(), 0);
        tokio::time::timeout(Duration::from_secs(1), sync.wait())
            .await
            .expect("failure should unblock wait");

        // Late releases after a failure do not underflow
        assert!(!sync.release(Phase::Data));
        assert_eq!(sync.remaining(), 0);
    }
}
