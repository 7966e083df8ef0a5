//! Periodic sweep driver
//!
//! Each subsystem (suppression, weight tuning, escalation) is a
//! [`SweepTask`] driven by [`spawn_periodic`]:
//!
//! ```text
//! interval.tick() ──► gate free? ──yes──► spawn run (gate held until done)
//!                          │
//!                          no ──► drop tick
//! ```
//!
//! At most one run per task is in flight. Ticks that land while a run is
//! still going are dropped, never queued. Tests call the governor's sweep
//! methods directly instead of going through the timer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GovernanceResult;

/// One periodic unit of work.
#[async_trait]
pub trait SweepTask: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn run(&self) -> GovernanceResult<()>;
}

/// In-flight guard shared by every tick of one task.
#[derive(Debug, Clone, Default)]
pub struct SweepGate {
    busy: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl SweepGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate, or `None` if a run is already in flight.
    pub fn try_enter(&self) -> Option<SweepGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(SweepGuard {
                busy: self.busy.clone(),
            })
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Ticks dropped because a run was still in flight.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Releases the gate on drop.
#[derive(Debug)]
pub struct SweepGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Drive `task` every `period` until `cancel` fires.
///
/// The first tick fires immediately. Returns the handle of the ticker loop;
/// runs already spawned finish on their own after cancellation.
pub fn spawn_periodic(
    task: Arc<dyn SweepTask>,
    period: Duration,
    gate: SweepGate,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(task = task.name(), period_ms = period.as_millis() as u64, "Sweep scheduled");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(task = task.name(), "Sweep stopped");
                    break;
                }
                _ = interval.tick() => {
                    let Some(guard) = gate.try_enter() else {
                        debug!(task = task.name(), "Previous run still in flight, tick dropped");
                        continue;
                    };
                    let task = task.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        if let Err(e) = task.run().await {
                            warn!(task = task.name(), error = %e, "Sweep run failed");
                        }
                    });
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct SlowTask {
        starts: Arc<AtomicUsize>,
        work: Duration,
    }

    #[async_trait]
    impl SweepTask for SlowTask {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn run(&self) -> GovernanceResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            Ok(())
        }
    }

    #[test]
    fn test_gate_admits_one_holder() {
        let gate = SweepGate::new();
        let guard = gate.try_enter();
        assert!(guard.is_some());
        assert!(gate.is_busy());
        assert!(gate.try_enter().is_none());
        assert_eq!(gate.dropped(), 1);

        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_ticks_are_dropped() {
        let starts = Arc::new(AtomicUsize::new(0));
        let task = Arc::new(SlowTask {
            starts: starts.clone(),
            work: Duration::from_millis(250),
        });
        let gate = SweepGate::new();
        let cancel = CancellationToken::new();

        let handle = spawn_periodic(task, Duration::from_millis(100), gate.clone(), cancel.clone());

        // Runs start at 0, 300, 600, 900; ticks in between find the gate held.
        tokio::time::sleep(Duration::from_millis(950)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(starts.load(Ordering::SeqCst), 4);
        assert_eq!(gate.dropped(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticking() {
        let starts = Arc::new(AtomicUsize::new(0));
        let task = Arc::new(SlowTask {
            starts: starts.clone(),
            work: Duration::from_millis(1),
        });
        let cancel = CancellationToken::new();
        let handle = spawn_periodic(task, Duration::from_secs(60), SweepGate::new(), cancel.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        handle.await.unwrap();
        let after_cancel = starts.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(starts.load(Ordering::SeqCst), after_cancel);
        assert_eq!(after_cancel, 1);
    }
}
