//! Status broadcasting to the control surface and the floating status surface.

use crate::config::MacroConfig;
use crate::scheduler::{Scheduler, TimerId, TimerKind};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::trace;

/// Snapshot pushed to every observer on start, stop and config update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub config: Option<MacroConfig>,
}

/// A status surface that should stay above other windows while a macro runs.
pub trait FloatingSurface: Send {
    /// Push the surface back to the top of the window stack.
    fn reassert_topmost(&self);
}

/// Fans engine state out to subscribers and keeps floating surfaces on top
/// for the duration of a run.
pub struct StatusSynchronizer {
    tx: watch::Sender<EngineStatus>,
    surfaces: Vec<Box<dyn FloatingSurface>>,
    keep_on_top: Option<TimerId>,
    period: Duration,
}

impl StatusSynchronizer {
    pub fn new(period: Duration) -> Self {
        let (tx, _) = watch::channel(EngineStatus::default());
        Self {
            tx,
            surfaces: Vec::new(),
            keep_on_top: None,
            period,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.tx.subscribe()
    }

    pub fn add_surface(&mut self, surface: Box<dyn FloatingSurface>) {
        self.surfaces.push(surface);
    }

    pub fn current(&self) -> EngineStatus {
        self.tx.borrow().clone()
    }

    pub fn publish_running(&self, running: bool) {
        self.tx.send_modify(|status| status.running = running);
    }

    pub fn publish_config(&self, config: &MacroConfig) {
        self.tx
            .send_modify(|status| status.config = Some(config.clone()));
    }

    /// Start keep-on-top reinforcement for a new run.
    pub fn begin_run(&mut self, scheduler: &mut dyn Scheduler) {
        self.end_run(scheduler);
        for surface in &self.surfaces {
            surface.reassert_topmost();
        }
        self.keep_on_top = Some(scheduler.schedule(self.period, TimerKind::KeepOnTop));
    }

    /// Cancel keep-on-top reinforcement. Safe to call when no run is active.
    pub fn end_run(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(id) = self.keep_on_top.take() {
            scheduler.cancel(id);
        }
    }

    /// Handle a keep-on-top firing. Stale ids are ignored.
    pub fn on_keep_on_top(&mut self, id: TimerId, scheduler: &mut dyn Scheduler) {
        if self.keep_on_top != Some(id) {
            trace!(?id, "stale keep-on-top timer");
            return;
        }
        for surface in &self.surfaces {
            surface.reassert_topmost();
        }
        self.keep_on_top = Some(scheduler.schedule(self.period, TimerKind::KeepOnTop));
    }

    pub fn keep_on_top_active(&self) -> bool {
        self.keep_on_top.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use crate::test_support::CountingSurface;

    #[test]
    fn test_publish_reaches_subscribers() {
        let status = StatusSynchronizer::new(Duration::from_secs(1));
        let rx = status.subscribe();

        status.publish_config(&MacroConfig::default());
        status.publish_running(true);

        let seen = rx.borrow().clone();
        assert!(seen.running);
        assert_eq!(seen.config, Some(MacroConfig::default()));
        assert_eq!(status.current(), seen);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let status = StatusSynchronizer::new(Duration::from_secs(1));
        status.publish_running(true);
        assert!(status.current().running);
    }

    #[test]
    fn test_keep_on_top_lifecycle() {
        let surface = CountingSurface::new();
        let mut status = StatusSynchronizer::new(Duration::from_secs(1));
        status.add_surface(Box::new(surface.clone()));
        let mut scheduler = ManualScheduler::new();

        status.begin_run(&mut scheduler);
        assert_eq!(surface.count(), 1);
        assert_eq!(scheduler.pending_of(TimerKind::KeepOnTop).len(), 1);

        let fired = scheduler.fire_next(TimerKind::KeepOnTop).unwrap();
        status.on_keep_on_top(fired.id, &mut scheduler);
        assert_eq!(surface.count(), 2);
        assert_eq!(scheduler.pending_of(TimerKind::KeepOnTop).len(), 1);

        status.on_keep_on_top(fired.id, &mut scheduler);
        assert_eq!(surface.count(), 2);

        status.end_run(&mut scheduler);
        status.end_run(&mut scheduler);
        assert!(scheduler.pending().is_empty());
        assert!(!status.keep_on_top_active());
    }
}
