//! One-shot timers for the engine.
//!
//! Every scheduled timer gets a [`TimerId`]; when it fires the scheduler
//! reports that id back to the engine, which ignores ids it no longer owns.
//! A cancelled timer therefore can never inject, even if it already fired
//! and its event is still queued.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::trace;

/// Identifier of one scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What a timer is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Next injection step of the macro loop.
    Tick,
    /// Re-assert the floating status surface as topmost.
    KeepOnTop,
}

/// Schedules one-shot callbacks.
pub trait Scheduler {
    /// Arrange for `id` to be delivered after `delay`.
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerId;

    /// Cancel a pending timer. Unknown or already fired ids are ignored.
    fn cancel(&mut self, id: TimerId);
}

/// Timer firing delivered to the engine's event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerFired {
    pub id: TimerId,
    pub kind: TimerKind,
}

/// Scheduler backed by tokio sleep tasks that post back into a channel.
pub struct TokioScheduler {
    next_id: u64,
    tx: UnboundedSender<TimerFired>,
    pending: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(tx: UnboundedSender<TimerFired>) -> Self {
        Self {
            next_id: 0,
            tx,
            pending: HashMap::new(),
        }
    }

    /// Number of timers that have not yet fired or been cancelled.
    pub fn pending(&self) -> usize {
        self.pending.values().filter(|h| !h.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        self.pending.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired { id, kind });
        });
        trace!(timer = id.0, ?kind, delay_ms = delay.as_millis() as u64, "timer_scheduled");
        self.pending.insert(id, handle);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.pending.remove(&id) {
            handle.abort();
            trace!(timer = id.0, "timer_cancelled");
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}

/// Scheduler driven by hand, for tests and embedders that own their clock.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    pending: Vec<(TimerId, Duration, TimerKind)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timers currently waiting to fire, oldest first.
    pub fn pending(&self) -> &[(TimerId, Duration, TimerKind)] {
        &self.pending
    }

    /// Pending timers of one kind.
    pub fn pending_of(&self, kind: TimerKind) -> Vec<TimerId> {
        self.pending
            .iter()
            .filter(|(_, _, k)| *k == kind)
            .map(|(id, _, _)| *id)
            .collect()
    }

    /// Delay the given timer was scheduled with.
    pub fn delay_of(&self, id: TimerId) -> Option<Duration> {
        self.pending
            .iter()
            .find(|(pending, _, _)| *pending == id)
            .map(|(_, delay, _)| *delay)
    }

    /// Remove the oldest pending timer of `kind` and return its firing, as
    /// if its delay had elapsed.
    pub fn fire_next(&mut self, kind: TimerKind) -> Option<TimerFired> {
        let index = self.pending.iter().position(|(_, _, k)| *k == kind)?;
        let (id, _, kind) = self.pending.remove(index);
        Some(TimerFired { id, kind })
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.pending.push((id, delay, kind));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.pending.retain(|(pending, _, _)| *pending != id);
    }
}
