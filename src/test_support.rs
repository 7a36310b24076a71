//! In-memory stand-ins for the OS-facing seams, used by unit and
//! integration tests.

use crate::error::{MacroError, Result};
use crate::hotkey::{HotkeyBackend, HotkeyId};
use crate::injector::{InjectCommand, InjectionBackend};
use crate::status::FloatingSurface;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Ordered record of side effects shared by several stand-ins, for checking
/// the order of calls across seams.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[derive(Default)]
struct Recording {
    log: Option<EventLog>,
    lines: Vec<String>,
    fail_next: usize,
    starts: usize,
    shutdowns: usize,
}

/// Injection backend that records every command line it is given.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append delivered commands and shutdowns to `log`.
    pub fn with_log(log: &EventLog) -> Self {
        let backend = Self::default();
        backend.inner().log = Some(log.clone());
        backend
    }

    fn inner(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every command delivered so far, in protocol form.
    pub fn lines(&self) -> Vec<String> {
        self.inner().lines.clone()
    }

    pub fn clear(&self) {
        self.inner().lines.clear();
    }

    /// Make the next `n` sends fail.
    pub fn fail_next(&self, n: usize) {
        self.inner().fail_next = n;
    }

    pub fn starts(&self) -> usize {
        self.inner().starts
    }

    pub fn shutdowns(&self) -> usize {
        self.inner().shutdowns
    }
}

impl InjectionBackend for RecordingBackend {
    fn ensure_started(&mut self) -> Result<()> {
        self.inner().starts += 1;
        Ok(())
    }

    fn send(&mut self, command: &InjectCommand) -> Result<()> {
        let mut inner = self.inner();
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(MacroError::helper_unavailable("scripted failure"));
        }
        let line = command.to_string();
        if let Some(log) = &inner.log {
            log.push(line.clone());
        }
        inner.lines.push(line);
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut inner = self.inner();
        inner.shutdowns += 1;
        if let Some(log) = &inner.log {
            log.push("shutdown");
        }
    }
}

#[derive(Default)]
struct Script {
    log: Option<EventLog>,
    next_id: HotkeyId,
    active: BTreeMap<HotkeyId, String>,
    rejected: HashSet<String>,
    register_calls: usize,
    unregister_calls: usize,
}

/// Hotkey backend with scriptable rejections, standing in for chords owned by
/// other processes.
#[derive(Clone, Default)]
pub struct ScriptedHotkeys {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedHotkeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append unregistrations to `log`.
    pub fn with_log(log: &EventLog) -> Self {
        let backend = Self::default();
        backend.inner().log = Some(log.clone());
        backend
    }

    fn inner(&self) -> MutexGuard<'_, Script> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Refuse every future registration of `chord`.
    pub fn reject(&self, chord: &str) {
        self.inner().rejected.insert(chord.to_string());
    }

    /// Id of an active registration for `chord`.
    pub fn id_of(&self, chord: &str) -> Option<HotkeyId> {
        self.inner()
            .active
            .iter()
            .find(|(_, registered)| registered.as_str() == chord)
            .map(|(id, _)| *id)
    }

    /// Chords currently registered.
    pub fn active(&self) -> Vec<String> {
        self.inner().active.values().cloned().collect()
    }

    pub fn register_calls(&self) -> usize {
        self.inner().register_calls
    }

    pub fn unregister_calls(&self) -> usize {
        self.inner().unregister_calls
    }
}

impl HotkeyBackend for ScriptedHotkeys {
    fn register(&mut self, chord: &str) -> Result<HotkeyId> {
        let mut inner = self.inner();
        inner.register_calls += 1;
        if inner.rejected.contains(chord) {
            return Err(MacroError::registration(
                chord,
                "hotkey already registered by another application",
            ));
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.active.insert(id, chord.to_string());
        Ok(id)
    }

    fn unregister(&mut self, id: HotkeyId) -> Result<()> {
        let mut inner = self.inner();
        inner.unregister_calls += 1;
        if let Some(chord) = inner.active.remove(&id) {
            if let Some(log) = &inner.log {
                log.push(format!("unregister({chord})"));
            }
        }
        Ok(())
    }
}

/// Floating surface that counts how often it was pushed to the top.
#[derive(Clone, Default)]
pub struct CountingSurface {
    count: Arc<AtomicUsize>,
}

impl CountingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl FloatingSurface for CountingSurface {
    fn reassert_topmost(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
