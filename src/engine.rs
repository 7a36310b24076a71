//! The macro execution engine.
//!
//! [`Engine`] owns the IDLE/RUNNING state machine, the tick timer, the
//! injection channel, the hotkey registrar and the status synchronizer. It is
//! driven by one caller at a time (see [`crate::runtime`]), so none of its
//! state is locked.
//!
//! Ticks are one-shot timers that reschedule themselves only while the
//! engine is still running. `stop()` cancels the pending tick and forgets its
//! id, so a timer that already fired cannot inject anything afterwards.

use crate::config::{EngineSettings, MacroConfig, Mode};
use crate::error::Result;
use crate::hotkey::{HotkeyId, HotkeyRegistrar, Registered};
use crate::injector::InjectionChannel;
use crate::keymap::Token;
use crate::scheduler::{Scheduler, TimerFired, TimerId, TimerKind};
use crate::status::{EngineStatus, FloatingSurface, StatusSynchronizer};
use std::cmp;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

pub struct Engine<S: Scheduler> {
    settings: EngineSettings,
    injector: InjectionChannel,
    registrar: HotkeyRegistrar,
    status: StatusSynchronizer,
    scheduler: S,
    running: bool,
    /// Config of the current run; kept until stop has released its keys.
    active: Option<MacroConfig>,
    /// Most recent config pushed by the control surface.
    latest: Option<MacroConfig>,
    tick: Option<TimerId>,
    shut_down: bool,
}

impl<S: Scheduler> Engine<S> {
    pub fn new(
        settings: EngineSettings,
        mut injector: InjectionChannel,
        registrar: HotkeyRegistrar,
        scheduler: S,
    ) -> Self {
        if settings.helper.eager {
            injector.ensure_started();
        }
        let status = StatusSynchronizer::new(settings.keep_on_top);
        Self {
            settings,
            injector,
            registrar,
            status,
            scheduler,
            running: false,
            active: None,
            latest: None,
            tick: None,
            shut_down: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        self.status.current()
    }

    pub fn add_surface(&mut self, surface: Box<dyn FloatingSurface>) {
        self.status.add_surface(surface);
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Delay between ticks for `config`.
    pub fn effective_interval(&self, config: &MacroConfig) -> Duration {
        match config.mode {
            Mode::Hold => self.settings.hold_tick,
            Mode::Periodic => cmp::max(
                self.settings.interval_floor,
                Duration::from_millis(config.interval),
            ),
        }
    }

    /// Take a new configuration from the control surface and bind its
    /// start/stop shortcut.
    ///
    /// Re-applying an unchanged shortcut and Shift setting does not touch the
    /// OS registration. Otherwise a running macro is stopped, old chords are
    /// released, and after `reregister_delay` the new candidates are bound.
    /// On failure no chord is active and the error says why.
    pub async fn apply(&mut self, config: MacroConfig) -> Result<Registered> {
        self.status.publish_config(&config);
        self.latest = Some(config.clone());

        if self.registrar.is_current(&config) {
            debug!(shortcut = %config.start_stop_shortcut, "shortcut unchanged");
            return Ok(self.registrar.registered());
        }

        if self.running {
            info!("stopping macro to rebind the start/stop shortcut");
            self.stop();
        }
        self.registrar.unregister_all();

        if !self.settings.reregister_delay.is_zero() {
            tokio::time::sleep(self.settings.reregister_delay).await;
        }

        let result = self.registrar.register(&config);
        if let Err(e) = &result {
            warn!("{}", e);
        }
        result
    }

    /// Begin a run. Does nothing while already running.
    pub fn start(&mut self, config: MacroConfig) {
        if self.running || self.shut_down {
            return;
        }
        if config.repeat_count > 0 {
            debug!(
                repeat_count = config.repeat_count,
                "repeat count is not enforced, running until stopped"
            );
        }

        self.injector.ensure_started();
        let delay = self.effective_interval(&config);
        info!(
            key = %config.target_key,
            mode = ?config.mode,
            interval_ms = delay.as_millis() as u64,
            shift = config.use_shift,
            "macro started"
        );
        self.active = Some(config);
        self.running = true;

        self.status.publish_running(true);
        self.status.begin_run(&mut self.scheduler);
        self.tick = Some(self.scheduler.schedule(delay, TimerKind::Tick));
    }

    /// End the current run. Does nothing while idle.
    ///
    /// Hold runs, and any run that used Shift, release the full chord and
    /// then Shift on its own so no key stays latched down.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        if let Some(id) = self.tick.take() {
            self.scheduler.cancel(id);
        }
        self.status.end_run(&mut self.scheduler);
        self.running = false;

        if let Some(config) = self.active.take() {
            if config.mode == Mode::Hold || config.use_shift {
                self.injector.key_up(&config.final_keys());
                self.injector.key_up(&[Token::SHIFT]);
            }
        }

        info!("macro stopped");
        self.status.publish_running(false);
    }

    /// Stop when running, otherwise start with the latest configuration.
    pub fn toggle(&mut self) {
        if self.running {
            self.stop();
            return;
        }
        match self.latest.clone() {
            Some(config) => self.start(config),
            None => warn!("start requested before any configuration was applied"),
        }
    }

    /// A global hotkey fired.
    pub fn on_hotkey(&mut self, id: HotkeyId) {
        if self.registrar.owns(id) {
            self.toggle();
        } else {
            trace!(id, "ignoring foreign hotkey");
        }
    }

    /// A scheduled timer fired.
    pub fn on_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::Tick => {
                if self.tick != Some(fired.id) {
                    trace!(id = ?fired.id, "stale tick");
                    return;
                }
                self.tick = None;
                self.run_tick();
            }
            TimerKind::KeepOnTop => {
                if self.running {
                    self.status.on_keep_on_top(fired.id, &mut self.scheduler);
                }
            }
        }
    }

    fn run_tick(&mut self) {
        if !self.running {
            return;
        }
        let (keys, mode, delay) = match &self.active {
            Some(config) => (config.final_keys(), config.mode, self.effective_interval(config)),
            None => return,
        };

        match mode {
            Mode::Hold => self.injector.key_down(&keys),
            Mode::Periodic => self.injector.press_and_release(&keys),
        }

        if self.running {
            self.tick = Some(self.scheduler.schedule(delay, TimerKind::Tick));
        }
    }

    /// Stop the loop, kill the injection helper tree, then release every
    /// hotkey. Later calls do nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        info!("shutting down engine");

        self.stop();
        self.injector.shutdown();
        self.registrar.unregister_all();
    }
}

impl<S: Scheduler> Drop for Engine<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
