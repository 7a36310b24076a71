//! Event loop owning the engine.
//!
//! Hotkey presses, timer firings, control requests and the shutdown signal
//! all arrive on channels and are applied to the [`Engine`] one at a time.
//! Nothing else ever touches the engine, the helper process or the hotkey
//! baseline.

use crate::config::{EngineSettings, MacroConfig};
use crate::engine::Engine;
use crate::error::{MacroError, Result};
use crate::hotkey::{HotkeyId, HotkeyRegistrar, Registered};
use crate::injector::InjectionChannel;
use crate::scheduler::{TimerFired, TokioScheduler};
use crate::status::{EngineStatus, FloatingSurface};
use std::future::Future;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

/// Requests from the control surface.
#[derive(Debug)]
pub enum ControlRequest {
    /// Replace the configuration and rebind the shortcut.
    Apply(MacroConfig, oneshot::Sender<Result<Registered>>),
    /// Stop the running macro (the floating stop button).
    Stop,
    /// End the event loop and shut the engine down.
    Quit,
}

/// Cloneable handle for talking to a running [`Runtime`].
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<ControlRequest>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    /// Push a configuration and wait for the registration outcome.
    pub async fn apply(&self, config: MacroConfig) -> Result<Registered> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControlRequest::Apply(config, reply_tx))
            .map_err(|_| MacroError::EngineClosed)?;
        reply_rx.await.map_err(|_| MacroError::EngineClosed)?
    }

    pub fn stop(&self) {
        let _ = self.tx.send(ControlRequest::Stop);
    }

    pub fn quit(&self) {
        let _ = self.tx.send(ControlRequest::Quit);
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }
}

pub struct Runtime {
    engine: Engine<TokioScheduler>,
    timers: mpsc::UnboundedReceiver<TimerFired>,
    hotkeys: mpsc::UnboundedReceiver<HotkeyId>,
    control: mpsc::UnboundedReceiver<ControlRequest>,
}

impl Runtime {
    /// Build the engine. `hotkeys` carries the ids of pressed global hotkeys.
    pub fn new(
        settings: EngineSettings,
        injector: InjectionChannel,
        registrar: HotkeyRegistrar,
        hotkeys: mpsc::UnboundedReceiver<HotkeyId>,
    ) -> (Self, EngineHandle) {
        let (timer_tx, timers) = mpsc::unbounded_channel();
        let (control_tx, control) = mpsc::unbounded_channel();
        let engine = Engine::new(settings, injector, registrar, TokioScheduler::new(timer_tx));
        let handle = EngineHandle {
            tx: control_tx,
            status: engine.subscribe(),
        };
        let runtime = Self {
            engine,
            timers,
            hotkeys,
            control,
        };
        (runtime, handle)
    }

    pub fn add_surface(&mut self, surface: Box<dyn FloatingSurface>) {
        self.engine.add_surface(surface);
    }

    /// Process events until `shutdown` completes, a [`ControlRequest::Quit`]
    /// arrives, or every event source is gone. The engine is shut down before
    /// this returns.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!("macro engine ready");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                Some(request) = self.control.recv() => match request {
                    ControlRequest::Apply(config, reply) => {
                        let result = self.engine.apply(config).await;
                        let _ = reply.send(result);
                    }
                    ControlRequest::Stop => self.engine.stop(),
                    ControlRequest::Quit => {
                        info!("quit requested");
                        break;
                    }
                },
                Some(id) = self.hotkeys.recv() => self.engine.on_hotkey(id),
                Some(fired) = self.timers.recv() => self.engine.on_timer(fired),
                else => {
                    debug!("all event sources closed");
                    break;
                }
            }
        }

        self.engine.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::test_support::{RecordingBackend, ScriptedHotkeys};
    use std::time::Duration;

    #[tokio::test]
    async fn test_quit_shuts_engine_down() {
        let injected = RecordingBackend::new();
        let hotkeys = ScriptedHotkeys::new();
        let (_hk_tx, hk_rx) = mpsc::unbounded_channel();
        let (runtime, handle) = Runtime::new(
            EngineSettings {
                reregister_delay: Duration::ZERO,
                ..EngineSettings::default()
            },
            InjectionChannel::new(Box::new(injected.clone())),
            HotkeyRegistrar::new(Box::new(hotkeys.clone())),
            hk_rx,
        );
        let task = tokio::spawn(runtime.run(std::future::pending()));

        let registered = handle
            .apply(MacroConfig {
                mode: Mode::Periodic,
                start_stop_shortcut: "F1".to_string(),
                ..MacroConfig::default()
            })
            .await
            .unwrap();
        assert_eq!(registered.chords, vec!["F1"]);

        handle.quit();
        task.await.unwrap();

        assert_eq!(injected.shutdowns(), 1);
        assert!(hotkeys.active().is_empty());
        assert!(matches!(
            handle.apply(MacroConfig::default()).await,
            Err(MacroError::EngineClosed)
        ));
    }
}
