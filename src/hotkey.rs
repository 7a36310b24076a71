//! Global start/stop hotkey registration.
//!
//! [`HotkeyRegistrar`] decides *what* to bind: the configured chord plus a
//! Shift-prefixed fallback when the macro itself holds Shift (a held Shift
//! turns the bare chord into a different key event). [`HotkeyBackend`] is the
//! OS seam; [`GlobalHotkeyBackend`] implements it with the `global-hotkey`
//! crate on a dedicated thread that also pumps the platform message queue.

use crate::config::MacroConfig;
use crate::error::{MacroError, Result};
use crate::keymap;
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Longest the engine waits for the hotkey thread to answer a request. The
/// thread polls its queue every 10 ms, so a healthy round trip is far
/// shorter.
const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Identifier the OS layer assigns to a registered chord.
pub type HotkeyId = u32;

/// OS facility for binding global chords.
pub trait HotkeyBackend: Send {
    fn register(&mut self, chord: &str) -> Result<HotkeyId>;
    fn unregister(&mut self, id: HotkeyId) -> Result<()>;
}

/// Chords bound by a successful [`HotkeyRegistrar::register`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registered {
    pub chords: Vec<String>,
}

/// Chords to try for a configuration, primary first.
pub fn candidate_chords(config: &MacroConfig) -> Vec<String> {
    let primary = config.start_stop_shortcut.trim().to_string();
    let has_shift = keymap::chord_parts(&primary)
        .iter()
        .any(|part| part.eq_ignore_ascii_case("shift"));
    let wants_fallback = config.use_shift || keymap::label(&config.target_key).contains("Shift");

    let mut chords = vec![primary.clone()];
    if wants_fallback && !has_shift {
        chords.push(format!("Shift+{primary}"));
    }
    chords
}

/// Owns the start/stop chord bindings and skips redundant re-registration.
pub struct HotkeyRegistrar {
    backend: Box<dyn HotkeyBackend>,
    last_shortcut: Option<String>,
    last_use_shift: Option<bool>,
    owned: Vec<(HotkeyId, String)>,
}

impl HotkeyRegistrar {
    pub fn new(backend: Box<dyn HotkeyBackend>) -> Self {
        Self {
            backend,
            last_shortcut: None,
            last_use_shift: None,
            owned: Vec::new(),
        }
    }

    /// Whether `config` would bind exactly what is already bound.
    pub fn is_current(&self, config: &MacroConfig) -> bool {
        self.last_shortcut.as_deref() == Some(config.start_stop_shortcut.as_str())
            && self.last_use_shift == Some(config.use_shift)
    }

    /// Chords currently bound.
    pub fn registered(&self) -> Registered {
        Registered {
            chords: self.owned.iter().map(|(_, chord)| chord.clone()).collect(),
        }
    }

    /// Whether a fired hotkey id belongs to us.
    pub fn owns(&self, id: HotkeyId) -> bool {
        self.owned.iter().any(|(owned, _)| *owned == id)
    }

    /// Release every chord and forget the baseline. Safe to repeat.
    pub fn unregister_all(&mut self) {
        for (id, chord) in self.owned.drain(..) {
            match self.backend.unregister(id) {
                Ok(()) => debug!(chord = %chord, "hotkey unregistered"),
                Err(e) => warn!("failed to unregister hotkey '{}': {}", chord, e),
            }
        }
        self.last_shortcut = None;
        self.last_use_shift = None;
    }

    /// Bind every candidate chord for `config`. Succeeds when at least one
    /// chord was accepted; only then does `config` become the baseline.
    /// Callers unregister and wait beforehand (see [`crate::engine::Engine::apply`]).
    pub fn register(&mut self, config: &MacroConfig) -> Result<Registered> {
        let mut failures = Vec::new();
        for chord in candidate_chords(config) {
            match self.backend.register(&chord) {
                Ok(id) => {
                    info!(chord = %chord, "hotkey registered");
                    self.owned.push((id, chord));
                }
                Err(e) => {
                    debug!(chord = %chord, "hotkey rejected: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        if self.owned.is_empty() {
            return Err(MacroError::registration(
                &config.start_stop_shortcut,
                failures.join("; "),
            ));
        }

        self.last_shortcut = Some(config.start_stop_shortcut.clone());
        self.last_use_shift = Some(config.use_shift);
        Ok(self.registered())
    }
}

enum Request {
    Register(String, mpsc::SyncSender<Result<HotkeyId>>),
    Unregister(HotkeyId, mpsc::SyncSender<Result<()>>),
}

/// [`HotkeyBackend`] on top of the `global-hotkey` crate.
///
/// The manager lives on its own thread: on Windows registrations belong to
/// the thread that created the manager, and that thread must keep pumping
/// messages for presses to be reported.
pub struct GlobalHotkeyBackend {
    requests: Option<mpsc::Sender<Request>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl GlobalHotkeyBackend {
    pub fn start() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let thread = thread::Builder::new()
            .name("hotkeys".to_string())
            .spawn(move || match GlobalHotKeyManager::new() {
                Ok(manager) => {
                    let _ = ready_tx.send(Ok(()));
                    serve(&manager, &rx);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                requests: Some(tx),
                thread: Some(thread),
            }),
            Ok(Err(reason)) => Err(MacroError::registration(
                "*",
                format!("hotkey manager unavailable: {reason}"),
            )),
            Err(_) => Err(MacroError::registration("*", "hotkey thread exited")),
        }
    }

    fn request<T>(
        &self,
        build: impl FnOnce(mpsc::SyncSender<Result<T>>) -> Request,
    ) -> Result<T> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| MacroError::registration("*", "hotkey thread stopped"))?;
        round_trip(requests, build, REPLY_TIMEOUT)
    }
}

/// Send one request to the hotkey thread and wait at most `timeout` for its
/// answer. This runs on the engine's event loop, so the wait is bounded.
fn round_trip<T>(
    requests: &mpsc::Sender<Request>,
    build: impl FnOnce(mpsc::SyncSender<Result<T>>) -> Request,
    timeout: Duration,
) -> Result<T> {
    let (reply_tx, reply_rx) = mpsc::sync_channel(1);
    requests
        .send(build(reply_tx))
        .map_err(|_| MacroError::registration("*", "hotkey thread stopped"))?;
    match reply_rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(MacroError::registration(
            "*",
            format!("hotkey thread did not answer within {}ms", timeout.as_millis()),
        )),
        Err(RecvTimeoutError::Disconnected) => {
            Err(MacroError::registration("*", "hotkey thread stopped"))
        }
    }
}

impl HotkeyBackend for GlobalHotkeyBackend {
    fn register(&mut self, chord: &str) -> Result<HotkeyId> {
        let chord = chord.to_string();
        self.request(|reply| Request::Register(chord, reply))
    }

    fn unregister(&mut self, id: HotkeyId) -> Result<()> {
        self.request(|reply| Request::Unregister(id, reply))
    }
}

impl Drop for GlobalHotkeyBackend {
    fn drop(&mut self) {
        self.requests = None;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Request loop of the hotkey thread. Ends when the backend is dropped.
fn serve(manager: &GlobalHotKeyManager, requests: &mpsc::Receiver<Request>) {
    let mut registered: HashMap<HotkeyId, HotKey> = HashMap::new();
    loop {
        pump_messages();
        match requests.recv_timeout(Duration::from_millis(10)) {
            Ok(Request::Register(chord, reply)) => {
                let result = parse_hotkey(&chord).and_then(|hotkey| {
                    manager
                        .register(hotkey)
                        .map_err(|e| MacroError::registration(&chord, e.to_string()))?;
                    registered.insert(hotkey.id(), hotkey);
                    Ok(hotkey.id())
                });
                let _ = reply.send(result);
            }
            Ok(Request::Unregister(id, reply)) => {
                let result = match registered.remove(&id) {
                    Some(hotkey) => manager
                        .unregister(hotkey)
                        .map_err(|e| MacroError::registration(format!("{hotkey:?}"), e.to_string())),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for (_, hotkey) in registered {
        let _ = manager.unregister(hotkey);
    }
}

#[cfg(windows)]
fn pump_messages() {
    use winapi::um::winuser::{DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE};

    // SAFETY: MSG is plain data and is only read after PeekMessageW filled it.
    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        while PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

#[cfg(not(windows))]
fn pump_messages() {}

/// Forward presses of any global hotkey to `tx` until `tx` is closed.
pub fn forward_hotkey_events(tx: UnboundedSender<HotkeyId>) -> tokio::task::JoinHandle<()> {
    let receiver = GlobalHotKeyEvent::receiver();
    tokio::task::spawn_blocking(move || loop {
        if tx.is_closed() {
            break;
        }
        if let Ok(event) = receiver.recv_timeout(Duration::from_millis(100)) {
            if event.state == HotKeyState::Pressed && tx.send(event.id).is_err() {
                break;
            }
        }
    })
}

/// Parse an accelerator such as `"F1"`, `"Shift+F1"` or `"CommandOrControl+S"`.
pub fn parse_hotkey(chord: &str) -> Result<HotKey> {
    let parts = keymap::chord_parts(chord);
    if parts.is_empty() {
        return Err(MacroError::invalid_key(chord, "empty hotkey"));
    }

    let mut modifiers = Modifiers::empty();
    let mut code = None;

    for part in &parts {
        match part.to_lowercase().as_str() {
            "commandorcontrol" | "cmdorctrl" | "commandorctrl" | "cmdorcontrol" => {
                if cfg!(target_os = "macos") {
                    modifiers |= Modifiers::SUPER;
                } else {
                    modifiers |= Modifiers::CONTROL;
                }
            }
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "alt" | "option" => modifiers |= Modifiers::ALT,
            "shift" => modifiers |= Modifiers::SHIFT,
            "super" | "cmd" | "command" | "meta" => modifiers |= Modifiers::SUPER,
            key => {
                if code.is_some() {
                    return Err(MacroError::invalid_key(
                        chord,
                        "more than one non-modifier key",
                    ));
                }
                code = Some(parse_code(key)?);
            }
        }
    }

    let code = code.ok_or_else(|| MacroError::invalid_key(chord, "no key in hotkey"))?;
    let modifiers = (!modifiers.is_empty()).then_some(modifiers);
    Ok(HotKey::new(modifiers, code))
}

fn parse_code(key: &str) -> Result<Code> {
    let code = match key {
        "space" => Code::Space,
        "enter" | "return" => Code::Enter,
        "tab" => Code::Tab,
        "escape" | "esc" => Code::Escape,
        "backspace" => Code::Backspace,
        "delete" | "del" => Code::Delete,
        "insert" | "ins" => Code::Insert,
        "home" => Code::Home,
        "end" => Code::End,
        "pageup" => Code::PageUp,
        "pagedown" => Code::PageDown,
        "up" | "arrowup" => Code::ArrowUp,
        "down" | "arrowdown" => Code::ArrowDown,
        "left" | "arrowleft" => Code::ArrowLeft,
        "right" | "arrowright" => Code::ArrowRight,
        "capslock" => Code::CapsLock,
        "numlock" => Code::NumLock,
        "scrolllock" => Code::ScrollLock,
        "printscreen" => Code::PrintScreen,
        "plus" | "=" => Code::Equal,
        "minus" | "-" => Code::Minus,
        "comma" | "," => Code::Comma,
        "period" | "." => Code::Period,
        _ => {
            let mut chars = key.chars();
            let name = match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => {
                    format!("Key{}", c.to_ascii_uppercase())
                }
                (Some(c), None) if c.is_ascii_digit() => format!("Digit{c}"),
                _ => key.to_uppercase(),
            };
            Code::from_str(&name)
                .map_err(|_| MacroError::invalid_key(key, "unsupported hotkey key"))?
        }
    };
    Ok(code)
}
