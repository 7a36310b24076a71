//! # Key Presser
//!
//! A macro engine that presses or holds a key on a timer, started and stopped
//! with a global hotkey.
//!
//! ## Features
//!
//! - Hold mode (repeated key-down) and periodic mode (press-and-release)
//! - Optional Shift modifier and Shift chords such as `shift+w+a`
//! - Global start/stop hotkey with a Shift fallback binding
//! - Resident injection helper process, re-spawned if it dies
//! - Status broadcast to any number of observers
//!
//! ## Example
//!
//! ```no_run
//! use key_presser::config::{AppConfig, MacroConfig, Mode};
//! use key_presser::helper::HelperProcess;
//! use key_presser::hotkey::{self, GlobalHotkeyBackend, HotkeyRegistrar};
//! use key_presser::injector::InjectionChannel;
//! use key_presser::runtime::Runtime;
//!
//! # async fn demo() -> key_presser::Result<()> {
//! let app = AppConfig::default();
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let registrar = HotkeyRegistrar::new(Box::new(GlobalHotkeyBackend::start()?));
//! let injector = InjectionChannel::new(Box::new(HelperProcess::new(app.engine.helper.clone())));
//! let _forwarder = hotkey::forward_hotkey_events(tx);
//! let (runtime, handle) = Runtime::new(app.engine, injector, registrar, rx);
//!
//! tokio::spawn(async move {
//!     let config = MacroConfig {
//!         target_key: "a".to_string(),
//!         mode: Mode::Periodic,
//!         interval: 100,
//!         start_stop_shortcut: "F1".to_string(),
//!         ..MacroConfig::default()
//!     };
//!     handle.apply(config).await
//! });
//! runtime.run(std::future::pending()).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! An optional JSON file can seed the first configuration:
//!
//! ```json
//! {
//!   "macro": {
//!     "targetKey": "w",
//!     "mode": "HOLD",
//!     "startStopShortcut": "F1",
//!     "useShift": true
//!   },
//!   "engine": { "hold_tick": "30ms", "keep_on_top": "1s" }
//! }
//! ```

pub mod cli;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod helper;
pub mod hotkey;
pub mod injector;
pub mod keymap;
pub mod process_tree;
pub mod runtime;
pub mod scheduler;
pub mod status;
pub mod test_support;

pub use config::{AppConfig, MacroConfig, Mode};
pub use engine::Engine;
pub use error::{MacroError, Result};
pub use hotkey::HotkeyRegistrar;
pub use injector::InjectionChannel;
pub use runtime::{EngineHandle, Runtime};
