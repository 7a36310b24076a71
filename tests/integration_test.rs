use anyhow::Result;
use key_presser::config::{AppConfig, EngineSettings, MacroConfig, Mode};
use key_presser::engine::Engine;
use key_presser::hotkey::HotkeyRegistrar;
use key_presser::injector::InjectionChannel;
use key_presser::keymap;
use key_presser::runtime::{EngineHandle, Runtime};
use key_presser::scheduler::{ManualScheduler, TimerKind};
use key_presser::status::EngineStatus;
use key_presser::test_support::{RecordingBackend, ScriptedHotkeys};
use key_presser::MacroError;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::{mpsc, watch};

fn settings() -> EngineSettings {
    EngineSettings {
        reregister_delay: Duration::ZERO,
        ..EngineSettings::default()
    }
}

fn manual_engine(
    injected: &RecordingBackend,
    hotkeys: &ScriptedHotkeys,
) -> Engine<ManualScheduler> {
    Engine::new(
        settings(),
        InjectionChannel::new(Box::new(injected.clone())),
        HotkeyRegistrar::new(Box::new(hotkeys.clone())),
        ManualScheduler::new(),
    )
}

fn spawn_runtime(
    injected: &RecordingBackend,
    hotkeys: &ScriptedHotkeys,
) -> (
    EngineHandle,
    mpsc::UnboundedSender<u32>,
    tokio::task::JoinHandle<()>,
) {
    let (hotkey_tx, hotkey_rx) = mpsc::unbounded_channel();
    let (runtime, handle) = Runtime::new(
        settings(),
        InjectionChannel::new(Box::new(injected.clone())),
        HotkeyRegistrar::new(Box::new(hotkeys.clone())),
        hotkey_rx,
    );
    let task = tokio::spawn(runtime.run(std::future::pending()));
    (handle, hotkey_tx, task)
}

async fn wait_for_running(rx: &mut watch::Receiver<EngineStatus>, running: bool) {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.running == running))
        .await
        .expect("status change timed out")
        .expect("status channel closed");
}

fn count(lines: &[String], line: &str) -> usize {
    lines.iter().filter(|l| l.as_str() == line).count()
}

#[tokio::test]
async fn test_periodic_run_toggled_by_hotkey() {
    let injected = RecordingBackend::new();
    let hotkeys = ScriptedHotkeys::new();
    let (handle, hotkey_tx, task) = spawn_runtime(&injected, &hotkeys);
    let mut status = handle.subscribe();

    let config = MacroConfig {
        target_key: "a".to_string(),
        mode: Mode::Periodic,
        interval: 100,
        start_stop_shortcut: "F1".to_string(),
        use_shift: false,
        ..MacroConfig::default()
    };
    let registered = handle.apply(config).await.unwrap();
    assert_eq!(registered.chords, vec!["F1"]);
    let f1 = hotkeys.id_of("F1").unwrap();

    hotkey_tx.send(f1).unwrap();
    wait_for_running(&mut status, true).await;
    tokio::time::sleep(Duration::from_millis(350)).await;

    hotkey_tx.send(f1).unwrap();
    wait_for_running(&mut status, false).await;
    let at_stop = injected.lines();
    let presses = count(&at_stop, "pressRelease(65)");
    assert!((2..=4).contains(&presses), "got {presses} presses");
    assert_eq!(presses, at_stop.len());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(injected.lines(), at_stop);
    assert!(!status.borrow().running);

    handle.quit();
    task.await.unwrap();
}

#[tokio::test]
async fn test_stop_request_from_floating_surface() {
    let injected = RecordingBackend::new();
    let hotkeys = ScriptedHotkeys::new();
    let (handle, hotkey_tx, task) = spawn_runtime(&injected, &hotkeys);
    let mut status = handle.subscribe();

    handle
        .apply(MacroConfig {
            target_key: "w".to_string(),
            mode: Mode::Hold,
            start_stop_shortcut: "F2".to_string(),
            ..MacroConfig::default()
        })
        .await
        .unwrap();
    hotkey_tx.send(hotkeys.id_of("F2").unwrap()).unwrap();
    wait_for_running(&mut status, true).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.stop();
    wait_for_running(&mut status, false).await;

    let lines = injected.lines();
    assert!(count(&lines, "down(87)") >= 1);
    assert_eq!(&lines[lines.len() - 2..], ["up(87)", "up(16)"]);

    handle.quit();
    task.await.unwrap();
    assert_eq!(injected.shutdowns(), 1);
}

#[test]
fn test_hold_with_shift_sequence() {
    let injected = RecordingBackend::new();
    let hotkeys = ScriptedHotkeys::new();
    let mut engine = manual_engine(&injected, &hotkeys);

    engine.start(MacroConfig {
        target_key: "w".to_string(),
        mode: Mode::Hold,
        use_shift: true,
        ..MacroConfig::default()
    });
    for _ in 0..3 {
        let fired = engine.scheduler_mut().fire_next(TimerKind::Tick).unwrap();
        engine.on_timer(fired);
    }
    engine.stop();

    let lines = injected.lines();
    assert_eq!(&lines[..2], ["down(16)", "down(87)"]);
    assert_eq!(count(&lines, "down(16)"), 3);
    assert_eq!(count(&lines, "down(87)"), 3);
    assert_eq!(&lines[lines.len() - 3..], ["up(87)", "up(16)", "up(16)"]);
    assert!(engine.scheduler().pending().is_empty());
}

#[test]
fn test_key_up_mirrors_key_down_for_every_chord() {
    for chord in keymap::TARGET_KEYS {
        let injected = RecordingBackend::new();
        let mut channel = InjectionChannel::new(Box::new(injected.clone()));
        let tokens = keymap::resolve_chord(chord);

        channel.key_down(&tokens);
        let downs = injected.lines();
        injected.clear();
        channel.key_up(&tokens);
        let ups = injected.lines();

        assert_eq!(downs.len(), keymap::chord_parts(chord).len());
        assert_eq!(ups.len(), downs.len());
        let mirrored: Vec<String> = downs
            .iter()
            .rev()
            .map(|line| line.replacen("down", "up", 1))
            .collect();
        assert_eq!(ups, mirrored, "chord {chord}");
    }
}

#[tokio::test]
async fn test_reapplying_same_shortcut_skips_os_calls() {
    let injected = RecordingBackend::new();
    let hotkeys = ScriptedHotkeys::new();
    let mut engine = manual_engine(&injected, &hotkeys);
    let config = MacroConfig {
        start_stop_shortcut: "F1".to_string(),
        ..MacroConfig::default()
    };

    engine.apply(config.clone()).await.unwrap();
    engine.apply(config).await.unwrap();

    assert_eq!(hotkeys.register_calls(), 1);
    assert_eq!(hotkeys.unregister_calls(), 0);
}

#[tokio::test]
async fn test_shortcut_owned_elsewhere_fails_and_leaves_engine_idle() {
    let injected = RecordingBackend::new();
    let hotkeys = ScriptedHotkeys::new();
    hotkeys.reject("F9");
    let mut engine = manual_engine(&injected, &hotkeys);

    let err = engine
        .apply(MacroConfig {
            start_stop_shortcut: "F9".to_string(),
            ..MacroConfig::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, MacroError::Registration { .. }));
    assert!(err.to_string().contains("F9"));
    assert!(!engine.is_running());
    assert!(hotkeys.active().is_empty());
    assert!(injected.lines().is_empty());
}

#[test]
fn test_config_file_seeds_macro_and_engine() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    let json = r#"
    {
        "macro": {
            "targetKey": "shift+w+a",
            "mode": "HOLD",
            "interval": 100,
            "repeatCount": 0,
            "startStopShortcut": "F1",
            "useShift": false
        },
        "engine": {
            "hold_tick": "40ms",
            "interval_floor": 25,
            "keep_on_top": "2s",
            "helper": { "eager": true }
        }
    }
    "#;
    file.write_all(json.as_bytes())?;

    let app = AppConfig::from_file(file.path().to_str().unwrap())?;
    assert_eq!(app.macro_config.target_key, "shift+w+a");
    assert_eq!(app.macro_config.mode, Mode::Hold);
    assert_eq!(app.engine.hold_tick, Duration::from_millis(40));
    assert_eq!(app.engine.interval_floor, Duration::from_millis(25));
    assert_eq!(app.engine.keep_on_top, Duration::from_secs(2));
    assert_eq!(app.engine.reregister_delay, Duration::from_millis(50));
    assert!(app.engine.helper.eager);
    assert_eq!(app.engine.helper.program, "powershell.exe");
    assert!(app.validate().is_ok());
    Ok(())
}

#[test]
fn test_missing_config_file_reports_path() {
    let err = AppConfig::from_file("/nonexistent/key-presser.json").unwrap_err();
    assert!(matches!(err, MacroError::ConfigLoad { .. }));
    assert!(err.to_string().contains("/nonexistent/key-presser.json"));
}
