//! Terminal host for the engine: a line-based control console and a status
//! line standing in for the floating status window.

use crate::config::{MacroConfig, Mode};
use crate::keymap;
use crate::runtime::EngineHandle;
use crate::status::{EngineStatus, FloatingSurface};
use colored::Colorize;
use std::io::BufRead;
use std::thread;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// One line typed into the console.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// The edited configuration, ready to be pushed wholesale.
    Apply(MacroConfig),
    Stop,
    Status,
    Keys,
    Help,
    Quit,
    Invalid(String),
}

/// Parse a console line against the configuration currently in effect.
pub fn parse_command(line: &str, current: &MacroConfig) -> ConsoleCommand {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let mut next = current.clone();

    match word.to_lowercase().as_str() {
        "" | "status" => return ConsoleCommand::Status,
        "stop" => return ConsoleCommand::Stop,
        "keys" => return ConsoleCommand::Keys,
        "help" | "?" => return ConsoleCommand::Help,
        "quit" | "exit" => return ConsoleCommand::Quit,
        "key" if !rest.is_empty() => next.target_key = rest.to_string(),
        "shortcut" if !rest.is_empty() => next.start_stop_shortcut = rest.to_string(),
        "key" | "shortcut" => return ConsoleCommand::Invalid(format!("'{word}' needs a value")),
        "mode" => match rest.parse::<Mode>() {
            Ok(mode) => next.mode = mode,
            Err(e) => return ConsoleCommand::Invalid(e.to_string()),
        },
        "interval" => match rest.parse::<u64>() {
            Ok(ms) => next.interval = ms,
            Err(_) => {
                return ConsoleCommand::Invalid(format!("'{rest}' is not a number of milliseconds"))
            }
        },
        "repeat" => match rest.parse::<u64>() {
            Ok(count) => next.repeat_count = count,
            Err(_) => return ConsoleCommand::Invalid(format!("'{rest}' is not a count")),
        },
        "shift" => match rest.to_lowercase().as_str() {
            "on" | "true" | "yes" => next.use_shift = true,
            "off" | "false" | "no" => next.use_shift = false,
            _ => return ConsoleCommand::Invalid("use 'shift on' or 'shift off'".to_string()),
        },
        other => return ConsoleCommand::Invalid(format!("unknown command '{other}'")),
    }
    ConsoleCommand::Apply(next)
}

/// Human-readable status, mirroring what the floating window shows.
pub fn status_line(status: &EngineStatus) -> String {
    let Some(config) = &status.config else {
        return "no configuration applied".to_string();
    };
    let target = keymap::label(&config.target_key);
    let shortcut = keymap::label(&config.start_stop_shortcut);
    let shift = if config.use_shift { " with Shift" } else { "" };

    if !status.running {
        return format!("idle, press '{shortcut}' to press '{target}'{shift}");
    }
    match config.mode {
        Mode::Periodic => format!(
            "MACRO RUNNING: pressing '{target}'{shift} every {}ms, press '{shortcut}' or type 'stop'",
            config.interval
        ),
        Mode::Hold => format!(
            "MACRO RUNNING: holding '{target}'{shift}, press '{shortcut}' or type 'stop'"
        ),
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  key <id>            target key, e.g. a, f5, pageup, shift+w+a");
    println!("  mode hold|periodic  input mode");
    println!("  interval <ms>       period for periodic mode");
    println!("  repeat <n>          repeat count (0 = until stopped)");
    println!("  shortcut <chord>    start/stop hotkey, e.g. F1, Shift+F1, Alt+X");
    println!("  shift on|off        hold Shift with the target key");
    println!("  stop                stop the running macro");
    println!("  status | keys | help | quit");
}

fn print_keys() {
    println!("{}", "Target keys:".bold());
    for key in keymap::TARGET_KEYS {
        println!("  {:<14} {}", key, keymap::label(key).dimmed());
    }
    println!("{}", "Shortcuts:".bold());
    for chord in keymap::SHORTCUT_KEYS {
        println!("  {:<24} {}", chord, keymap::label(chord).dimmed());
    }
}

/// Read stdin on a plain thread so a pending read never holds up runtime
/// shutdown. The thread ends at EOF or once the receiver is gone.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Drive the engine from console lines. The initial configuration is applied
/// before the first line is read.
pub async fn run_console(
    handle: EngineHandle,
    initial: MacroConfig,
    mut lines: mpsc::UnboundedReceiver<String>,
) {
    let mut current = initial;
    report_apply(&handle, current.clone()).await;

    while let Some(line) = lines.recv().await {
        match parse_command(&line, &current) {
            ConsoleCommand::Apply(next) => {
                if let Err(e) = next.validate() {
                    println!("{} {}", "✗".red(), e.to_string().red());
                    continue;
                }
                current = next;
                report_apply(&handle, current.clone()).await;
            }
            ConsoleCommand::Stop => handle.stop(),
            ConsoleCommand::Status => println!("{}", status_line(&handle.subscribe().borrow())),
            ConsoleCommand::Keys => print_keys(),
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Quit => {
                handle.quit();
                break;
            }
            ConsoleCommand::Invalid(reason) => println!("{} {}", "?".yellow(), reason),
        }
    }
    debug!("console input closed");
}

async fn report_apply(handle: &EngineHandle, config: MacroConfig) {
    match handle.apply(config).await {
        Ok(registered) => println!(
            "{} shortcut ready: {}",
            "✓".green(),
            registered.chords.join(", ").bold()
        ),
        Err(e) => println!("{} {}", "✗".red(), e.to_string().red()),
    }
}

/// Print the status line whenever the running state changes.
pub fn watch_status(mut rx: watch::Receiver<EngineStatus>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_running = rx.borrow().running;
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            if status.running == last_running {
                continue;
            }
            last_running = status.running;
            let line = status_line(&status);
            if status.running {
                println!("{} {}", "▶".green(), line.green().bold());
            } else {
                println!("{} {}", "■".yellow(), line);
            }
        }
    })
}

/// Keeps the console window above other windows while a macro runs.
#[derive(Default)]
pub struct ConsoleSurface;

impl ConsoleSurface {
    pub fn new() -> Self {
        Self
    }
}

impl FloatingSurface for ConsoleSurface {
    #[cfg(windows)]
    fn reassert_topmost(&self) {
        use winapi::um::wincon::GetConsoleWindow;
        use winapi::um::winuser::{
            SetWindowPos, HWND_TOPMOST, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_SHOWWINDOW,
        };

        // SAFETY: GetConsoleWindow has no preconditions and SetWindowPos
        // tolerates a null or stale handle by failing.
        unsafe {
            let hwnd = GetConsoleWindow();
            if hwnd.is_null() {
                return;
            }
            SetWindowPos(
                hwnd,
                HWND_TOPMOST,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE | SWP_SHOWWINDOW,
            );
        }
        trace!("console window reasserted as topmost");
    }

    #[cfg(not(windows))]
    fn reassert_topmost(&self) {
        trace!("no console window to raise on this platform");
    }
}
