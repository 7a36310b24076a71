//! Command line arguments for the `kpr` binary.

use crate::config::{AppConfig, Mode};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "kpr",
    version,
    about = "Press or hold a key on a timer, toggled by a global hotkey"
)]
pub struct Args {
    /// JSON configuration file ({"macro": {...}, "engine": {...}})
    #[arg(short, long)]
    pub config: Option<String>,

    /// Target key, e.g. a, f5, pageup, shift+w+a
    #[arg(short, long)]
    pub key: Option<String>,

    /// Input mode: hold or periodic
    #[arg(short, long)]
    pub mode: Option<Mode>,

    /// Press interval in milliseconds (periodic mode)
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Repeat count, 0 = until stopped
    #[arg(short, long)]
    pub repeat_count: Option<u64>,

    /// Start/stop hotkey, e.g. F1, Shift+F1, CommandOrControl+S
    #[arg(short, long)]
    pub shortcut: Option<String>,

    /// Hold Shift together with the target key
    #[arg(long)]
    pub shift: bool,

    /// Start the injection helper immediately instead of on first use
    #[arg(long)]
    pub eager_helper: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Layer command line overrides on top of a loaded configuration.
    pub fn apply_to(&self, app: &mut AppConfig) {
        let config = &mut app.macro_config;
        if let Some(key) = &self.key {
            config.target_key = key.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        if let Some(count) = self.repeat_count {
            config.repeat_count = count;
        }
        if let Some(shortcut) = &self.shortcut {
            config.start_stop_shortcut = shortcut.clone();
        }
        if self.shift {
            config.use_shift = true;
        }
        if self.eager_helper {
            app.engine.helper.eager = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_file_values() {
        let args = Args::try_parse_from([
            "kpr", "-k", "a", "-m", "periodic", "-i", "100", "-s", "F1", "--shift",
        ])
        .unwrap();
        let mut app = AppConfig::default();
        args.apply_to(&mut app);

        assert_eq!(app.macro_config.target_key, "a");
        assert_eq!(app.macro_config.mode, Mode::Periodic);
        assert_eq!(app.macro_config.interval, 100);
        assert_eq!(app.macro_config.start_stop_shortcut, "F1");
        assert!(app.macro_config.use_shift);
        assert!(!app.engine.helper.eager);
        assert!(app.validate().is_ok());
    }

    #[test]
    fn test_no_flags_keep_defaults() {
        let args = Args::try_parse_from(["kpr"]).unwrap();
        let mut app = AppConfig::default();
        args.apply_to(&mut app);
        assert_eq!(app, AppConfig::default());
    }

    #[test]
    fn test_bad_mode_is_rejected() {
        assert!(Args::try_parse_from(["kpr", "--mode", "burst"]).is_err());
    }
}
