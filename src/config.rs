//! Configuration types.
//!
//! [`MacroConfig`] is what the control surface pushes to the engine on every
//! edit. [`EngineSettings`] holds the timing constants and helper command,
//! and [`AppConfig`] bundles both for the optional start-up JSON file.

use crate::error::{MacroError, Result};
use crate::keymap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::time::Duration;

/// How the target key is injected while a macro runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Repeated key-down events simulating a held key.
    Hold,
    /// A press-and-release every `interval` milliseconds.
    Periodic,
}

impl std::str::FromStr for Mode {
    type Err = MacroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hold" => Ok(Mode::Hold),
            "periodic" => Ok(Mode::Periodic),
            other => Err(MacroError::config_validation(format!(
                "unknown mode '{other}' (expected hold or periodic)"
            ))),
        }
    }
}

/// A complete macro configuration, replaced wholesale on every edit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroConfig {
    #[serde(default = "default_target_key")]
    pub target_key: String,

    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// Tick period in milliseconds for periodic mode.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Zero means unbounded. Runs always continue until stopped.
    #[serde(default)]
    pub repeat_count: u64,

    #[serde(default = "default_shortcut")]
    pub start_stop_shortcut: String,

    #[serde(default)]
    pub use_shift: bool,
}

fn default_target_key() -> String {
    "space".to_string()
}

fn default_mode() -> Mode {
    Mode::Hold
}

fn default_interval() -> u64 {
    100
}

fn default_shortcut() -> String {
    "Delete".to_string()
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            target_key: default_target_key(),
            mode: default_mode(),
            interval: default_interval(),
            repeat_count: 0,
            start_stop_shortcut: default_shortcut(),
            use_shift: false,
        }
    }
}

impl MacroConfig {
    /// Checks run by the control surface before a config is pushed. The
    /// engine itself trusts whatever it receives.
    pub fn validate(&self) -> Result<()> {
        if self.target_key.trim().is_empty() && self.target_key != " " {
            return Err(MacroError::config_validation("target key cannot be empty"));
        }
        if self.start_stop_shortcut.trim().is_empty() {
            return Err(MacroError::config_validation(
                "start/stop shortcut cannot be empty",
            ));
        }
        if self.interval == 0 {
            return Err(MacroError::config_validation(
                "interval must be a positive number of milliseconds",
            ));
        }
        let target = keymap::label(&self.target_key);
        if target == keymap::label(&self.start_stop_shortcut) {
            return Err(MacroError::config_validation(format!(
                "target key and start/stop shortcut are both '{target}'"
            )));
        }
        Ok(())
    }

    /// The chord injected on every tick: the target key, with Shift in front
    /// when `use_shift` is set and the target does not already start with it.
    pub fn final_keys(&self) -> Vec<keymap::Token> {
        let mut tokens = keymap::resolve_chord(&self.target_key);
        if tokens.is_empty() {
            tokens.push(keymap::resolve(&self.target_key));
        }
        if self.use_shift && tokens.first() != Some(&keymap::Token::SHIFT) {
            tokens.insert(0, keymap::Token::SHIFT);
        }
        tokens
    }
}

/// Command line used to launch the resident injection helper.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperSettings {
    pub program: String,
    /// Arguments placed before the helper script.
    pub args: Vec<String>,
    /// Start the helper when the engine starts instead of on first use.
    pub eager: bool,
}

impl Default for HelperSettings {
    fn default() -> Self {
        Self {
            program: "powershell.exe".to_string(),
            args: vec![
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-Command".to_string(),
            ],
            eager: false,
        }
    }
}

/// Timing constants and helper command for the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Tick period used in hold mode.
    #[serde(with = "duration_serde")]
    pub hold_tick: Duration,

    /// Shortest tick period accepted in periodic mode.
    #[serde(with = "duration_serde")]
    pub interval_floor: Duration,

    /// How often the floating status surface is pushed back on top.
    #[serde(with = "duration_serde")]
    pub keep_on_top: Duration,

    /// Pause between unregistering and re-registering hotkeys.
    #[serde(with = "duration_serde")]
    pub reregister_delay: Duration,

    pub helper: HelperSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hold_tick: Duration::from_millis(30),
            interval_floor: Duration::from_millis(20),
            keep_on_top: Duration::from_secs(1),
            reregister_delay: Duration::from_millis(50),
            helper: HelperSettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.hold_tick.is_zero() {
            return Err(MacroError::config_validation("hold_tick must be positive"));
        }
        if self.interval_floor.is_zero() {
            return Err(MacroError::config_validation(
                "interval_floor must be positive",
            ));
        }
        if self.keep_on_top.is_zero() {
            return Err(MacroError::config_validation("keep_on_top must be positive"));
        }
        if self.helper.program.trim().is_empty() {
            return Err(MacroError::config_validation(
                "helper program cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Contents of the optional start-up configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(rename = "macro")]
    pub macro_config: MacroConfig,
    pub engine: EngineSettings,
}

impl AppConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| MacroError::config_load(path, e.to_string()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| MacroError::config_load(path, e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.macro_config.validate()?;
        self.engine.validate()
    }
}

/// Parse `"500ms"`, `"2s"`, `"1m"` or bare milliseconds.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(MacroError::invalid_duration(value, "empty duration"));
    }

    let (number, multiplier) = if let Some(n) = trimmed.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = trimmed.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = trimmed.strip_suffix('m') {
        (n, 60_000)
    } else {
        (trimmed.as_str(), 1)
    };

    let amount: u64 = number
        .trim()
        .parse()
        .map_err(|_| MacroError::invalid_duration(value, "expected a non-negative integer"))?;

    Ok(Duration::from_millis(amount.saturating_mul(multiplier)))
}

mod duration_serde {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", value.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::Token;

    #[test]
    fn test_macro_config_json_shape() {
        let json = r#"
        {
            "targetKey": "a",
            "mode": "PERIODIC",
            "interval": 250,
            "repeatCount": 3,
            "startStopShortcut": "F1",
            "useShift": true
        }
        "#;
        let config: MacroConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.target_key, "a");
        assert_eq!(config.mode, Mode::Periodic);
        assert_eq!(config.interval, 250);
        assert_eq!(config.repeat_count, 3);
        assert_eq!(config.start_stop_shortcut, "F1");
        assert!(config.use_shift);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_macro_config_defaults() {
        let config: MacroConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MacroConfig::default());
        assert_eq!(config.mode, Mode::Hold);
        assert_eq!(config.start_stop_shortcut, "Delete");
    }

    #[test]
    fn test_label_collision_is_rejected() {
        let config = MacroConfig {
            target_key: "f1".to_string(),
            start_stop_shortcut: "F1".to_string(),
            ..MacroConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MacroConfig {
            target_key: "shift+w".to_string(),
            start_stop_shortcut: "Shift+W".to_string(),
            ..MacroConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = MacroConfig {
            interval: 0,
            ..MacroConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_final_keys() {
        let mut config = MacroConfig {
            target_key: "w".to_string(),
            ..MacroConfig::default()
        };
        assert_eq!(config.final_keys(), vec![keymap::resolve("w")]);

        config.use_shift = true;
        assert_eq!(config.final_keys(), vec![Token::SHIFT, keymap::resolve("w")]);

        config.target_key = "shift+w+a".to_string();
        assert_eq!(
            config.final_keys(),
            vec![Token::SHIFT, keymap::resolve("w"), keymap::resolve("a")]
        );
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("hold".parse::<Mode>().unwrap(), Mode::Hold);
        assert_eq!("PERIODIC".parse::<Mode>().unwrap(), Mode::Periodic);
        assert!("burst".parse::<Mode>().is_err());
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("0ms").unwrap(), Duration::from_millis(0));
        assert_eq!(parse_duration("1000").unwrap(), Duration::from_millis(1000));
        assert_eq!(parse_duration("5S").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-10ms").is_err());
    }

    #[test]
    fn test_engine_settings_accept_strings_and_numbers() {
        let json = r#"{ "hold_tick": "40ms", "keep_on_top": 500 }"#;
        let settings: EngineSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.hold_tick, Duration::from_millis(40));
        assert_eq!(settings.keep_on_top, Duration::from_millis(500));
        assert_eq!(settings.interval_floor, Duration::from_millis(20));
        assert!(settings.validate().is_ok());
    }
}
