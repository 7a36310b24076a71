//! Key symbol mapping.
//!
//! Translates abstract key identifiers (`"a"`, `"f5"`, `"pageup"`, `"shift+w+a"`)
//! into the Windows virtual-key codes the injection helper understands, and
//! into the display labels the control surface shows.

use std::fmt;
use tracing::debug;

/// A virtual-key code understood by the injection helper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token(u16);

/// Bit set in a wire code when the helper must send the key with the
/// extended-key flag.
pub const EXTENDED_FLAG: u16 = 0x100;

impl Token {
    pub const BACKSPACE: Token = Token(0x08);
    pub const TAB: Token = Token(0x09);
    pub const ENTER: Token = Token(0x0D);
    pub const SHIFT: Token = Token(0x10);
    pub const CONTROL: Token = Token(0x11);
    pub const ALT: Token = Token(0x12);
    pub const CAPS_LOCK: Token = Token(0x14);
    pub const ESCAPE: Token = Token(0x1B);
    pub const SPACE: Token = Token(0x20);
    pub const PAGE_UP: Token = Token(0x21);
    pub const PAGE_DOWN: Token = Token(0x22);
    pub const END: Token = Token(0x23);
    pub const HOME: Token = Token(0x24);
    pub const LEFT: Token = Token(0x25);
    pub const UP: Token = Token(0x26);
    pub const RIGHT: Token = Token(0x27);
    pub const DOWN: Token = Token(0x28);
    pub const PRINT_SCREEN: Token = Token(0x2C);
    pub const INSERT: Token = Token(0x2D);
    pub const DELETE: Token = Token(0x2E);
    pub const NUM_LOCK: Token = Token(0x90);
    pub const SCROLL_LOCK: Token = Token(0x91);

    /// The raw virtual-key code.
    pub fn vk(self) -> u16 {
        self.0
    }

    /// Navigation/editing keys, arrows, Num Lock and Print Screen must be
    /// injected as extended keys, otherwise they arrive as their numpad
    /// twins.
    pub fn is_extended(self) -> bool {
        matches!(
            self,
            Self::UP
                | Self::DOWN
                | Self::LEFT
                | Self::RIGHT
                | Self::INSERT
                | Self::DELETE
                | Self::HOME
                | Self::END
                | Self::PAGE_UP
                | Self::PAGE_DOWN
                | Self::NUM_LOCK
                | Self::PRINT_SCREEN
        )
    }

    /// The numeric code written on the helper protocol.
    pub fn wire_code(self) -> u16 {
        if self.is_extended() {
            self.0 | EXTENDED_FLAG
        } else {
            self.0
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_code())
    }
}

/// Token used for any identifier outside the supported alphabet.
pub const DEFAULT_TOKEN: Token = Token::SPACE;

/// Target key identifiers offered by the control surface.
pub const TARGET_KEYS: &[&str] = &[
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r",
    "s", "t", "u", "v", "w", "x", "y", "z", "0", "1", "2", "3", "4", "5", "6", "7", "8", "9",
    "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11", "f12", "enter", "space",
    "escape", "backspace", "tab", "insert", "delete", "home", "end", "pageup", "pagedown", "up",
    "down", "left", "right", "capslock", "numlock", "scrolllock", "printscreen", "shift",
    "shift+w", "shift+w+a", "shift+w+s", "shift+w+s+a", "shift+w+s+d", "shift+w+d", "shift+a",
    "shift+a+s", "shift+a+d", "shift+d", "shift+d+s", "shift+d+a", "plus",
];

/// Start/stop chords offered by the control surface, in accelerator form.
pub const SHORTCUT_KEYS: &[&str] = &[
    "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12", "Insert", "Delete",
    "Home", "End", "PageUp", "PageDown", "Escape", "Space", "Enter", "Tab", "Backspace", "Up",
    "Down", "Left", "Right", "CapsLock", "NumLock", "ScrollLock", "PrintScreen", "Plus",
    "Shift+F1", "Shift+W", "CommandOrControl+S", "CommandOrControl+Q", "CommandOrControl+E",
    "CommandOrControl+R", "CommandOrControl+Space", "Alt+A", "Alt+S", "Alt+D", "Alt+F", "Alt+X",
    "Alt+Z", "CommandOrControl+Up", "CommandOrControl+Down",
];

/// Strips SendKeys-style braces and normalizes case. A lone space is the
/// space bar, not an empty identifier.
fn normalize(key: &str) -> String {
    if key == " " {
        return "space".to_string();
    }
    key.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .to_lowercase()
}

/// Look up a single key identifier. Returns `None` outside the alphabet.
pub fn lookup(key: &str) -> Option<Token> {
    let key = normalize(key);

    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            return Some(Token(c.to_ascii_uppercase() as u16));
        }
    }

    if let Some(n) = key.strip_prefix('f').and_then(|n| n.parse::<u16>().ok()) {
        return (1..=12).contains(&n).then(|| Token(0x6F + n));
    }

    let token = match key.as_str() {
        "enter" | "return" => Token::ENTER,
        "space" => Token::SPACE,
        "escape" | "esc" => Token::ESCAPE,
        "backspace" | "bs" => Token::BACKSPACE,
        "tab" => Token::TAB,
        "insert" | "ins" => Token::INSERT,
        "delete" | "del" => Token::DELETE,
        "home" => Token::HOME,
        "end" => Token::END,
        "pageup" | "pgup" => Token::PAGE_UP,
        "pagedown" | "pgdn" => Token::PAGE_DOWN,
        "up" | "arrowup" => Token::UP,
        "down" | "arrowdown" => Token::DOWN,
        "left" | "arrowleft" => Token::LEFT,
        "right" | "arrowright" => Token::RIGHT,
        "capslock" => Token::CAPS_LOCK,
        "numlock" => Token::NUM_LOCK,
        "scrolllock" => Token::SCROLL_LOCK,
        "printscreen" | "prtsc" => Token::PRINT_SCREEN,
        "shift" => Token::SHIFT,
        "ctrl" | "control" | "commandorcontrol" => Token::CONTROL,
        "alt" => Token::ALT,
        "plus" | "+" | "=" => Token(0xBB),
        "minus" | "-" => Token(0xBD),
        "comma" | "," => Token(0xBC),
        "period" | "." => Token(0xBE),
        "semicolon" | ";" => Token(0xBA),
        "slash" | "/" => Token(0xBF),
        "backtick" | "`" => Token(0xC0),
        "lbracket" | "[" => Token(0xDB),
        "backslash" | "\\" => Token(0xDC),
        "rbracket" | "]" => Token(0xDD),
        "quote" | "'" => Token(0xDE),
        _ => return None,
    };
    Some(token)
}

/// The single place where unknown identifiers degrade to [`DEFAULT_TOKEN`].
pub fn fallback(key: &str, found: Option<Token>) -> Token {
    found.unwrap_or_else(|| {
        debug!(key, "unmapped key, using default token");
        DEFAULT_TOKEN
    })
}

/// Resolve a single key identifier; never fails.
pub fn resolve(key: &str) -> Token {
    fallback(key, lookup(key))
}

/// Split a chord (`"shift+w+a"`) into its parts, keeping their order.
pub fn chord_parts(chord: &str) -> Vec<&str> {
    if chord.trim() == "+" {
        return vec!["+"];
    }
    chord
        .split('+')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Resolve every part of a chord, preserving order.
pub fn resolve_chord(chord: &str) -> Vec<Token> {
    chord_parts(chord).into_iter().map(resolve).collect()
}

fn part_label(part: &str) -> String {
    let key = normalize(part);
    let named = match key.as_str() {
        "enter" | "return" => "Enter",
        "space" => "Space",
        "escape" | "esc" => "Escape",
        "backspace" | "bs" => "Backspace",
        "tab" => "Tab",
        "insert" | "ins" => "Insert",
        "delete" | "del" => "Delete",
        "home" => "Home",
        "end" => "End",
        "pageup" | "pgup" => "Page Up",
        "pagedown" | "pgdn" => "Page Down",
        "up" | "arrowup" => "Arrow Up",
        "down" | "arrowdown" => "Arrow Down",
        "left" | "arrowleft" => "Arrow Left",
        "right" | "arrowright" => "Arrow Right",
        "capslock" => "Caps Lock",
        "numlock" => "Num Lock",
        "scrolllock" => "Scroll Lock",
        "printscreen" | "prtsc" => "Print Screen",
        "shift" => "Shift",
        "ctrl" | "control" | "commandorcontrol" => "Ctrl",
        "alt" => "Alt",
        "plus" | "+" => "+",
        _ => "",
    };
    if !named.is_empty() {
        return named.to_string();
    }

    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_digit() => format!("Number {c}"),
        (Some(c), None) => c.to_ascii_uppercase().to_string(),
        _ if lookup(&key).is_some() => key.to_uppercase(),
        _ => part.trim().to_string(),
    }
}

/// Display label for a key identifier or accelerator chord. Target keys and
/// shortcuts share one label space so collisions can be detected.
pub fn label(chord: &str) -> String {
    chord_parts(chord)
        .into_iter()
        .map(part_label)
        .collect::<Vec<_>>()
        .join(" + ")
}
