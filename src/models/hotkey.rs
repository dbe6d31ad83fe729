use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Modifier keys for global hotkeys. Declaration order is display order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModifierKey {
    Control,
    Alt,
    Shift,
    Win,
}

impl ModifierKey {
    /// Bit used in the OS modifier mask
    pub fn mask(self) -> u32 {
        match self {
            ModifierKey::Alt => 0x0001,
            ModifierKey::Control => 0x0002,
            ModifierKey::Shift => 0x0004,
            ModifierKey::Win => 0x0008,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ModifierKey::Control => "Ctrl",
            ModifierKey::Alt => "Alt",
            ModifierKey::Shift => "Shift",
            ModifierKey::Win => "Win",
        }
    }
}

/// Primary key of a hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Letter keys A-Z
    Letter(char),
    /// Number row keys 0-9
    Number(u8),
    /// Function keys F1-F24
    Function(u8),
    Space,
    Enter,
    Tab,
    Escape,
    /// Raw virtual key code
    KeyCode(u16),
}

impl Key {
    /// Virtual key code understood by the OS hotkey API
    pub fn code(self) -> u32 {
        match self {
            Key::Letter(c) => c.to_ascii_uppercase() as u32,
            Key::Number(n) => 0x30 + n as u32,
            Key::Function(n) => 0x6F + n as u32,
            Key::Space => 0x20,
            Key::Enter => 0x0D,
            Key::Tab => 0x09,
            Key::Escape => 0x1B,
            Key::KeyCode(code) => code as u32,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Letter(c) => write!(f, "{}", c.to_ascii_uppercase()),
            Key::Number(n) => write!(f, "{}", n),
            Key::Function(n) => write!(f, "F{}", n),
            Key::Space => write!(f, "Space"),
            Key::Enter => write!(f, "Enter"),
            Key::Tab => write!(f, "Tab"),
            Key::Escape => write!(f, "Esc"),
            Key::KeyCode(code) => write!(f, "{:#04x}", code),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HotKeyParseError {
    #[error("Hotkey is empty")]
    Empty,
    #[error("Unknown modifier '{0}'")]
    UnknownModifier(String),
    #[error("Invalid key '{0}'")]
    InvalidKey(String),
}

/// A key combination that can be registered globally, e.g. `Ctrl+B`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HotKey {
    modifiers: Vec<ModifierKey>,
    key: Key,
}

impl HotKey {
    pub fn new(modifiers: Vec<ModifierKey>, key: Key) -> Self {
        let mut modifiers = modifiers;
        modifiers.sort();
        modifiers.dedup();
        Self { modifiers, key }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn modifiers(&self) -> &[ModifierKey] {
        &self.modifiers
    }

    pub fn modifier_mask(&self) -> u32 {
        self.modifiers.iter().fold(0, |mask, m| mask | m.mask())
    }

    pub fn key_code(&self) -> u32 {
        self.key.code()
    }
}

impl Default for HotKey {
    fn default() -> Self {
        HotKey::new(Vec::new(), Key::Letter('B'))
    }
}

impl fmt::Display for HotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}+", modifier.label())?;
        }
        write!(f, "{}", self.key)
    }
}

impl FromStr for HotKey {
    type Err = HotKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let Some((key_part, modifier_parts)) = parts.split_last() else {
            return Err(HotKeyParseError::Empty);
        };
        if key_part.is_empty() {
            return Err(HotKeyParseError::Empty);
        }

        let modifiers = modifier_parts
            .iter()
            .map(|part| parse_modifier(part))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HotKey::new(modifiers, parse_key(key_part)?))
    }
}

impl TryFrom<String> for HotKey {
    type Error = HotKeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HotKey> for String {
    fn from(hotkey: HotKey) -> Self {
        hotkey.to_string()
    }
}

fn parse_modifier(part: &str) -> Result<ModifierKey, HotKeyParseError> {
    match part.to_lowercase().as_str() {
        "ctrl" | "control" => Ok(ModifierKey::Control),
        "alt" => Ok(ModifierKey::Alt),
        "shift" => Ok(ModifierKey::Shift),
        "win" | "super" | "meta" => Ok(ModifierKey::Win),
        _ => Err(HotKeyParseError::UnknownModifier(part.to_string())),
    }
}

fn parse_key(part: &str) -> Result<Key, HotKeyParseError> {
    let lower = part.to_lowercase();
    let mut chars = part.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            return Ok(Key::Letter(c.to_ascii_uppercase()));
        }
        if let Some(digit) = c.to_digit(10) {
            return Ok(Key::Number(digit as u8));
        }
    }

    match lower.as_str() {
        "space" => return Ok(Key::Space),
        "enter" | "return" => return Ok(Key::Enter),
        "tab" => return Ok(Key::Tab),
        "esc" | "escape" => return Ok(Key::Escape),
        _ => {}
    }

    if let Some(number) = lower.strip_prefix('f') {
        if let Ok(n @ 1..=24) = number.parse::<u8>() {
            return Ok(Key::Function(n));
        }
    }

    if let Some(hex) = lower.strip_prefix("0x") {
        if let Ok(code) = u16::from_str_radix(hex, 16) {
            return Ok(Key::KeyCode(code));
        }
    }

    Err(HotKeyParseError::InvalidKey(part.to_string()))
}

/// Identifier assigned to a registration; never reused within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HotKeyId(pub u32);

impl fmt::Display for HotKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Logical action bound to a hotkey registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotKeyAction {
    /// Park the focused table aside, or bring it back into play
    ToggleAside,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modifiers_case_insensitively() {
        let hotkey: HotKey = "shift+CTRL+b".parse().unwrap();
        assert_eq!(hotkey.modifiers(), &[ModifierKey::Control, ModifierKey::Shift]);
        assert_eq!(hotkey.key(), Key::Letter('B'));
        assert_eq!(hotkey.to_string(), "Ctrl+Shift+B");
    }

    #[test]
    fn modifier_mask_and_key_code_follow_os_values() {
        let hotkey: HotKey = "Ctrl+Alt+F5".parse().unwrap();
        assert_eq!(hotkey.modifier_mask(), 0x0003);
        assert_eq!(hotkey.key_code(), 0x74);

        let plain = HotKey::default();
        assert_eq!(plain.modifier_mask(), 0);
        assert_eq!(plain.key_code(), 0x42);
    }

    #[test]
    fn rejects_unknown_parts() {
        assert_eq!(
            "Hyper+B".parse::<HotKey>(),
            Err(HotKeyParseError::UnknownModifier("Hyper".to_string()))
        );
        assert!(matches!(
            "Ctrl+F99".parse::<HotKey>(),
            Err(HotKeyParseError::InvalidKey(_))
        ));
        assert_eq!("Ctrl+".parse::<HotKey>(), Err(HotKeyParseError::Empty));
    }

    #[test]
    fn duplicate_modifiers_collapse() {
        let a = HotKey::new(vec![ModifierKey::Control, ModifierKey::Control], Key::Number(1));
        let b: HotKey = "ctrl+1".parse().unwrap();
        assert_eq!(a, b);
    }
}
