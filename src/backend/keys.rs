//! Key-combination grammar shared by every backend.
//!
//! `modifier(+modifier)*+mainKey`, case-insensitive. Parsing happens before
//! any event is built, so a rejected combination never produces input.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Keyboard modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Command,
    Shift,
    Option,
    Control,
}

impl Modifier {
    /// Parse a modifier token (already lowercased or not)
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "command" | "cmd" => Some(Modifier::Command),
            "shift" => Some(Modifier::Shift),
            "option" | "alt" => Some(Modifier::Option),
            "control" | "ctrl" => Some(Modifier::Control),
            _ => None,
        }
    }

    /// Canonical key name of the modifier when pressed on its own
    pub fn key_name(&self) -> &'static str {
        match self {
            Modifier::Command => "command",
            Modifier::Shift => "shift",
            Modifier::Option => "option",
            Modifier::Control => "control",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyComboError {
    #[error("empty key combination")]
    Empty,
    #[error("empty token between '+' separators")]
    EmptyToken,
    #[error("more than one non-modifier key: {}", .0.join(", "))]
    MultipleMainKeys(Vec<String>),
    #[error("no main key, only modifiers")]
    MissingMainKey,
    #[error("unknown key '{0}'")]
    UnknownKey(String),
}

/// A parsed key combination: zero or more modifiers plus one main key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    modifiers: Vec<Modifier>,
    key: String,
}

impl KeyCombo {
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Canonical (lowercase, alias-resolved) main key name
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn has(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

impl FromStr for KeyCombo {
    type Err = KeyComboError;

    fn from_str(combo: &str) -> Result<Self, Self::Err> {
        if combo.trim().is_empty() {
            return Err(KeyComboError::Empty);
        }

        let tokens: Vec<String> = combo
            .split('+')
            .map(|token| token.trim().to_lowercase())
            .collect();
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(KeyComboError::EmptyToken);
        }

        // A lone modifier is a key press of that modifier
        if tokens.len() == 1 {
            if let Some(modifier) = Modifier::parse(&tokens[0]) {
                return Ok(KeyCombo {
                    modifiers: Vec::new(),
                    key: modifier.key_name().to_string(),
                });
            }
        }

        let mut modifiers = Vec::new();
        let mut main_keys = Vec::new();
        for token in tokens {
            match Modifier::parse(&token) {
                Some(modifier) => {
                    if !modifiers.contains(&modifier) {
                        modifiers.push(modifier);
                    }
                }
                None => main_keys.push(token),
            }
        }

        match main_keys.len() {
            0 => Err(KeyComboError::MissingMainKey),
            1 => Ok(KeyCombo {
                modifiers,
                key: canonical_key(&main_keys[0]),
            }),
            _ => Err(KeyComboError::MultipleMainKeys(main_keys)),
        }
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}+", modifier.key_name())?;
        }
        f.write_str(&self.key)
    }
}

/// Resolve the common aliases agents send (X11-style names included).
pub fn canonical_key(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "enter" | "return" | "kp_enter" => "return",
        "esc" | "escape" => "escape",
        "bs" | "backspace" => "backspace",
        "del" | "delete" => "delete",
        "ins" | "insert" => "insert",
        "tab" => "tab",
        "space" | "spacebar" => "space",
        "up" | "arrowup" => "up",
        "down" | "arrowdown" => "down",
        "left" | "arrowleft" => "left",
        "right" | "arrowright" => "right",
        "pageup" | "page_up" | "pgup" | "prior" => "pageup",
        "pagedown" | "page_down" | "pgdn" | "next" => "pagedown",
        "home" => "home",
        "end" => "end",
        "super_l" | "super_r" | "meta_l" | "meta_r" | "meta" | "win" | "super" => "command",
        "control_l" | "control_r" => "control",
        "alt_l" | "alt_r" => "option",
        "shift_l" | "shift_r" => "shift",
        other => other,
    };
    canonical.to_string()
}
