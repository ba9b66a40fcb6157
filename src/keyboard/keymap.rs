//! Key name vocabulary and USB HID keyboard usage codes
//!
//! Names follow the Linux `KEY_*` spelling without the prefix (`SPACE`,
//! `LEFTCTRL`, `PAGEDOWN`, ...). Lookup is case-insensitive.

use std::collections::HashMap;
use std::sync::LazyLock;

/// A keyboard usage ID from the HID Keyboard/Keypad usage page (0x07)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HidUsage(pub u8);

impl HidUsage {
    pub fn new(code: u8) -> Self {
        Self(code)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl From<u8> for HidUsage {
    fn from(code: u8) -> Self {
        Self(code)
    }
}

/// Modifier byte of a boot keyboard report
pub type ModifierMask = u8;

pub const MOD_LEFTCTRL: ModifierMask = 0x01;
pub const MOD_LEFTSHIFT: ModifierMask = 0x02;
pub const MOD_LEFTALT: ModifierMask = 0x04;
pub const MOD_LEFTMETA: ModifierMask = 0x08;
pub const MOD_RIGHTCTRL: ModifierMask = 0x10;
pub const MOD_RIGHTSHIFT: ModifierMask = 0x20;
pub const MOD_RIGHTALT: ModifierMask = 0x40;
pub const MOD_RIGHTMETA: ModifierMask = 0x80;

#[rustfmt::skip]
const KEY_TABLE: &[(&str, u8)] = &[
    // Letters
    ("A", 0x04), ("B", 0x05), ("C", 0x06), ("D", 0x07), ("E", 0x08), ("F", 0x09),
    ("G", 0x0A), ("H", 0x0B), ("I", 0x0C), ("J", 0x0D), ("K", 0x0E), ("L", 0x0F),
    ("M", 0x10), ("N", 0x11), ("O", 0x12), ("P", 0x13), ("Q", 0x14), ("R", 0x15),
    ("S", 0x16), ("T", 0x17), ("U", 0x18), ("V", 0x19), ("W", 0x1A), ("X", 0x1B),
    ("Y", 0x1C), ("Z", 0x1D),
    // Number row
    ("1", 0x1E), ("2", 0x1F), ("3", 0x20), ("4", 0x21), ("5", 0x22),
    ("6", 0x23), ("7", 0x24), ("8", 0x25), ("9", 0x26), ("0", 0x27),
    // Editing and punctuation
    ("ENTER", 0x28), ("ESC", 0x29), ("BACKSPACE", 0x2A), ("TAB", 0x2B),
    ("SPACE", 0x2C), ("MINUS", 0x2D), ("EQUAL", 0x2E), ("LEFTBRACE", 0x2F),
    ("RIGHTBRACE", 0x30), ("BACKSLASH", 0x31), ("SEMICOLON", 0x33),
    ("APOSTROPHE", 0x34), ("GRAVE", 0x35), ("COMMA", 0x36), ("DOT", 0x37),
    ("SLASH", 0x38), ("CAPSLOCK", 0x39),
    // Function row
    ("F1", 0x3A), ("F2", 0x3B), ("F3", 0x3C), ("F4", 0x3D), ("F5", 0x3E),
    ("F6", 0x3F), ("F7", 0x40), ("F8", 0x41), ("F9", 0x42), ("F10", 0x43),
    ("F11", 0x44), ("F12", 0x45),
    // Navigation cluster
    ("PRINTSCREEN", 0x46), ("SCROLLLOCK", 0x47), ("PAUSE", 0x48),
    ("INSERT", 0x49), ("HOME", 0x4A), ("PAGEUP", 0x4B), ("DELETE", 0x4C),
    ("END", 0x4D), ("PAGEDOWN", 0x4E),
    // Arrows
    ("RIGHT", 0x4F), ("LEFT", 0x50), ("DOWN", 0x51), ("UP", 0x52),
    // Modifiers
    ("LEFTCTRL", 0xE0), ("LEFTSHIFT", 0xE1), ("LEFTALT", 0xE2), ("LEFTMETA", 0xE3),
    ("RIGHTCTRL", 0xE4), ("RIGHTSHIFT", 0xE5), ("RIGHTALT", 0xE6), ("RIGHTMETA", 0xE7),
];

const MODIFIER_TABLE: &[(&str, ModifierMask)] = &[
    ("LEFTCTRL", MOD_LEFTCTRL),
    ("LEFTSHIFT", MOD_LEFTSHIFT),
    ("LEFTALT", MOD_LEFTALT),
    ("LEFTMETA", MOD_LEFTMETA),
    ("RIGHTCTRL", MOD_RIGHTCTRL),
    ("RIGHTSHIFT", MOD_RIGHTSHIFT),
    ("RIGHTALT", MOD_RIGHTALT),
    ("RIGHTMETA", MOD_RIGHTMETA),
];

/// Key name -> HID usage
pub static KEYMAP: LazyLock<HashMap<&'static str, HidUsage>> = LazyLock::new(|| {
    KEY_TABLE
        .iter()
        .map(|&(name, code)| (name, HidUsage(code)))
        .collect()
});

/// Modifier name -> bit in the report's modifier byte
pub static MODIFIERS: LazyLock<HashMap<&'static str, ModifierMask>> =
    LazyLock::new(|| MODIFIER_TABLE.iter().copied().collect());

/// Look up the HID usage for a key name, `None` if it is outside the vocabulary
pub fn usage_for(name: &str) -> Option<HidUsage> {
    KEYMAP.get(name.to_ascii_uppercase().as_str()).copied()
}

/// Check whether a key name is one of the eight modifiers
pub fn is_modifier(name: &str) -> bool {
    MODIFIERS.contains_key(name.to_ascii_uppercase().as_str())
}

/// Modifier bit for a key name, 0 for anything that is not a modifier
pub fn modifier_bit(name: &str) -> ModifierMask {
    MODIFIERS
        .get(name.to_ascii_uppercase().as_str())
        .copied()
        .unwrap_or(0)
}

/// Every known key name, sorted
pub fn all_key_names() -> Vec<&'static str> {
    let mut names: Vec<_> = KEY_TABLE.iter().map(|&(name, _)| name).collect();
    names.sort_unstable();
    names
}

/// Every modifier name, sorted
pub fn all_modifier_names() -> Vec<&'static str> {
    let mut names: Vec<_> = MODIFIER_TABLE.iter().map(|&(name, _)| name).collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_and_digits() {
        assert_eq!(usage_for("A"), Some(HidUsage(0x04)));
        assert_eq!(usage_for("Z"), Some(HidUsage(0x1D)));
        assert_eq!(usage_for("1"), Some(HidUsage(0x1E)));
        assert_eq!(usage_for("0"), Some(HidUsage(0x27)));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(usage_for("space"), Some(HidUsage(0x2C)));
        assert_eq!(usage_for("Enter"), Some(HidUsage(0x28)));
        assert!(is_modifier("leftctrl"));
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(usage_for("HYPER"), None);
        assert_eq!(usage_for(""), None);
        assert!(!is_modifier("SPACE"));
        assert_eq!(modifier_bit("SPACE"), 0);
    }

    #[test]
    fn arrows_match_usage_table() {
        assert_eq!(usage_for("RIGHT").unwrap().as_u8(), 0x4F);
        assert_eq!(usage_for("LEFT").unwrap().as_u8(), 0x50);
        assert_eq!(usage_for("DOWN").unwrap().as_u8(), 0x51);
        assert_eq!(usage_for("UP").unwrap().as_u8(), 0x52);
    }

    #[test]
    fn modifier_bits_are_distinct() {
        let combined = MODIFIER_TABLE.iter().fold(0u8, |acc, &(_, bit)| {
            assert_eq!(acc & bit, 0);
            acc | bit
        });
        assert_eq!(combined, 0xFF);
        assert_eq!(modifier_bit("LEFTCTRL"), 0x01);
        assert_eq!(modifier_bit("RIGHTMETA"), 0x80);
    }

    #[test]
    fn every_modifier_has_a_usage() {
        for name in all_modifier_names() {
            assert!(usage_for(name).is_some(), "{} missing from key table", name);
        }
    }

    #[test]
    fn name_lists_are_sorted() {
        let keys = all_key_names();
        assert_eq!(keys.len(), KEY_TABLE.len());
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(all_modifier_names().len(), 8);
    }
}
