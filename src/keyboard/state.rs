//! Output key state and HID report encoding

use super::keymap::{HidUsage, ModifierMask};
use super::remap::OutputAction;
use std::fmt;

/// Number of key slots in a boot keyboard report
pub const REPORT_KEY_SLOTS: usize = 6;
/// Size of a boot keyboard report in bytes
pub const REPORT_LEN: usize = 8;

/// An 8-byte boot keyboard input report.
///
/// Byte 0 is the modifier mask, byte 1 is reserved, bytes 2..8 hold up to
/// six pressed usages (0 = empty slot).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HidReport([u8; REPORT_LEN]);

impl HidReport {
    /// The "nothing pressed" report
    pub const EMPTY: HidReport = HidReport([0; REPORT_LEN]);

    pub fn new(modifier: ModifierMask, keys: &[HidUsage]) -> Self {
        let mut bytes = [0u8; REPORT_LEN];
        bytes[0] = modifier;
        for (slot, key) in bytes[2..].iter_mut().zip(keys) {
            *slot = key.as_u8();
        }
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; REPORT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.0
    }

    pub fn modifier(&self) -> ModifierMask {
        self.0[0]
    }

    /// Occupied key slots, in slot order
    pub fn keys(&self) -> impl Iterator<Item = HidUsage> + '_ {
        self.0[2..].iter().filter(|&&b| b != 0).map(|&b| HidUsage(b))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; REPORT_LEN]
    }
}

impl fmt::Debug for HidReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HidReport({:02x?})", self.0)
    }
}

/// Keys and modifiers currently held on the emulated keyboard.
///
/// Pressed keys are kept in press order so the report is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyState {
    pressed: Vec<HidUsage>,
    modifier: ModifierMask,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pressed(&self) -> &[HidUsage] {
        &self.pressed
    }

    pub fn is_pressed(&self, key: HidUsage) -> bool {
        self.pressed.contains(&key)
    }

    pub fn modifier(&self) -> ModifierMask {
        self.modifier
    }

    pub fn is_idle(&self) -> bool {
        self.pressed.is_empty() && self.modifier == 0
    }

    fn press(&mut self, key: HidUsage) {
        if !self.pressed.contains(&key) {
            self.pressed.push(key);
        }
    }

    fn release(&mut self, key: HidUsage) {
        self.pressed.retain(|k| *k != key);
    }

    fn clear_modifier_if_idle(&mut self) {
        if self.pressed.is_empty() {
            self.modifier = 0;
        }
    }

    /// Report describing the state right now.
    ///
    /// Fills up to six slots with the oldest pressed keys.
    pub fn report(&self) -> HidReport {
        let held = self.pressed.len().min(REPORT_KEY_SLOTS);
        HidReport::new(self.modifier, &self.pressed[..held])
    }

    /// Release everything and return the all-zero report
    pub fn reset(&mut self) -> HidReport {
        self.pressed.clear();
        self.modifier = 0;
        HidReport::EMPTY
    }
}

/// Apply one action and return the report for the state right after it
pub fn apply(action: &OutputAction, state: &mut KeyState) -> HidReport {
    match action {
        OutputAction::Press { key, modifier } => {
            state.modifier = *modifier;
            state.press(*key);
        }
        OutputAction::Release { key } => {
            state.release(*key);
            state.clear_modifier_if_idle();
        }
        OutputAction::PressAll { keys, modifier } => {
            state.modifier = *modifier;
            for key in keys {
                state.press(*key);
            }
        }
        OutputAction::ReleaseAll { keys } => {
            for key in keys {
                state.release(*key);
            }
            state.clear_modifier_if_idle();
        }
    }
    state.report()
}
