//! Translation of normalized input events into keyboard actions
//!
//! This layer decides what logically happened ("BTN_A went down, so SPACE is
//! pressed"). It never looks at or touches the current key state; that is
//! the job of [`super::state`].
//!
//! ## Usage
//!
//! ```no_run
//! use joy2hid::config::MappingTable;
//! use joy2hid::keyboard::remap::translate;
//!
//! let table = MappingTable::with_defaults("mappings.json");
//! let action = translate(&table, "BTN_A", 1);
//! ```

use super::keymap::{self, HidUsage, ModifierMask};
use crate::config::{MappingEntry, MappingTable};
use log::{debug, warn};

/// What the key-state machine should do in response to one input event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputAction {
    /// Press one key, replacing the current modifier byte
    Press { key: HidUsage, modifier: ModifierMask },
    /// Release one key
    Release { key: HidUsage },
    /// Press a chord, replacing the current modifier byte
    PressAll {
        keys: Vec<HidUsage>,
        modifier: ModifierMask,
    },
    /// Release every key in the list
    ReleaseAll { keys: Vec<HidUsage> },
}

impl OutputAction {
    pub fn is_press(&self) -> bool {
        matches!(self, OutputAction::Press { .. } | OutputAction::PressAll { .. })
    }
}

/// Translate one normalized event using the mapping table.
///
/// Returns `None` when the event has no mapping or when the mapping cannot
/// produce output (unknown key names). Neither case is an error.
pub fn translate(table: &MappingTable, event_name: &str, value: i32) -> Option<OutputAction> {
    match table.lookup(event_name) {
        Some(entry) => translate_entry(entry, value),
        None => {
            debug!("No mapping for {}={}", event_name, value);
            None
        }
    }
}

/// Translate one event value against a single mapping rule
pub fn translate_entry(entry: &MappingEntry, value: i32) -> Option<OutputAction> {
    match entry {
        MappingEntry::KeySingle { key, .. } => {
            let key = resolve(key)?;
            if value == 0 {
                Some(OutputAction::Release { key })
            } else {
                // 1 = press, 2 = autorepeat; both mean "held"
                Some(OutputAction::Press { key, modifier: 0 })
            }
        }
        MappingEntry::KeyCombo { keys, .. } => {
            let (codes, modifier) = split_combo(keys);
            if codes.is_empty() && modifier == 0 {
                warn!("Combo {:?} has no usable keys", keys);
                return None;
            }
            if value == 0 {
                Some(OutputAction::ReleaseAll { keys: codes })
            } else {
                Some(OutputAction::PressAll {
                    keys: codes,
                    modifier,
                })
            }
        }
        MappingEntry::DpadAxis {
            positive_key,
            negative_key,
            ..
        } => {
            if value == 0 {
                // Centered: release both directions, whichever one is held
                let keys: Vec<HidUsage> = [positive_key, negative_key]
                    .into_iter()
                    .filter_map(|name| resolve(name))
                    .collect();
                if keys.is_empty() {
                    return None;
                }
                return Some(OutputAction::ReleaseAll { keys });
            }

            let name = if value > 0 { positive_key } else { negative_key };
            let key = resolve(name)?;
            Some(OutputAction::Press { key, modifier: 0 })
        }
    }
}

/// Split a combo into ordered non-modifier usages and an OR-ed modifier mask.
/// Unknown names are skipped one by one.
fn split_combo(names: &[String]) -> (Vec<HidUsage>, ModifierMask) {
    let mut codes = Vec::with_capacity(names.len());
    let mut modifier = 0;

    for name in names {
        if keymap::is_modifier(name) {
            modifier |= keymap::modifier_bit(name);
        } else if let Some(code) = resolve(name) {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
    }

    (codes, modifier)
}

fn resolve(name: &str) -> Option<HidUsage> {
    let usage = keymap::usage_for(name);
    if usage.is_none() {
        warn!("Unknown key: {}", name);
    }
    usage
}

/// Counters for translation outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslateStats {
    /// Events that reached the translator
    pub total_processed: u64,
    /// Events with no mapping entry
    pub unmapped: u64,
    /// Mapped events that produced no action (unknown keys)
    pub dropped: u64,
    /// Press actions produced
    pub presses: u64,
    /// Release actions produced
    pub releases: u64,
}

impl TranslateStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one translation outcome
    pub fn record(&mut self, mapped: bool, action: Option<&OutputAction>) {
        self.total_processed += 1;
        match (mapped, action) {
            (false, _) => self.unmapped += 1,
            (true, None) => self.dropped += 1,
            (true, Some(action)) if action.is_press() => self.presses += 1,
            (true, Some(_)) => self.releases += 1,
        }
    }
}
