//! Keyboard side of the converter: key vocabulary, translation and report state

pub mod keymap;
pub mod remap;
pub mod state;

pub use keymap::{HidUsage, ModifierMask, KEYMAP};
pub use remap::{translate, OutputAction, TranslateStats};
pub use state::{apply, HidReport, KeyState};
