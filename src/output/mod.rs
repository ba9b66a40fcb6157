//! Keyboard output: report sinks and USB gadget setup

pub mod hidg;

#[cfg(target_os = "linux")]
pub mod gadget;

pub use hidg::{LogSink, MemorySink};

#[cfg(target_os = "linux")]
pub use hidg::{wait_for_node, HidGadget, DEFAULT_HIDG_PATH};
