//! joy2hid - Gamepad to USB HID keyboard converter
//!
//! Reads button and axis events from a Linux input device, translates them
//! through a user-editable mapping table and writes 8-byte boot keyboard
//! reports to a USB HID gadget node.

pub mod config;
pub mod device;
pub mod dispatcher;
pub mod input;
pub mod keyboard;
pub mod output;

pub use config::{ConfigError, MappingEntry, MappingHandle, MappingTable};
pub use device::{CancelToken, DeviceError, InputSource, ReportSink};
pub use dispatcher::{DispatchStats, Dispatcher};
