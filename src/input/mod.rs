//! Gamepad input: raw events, normalization and device access

mod event;
pub mod monitor;

#[cfg(target_os = "linux")]
pub mod evdev_listener;

pub use event::{
    canonical_event_name, event_name, is_event_name, normalize, EventClass, NormalizedEvent,
    RawInputEvent, EV_ABS, EV_KEY, EV_MSC, EV_REL, EV_SYN,
};
pub use monitor::{EventMonitor, MONITOR_QUEUE_CAPACITY};

#[cfg(target_os = "linux")]
pub use evdev_listener::{find_gamepad, list_devices, DeviceInfo, DeviceKind, EvdevSource};
