//! Raw kernel input events and their normalized names

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
pub const EV_MSC: u16 = 0x04;

/// One event as read from an input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
        }
    }

    pub fn class(&self) -> EventClass {
        EventClass::from_type(self.event_type)
    }
}

/// Event class (the kernel's `EV_*` type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Sync,
    /// Digital buttons and keys
    Key,
    Relative,
    /// Sticks, triggers and hats
    Absolute,
    Misc,
    Other(u16),
}

impl EventClass {
    pub fn from_type(event_type: u16) -> Self {
        match event_type {
            EV_SYN => EventClass::Sync,
            EV_KEY => EventClass::Key,
            EV_REL => EventClass::Relative,
            EV_ABS => EventClass::Absolute,
            EV_MSC => EventClass::Misc,
            other => EventClass::Other(other),
        }
    }

    /// Only buttons and absolute axes take part in mapping
    pub fn is_mappable(&self) -> bool {
        matches!(self, EventClass::Key | EventClass::Absolute)
    }
}

/// A raw event reduced to a stable name and its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub name: String,
    pub value: i32,
    pub class: EventClass,
}

impl fmt::Display for NormalizedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Name the event. Never fails: codes missing from the table get
/// `UNKNOWN_<type>_<code>`.
pub fn normalize(raw: &RawInputEvent) -> NormalizedEvent {
    NormalizedEvent {
        name: event_name(raw.event_type, raw.code),
        value: raw.value,
        class: raw.class(),
    }
}

/// Name for a type/code pair
pub fn event_name(event_type: u16, code: u16) -> String {
    match EVENT_NAMES.get(&(event_type, code)) {
        Some(name) => name.clone(),
        None => format!("UNKNOWN_{}_{}", event_type, code),
    }
}

#[rustfmt::skip]
const KEY_CODES: &[(u16, &str)] = &[
    (0x100, "BTN_0"), (0x101, "BTN_1"), (0x102, "BTN_2"), (0x103, "BTN_3"), (0x104, "BTN_4"),
    (0x105, "BTN_5"), (0x106, "BTN_6"), (0x107, "BTN_7"), (0x108, "BTN_8"), (0x109, "BTN_9"),
    (0x110, "BTN_LEFT"), (0x111, "BTN_RIGHT"), (0x112, "BTN_MIDDLE"),
    (0x113, "BTN_SIDE"), (0x114, "BTN_EXTRA"),
    // Joystick
    (0x120, "BTN_TRIGGER"), (0x121, "BTN_THUMB"), (0x122, "BTN_THUMB2"), (0x123, "BTN_TOP"),
    (0x124, "BTN_TOP2"), (0x125, "BTN_PINKIE"), (0x126, "BTN_BASE"), (0x127, "BTN_BASE2"),
    (0x128, "BTN_BASE3"), (0x129, "BTN_BASE4"), (0x12a, "BTN_BASE5"), (0x12b, "BTN_BASE6"),
    (0x12f, "BTN_DEAD"),
    // Gamepad
    (0x130, "BTN_A"), (0x131, "BTN_B"), (0x132, "BTN_C"), (0x133, "BTN_X"), (0x134, "BTN_Y"),
    (0x135, "BTN_Z"), (0x136, "BTN_TL"), (0x137, "BTN_TR"), (0x138, "BTN_TL2"), (0x139, "BTN_TR2"),
    (0x13a, "BTN_SELECT"), (0x13b, "BTN_START"), (0x13c, "BTN_MODE"),
    (0x13d, "BTN_THUMBL"), (0x13e, "BTN_THUMBR"),
    (0x220, "BTN_DPAD_UP"), (0x221, "BTN_DPAD_DOWN"), (0x222, "BTN_DPAD_LEFT"), (0x223, "BTN_DPAD_RIGHT"),
];

#[rustfmt::skip]
const ABS_CODES: &[(u16, &str)] = &[
    (0x00, "ABS_X"), (0x01, "ABS_Y"), (0x02, "ABS_Z"), (0x03, "ABS_RX"), (0x04, "ABS_RY"),
    (0x05, "ABS_RZ"), (0x06, "ABS_THROTTLE"), (0x07, "ABS_RUDDER"), (0x08, "ABS_WHEEL"),
    (0x09, "ABS_GAS"), (0x0a, "ABS_BRAKE"),
    (0x10, "ABS_HAT0X"), (0x11, "ABS_HAT0Y"), (0x12, "ABS_HAT1X"), (0x13, "ABS_HAT1Y"),
    (0x14, "ABS_HAT2X"), (0x15, "ABS_HAT2Y"), (0x16, "ABS_HAT3X"), (0x17, "ABS_HAT3Y"),
    (0x18, "ABS_PRESSURE"), (0x19, "ABS_DISTANCE"), (0x1a, "ABS_TILT_X"), (0x1b, "ABS_TILT_Y"),
    (0x1c, "ABS_TOOL_WIDTH"), (0x20, "ABS_VOLUME"), (0x28, "ABS_MISC"),
];

const BTN_TRIGGER_HAPPY1: u16 = 0x2c0;

static EVENT_NAMES: LazyLock<HashMap<(u16, u16), String>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    map.insert((EV_SYN, 0), "SYN_REPORT".to_string());
    map.insert((EV_SYN, 1), "SYN_CONFIG".to_string());
    map.insert((EV_SYN, 2), "SYN_MT_REPORT".to_string());
    map.insert((EV_SYN, 3), "SYN_DROPPED".to_string());
    map.insert((EV_MSC, 4), "MSC_SCAN".to_string());

    for &(code, name) in KEY_CODES {
        map.insert((EV_KEY, code), name.to_string());
    }
    for n in 0..40u16 {
        map.insert(
            (EV_KEY, BTN_TRIGGER_HAPPY1 + n),
            format!("BTN_TRIGGER_HAPPY{}", n + 1),
        );
    }
    for &(code, name) in ABS_CODES {
        map.insert((EV_ABS, code), name.to_string());
    }

    map
});

/// Kernel alias names for codes that normalize under another name
#[rustfmt::skip]
const ALIASES: &[(&str, &str)] = &[
    ("BTN_MISC", "BTN_0"), ("BTN_MOUSE", "BTN_LEFT"), ("BTN_JOYSTICK", "BTN_TRIGGER"),
    ("BTN_GAMEPAD", "BTN_A"), ("BTN_SOUTH", "BTN_A"), ("BTN_EAST", "BTN_B"),
    ("BTN_NORTH", "BTN_X"), ("BTN_WEST", "BTN_Y"),
];

/// Name that normalization uses for a kernel alias (`BTN_SOUTH` -> `BTN_A`)
pub fn canonical_event_name(alias: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|&&(name, _)| name == alias)
        .map(|&(_, canonical)| canonical)
}

/// Whether normalization can ever produce `name`
pub fn is_event_name(name: &str) -> bool {
    if EVENT_NAMES.values().any(|known| known == name) {
        return true;
    }

    // UNKNOWN_<type>_<code> only for codes without a table entry
    name.strip_prefix("UNKNOWN_")
        .and_then(|rest| rest.split_once('_'))
        .and_then(|(ty, code)| Some((ty.parse::<u16>().ok()?, code.parse::<u16>().ok()?)))
        .is_some_and(|key| !EVENT_NAMES.contains_key(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamepad_buttons_are_named() {
        let event = normalize(&RawInputEvent::new(EV_KEY, 0x130, 1));
        assert_eq!(event.name, "BTN_A");
        assert_eq!(event.value, 1);
        assert_eq!(event.class, EventClass::Key);

        assert_eq!(event_name(EV_KEY, 0x13b), "BTN_START");
        assert_eq!(event_name(EV_KEY, 0x13a), "BTN_SELECT");
        assert_eq!(event_name(EV_KEY, 0x120), "BTN_TRIGGER");
    }

    #[test]
    fn axes_keep_signed_values() {
        let event = normalize(&RawInputEvent::new(EV_ABS, 0x10, -1));
        assert_eq!(event.name, "ABS_HAT0X");
        assert_eq!(event.value, -1);
        assert_eq!(event.class, EventClass::Absolute);
    }

    #[test]
    fn trigger_happy_range() {
        assert_eq!(event_name(EV_KEY, 0x2c0), "BTN_TRIGGER_HAPPY1");
        assert_eq!(event_name(EV_KEY, 0x2e7), "BTN_TRIGGER_HAPPY40");
    }

    #[test]
    fn unknown_codes_get_synthetic_names() {
        assert_eq!(event_name(EV_KEY, 999), "UNKNOWN_1_999");
        assert_eq!(event_name(0x15, 3), "UNKNOWN_21_3");

        let event = normalize(&RawInputEvent::new(EV_REL, 8, 1));
        assert_eq!(event.name, "UNKNOWN_2_8");
        assert_eq!(event.class, EventClass::Relative);
    }

    #[test]
    fn sync_events_are_named_but_not_mappable() {
        let event = normalize(&RawInputEvent::new(EV_SYN, 0, 0));
        assert_eq!(event.name, "SYN_REPORT");
        assert!(!event.class.is_mappable());
    }

    #[test]
    fn only_keys_and_axes_are_mappable() {
        assert!(EventClass::Key.is_mappable());
        assert!(EventClass::Absolute.is_mappable());
        assert!(!EventClass::Relative.is_mappable());
        assert!(!EventClass::Misc.is_mappable());
        assert!(!EventClass::from_type(0x15).is_mappable());
    }

    #[test]
    fn display_is_name_equals_value() {
        let event = normalize(&RawInputEvent::new(EV_ABS, 0x11, 1));
        assert_eq!(event.to_string(), "ABS_HAT0Y=1");
    }

    #[test]
    fn aliases_point_at_emitted_names() {
        assert_eq!(canonical_event_name("BTN_SOUTH"), Some("BTN_A"));
        assert_eq!(canonical_event_name("BTN_WEST"), Some("BTN_Y"));
        assert_eq!(canonical_event_name("BTN_A"), None);

        for &(alias, canonical) in ALIASES {
            assert!(!is_event_name(alias), "{} should not be emitted", alias);
            assert!(is_event_name(canonical), "{} should be emitted", canonical);
        }
    }

    #[test]
    fn emitted_names_are_recognized() {
        assert!(is_event_name("BTN_A"));
        assert!(is_event_name("ABS_HAT0Y"));
        assert!(is_event_name("BTN_TRIGGER_HAPPY40"));
        assert!(is_event_name("UNKNOWN_1_999"));

        // 0x130 has a real name, so its synthetic form never appears
        assert!(!is_event_name("UNKNOWN_1_304"));
        assert!(!is_event_name("UNKNOWN_x_1"));
        assert!(!is_event_name("BTN_DOES_NOT_EXIST"));
    }
}
