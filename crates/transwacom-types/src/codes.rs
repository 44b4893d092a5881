//! Static event-code table.
//!
//! The wire protocol names events symbolically (`ABS_X`, `BTN_STYLUS`,
//! `SYN_REPORT`). This module maps those names to and from the Linux
//! input ABI `(type, code)` pairs for the closed alphabet the protocol
//! supports. Codes outside the alphabet are encoded as
//! `TYPE_<t>_CODE_<c>` and dropped by the receiver.

/// Event type class, matching the Linux input `EV_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Syn,
    Key,
    Rel,
    Abs,
}

impl EventClass {
    /// Raw `EV_*` value for this class.
    #[must_use]
    pub fn raw(self) -> u16 {
        match self {
            Self::Syn => 0x00,
            Self::Key => 0x01,
            Self::Rel => 0x02,
            Self::Abs => 0x03,
        }
    }

    /// Class for a raw `EV_*` value, if it is one we transport.
    #[must_use]
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0x00 => Some(Self::Syn),
            0x01 => Some(Self::Key),
            0x02 => Some(Self::Rel),
            0x03 => Some(Self::Abs),
            _ => None,
        }
    }
}

const SYN_CODES: &[(&str, u16)] = &[
    ("SYN_REPORT", 0x00),
    ("SYN_CONFIG", 0x01),
    ("SYN_MT_REPORT", 0x02),
    ("SYN_DROPPED", 0x03),
];

const ABS_CODES: &[(&str, u16)] = &[
    ("ABS_X", 0x00),
    ("ABS_Y", 0x01),
    ("ABS_Z", 0x02),
    ("ABS_RX", 0x03),
    ("ABS_RY", 0x04),
    ("ABS_RZ", 0x05),
    ("ABS_THROTTLE", 0x06),
    ("ABS_RUDDER", 0x07),
    ("ABS_WHEEL", 0x08),
    ("ABS_HAT0X", 0x10),
    ("ABS_HAT0Y", 0x11),
    ("ABS_HAT1X", 0x12),
    ("ABS_HAT1Y", 0x13),
    ("ABS_PRESSURE", 0x18),
    ("ABS_DISTANCE", 0x19),
    ("ABS_TILT_X", 0x1a),
    ("ABS_TILT_Y", 0x1b),
    ("ABS_MISC", 0x28),
];

const REL_CODES: &[(&str, u16)] = &[
    ("REL_X", 0x00),
    ("REL_Y", 0x01),
    ("REL_Z", 0x02),
    ("REL_HWHEEL", 0x06),
    ("REL_DIAL", 0x07),
    ("REL_WHEEL", 0x08),
    ("REL_MISC", 0x09),
];

// BTN_ entries come first: the EV_KEY reverse lookup prefers button
// names for codes that have both spellings, as tablets and gamepads
// report buttons, not keys.
const KEY_CODES: &[(&str, u16)] = &[
    // Mouse-style buttons (tablets report stylus side switches here too)
    ("BTN_LEFT", 0x110),
    ("BTN_RIGHT", 0x111),
    ("BTN_MIDDLE", 0x112),
    ("BTN_SIDE", 0x113),
    ("BTN_EXTRA", 0x114),
    // Legacy joystick buttons
    ("BTN_TRIGGER", 0x120),
    ("BTN_THUMB", 0x121),
    ("BTN_THUMB2", 0x122),
    ("BTN_TOP", 0x123),
    ("BTN_TOP2", 0x124),
    ("BTN_PINKIE", 0x125),
    ("BTN_BASE", 0x126),
    ("BTN_BASE2", 0x127),
    // Gamepad buttons
    ("BTN_A", 0x130),
    ("BTN_B", 0x131),
    ("BTN_C", 0x132),
    ("BTN_X", 0x133),
    ("BTN_Y", 0x134),
    ("BTN_Z", 0x135),
    ("BTN_TL", 0x136),
    ("BTN_TR", 0x137),
    ("BTN_TL2", 0x138),
    ("BTN_TR2", 0x139),
    ("BTN_SELECT", 0x13a),
    ("BTN_START", 0x13b),
    ("BTN_MODE", 0x13c),
    ("BTN_THUMBL", 0x13d),
    ("BTN_THUMBR", 0x13e),
    // Tablet tool and stylus buttons
    ("BTN_TOOL_PEN", 0x140),
    ("BTN_TOOL_RUBBER", 0x141),
    ("BTN_TOOL_BRUSH", 0x142),
    ("BTN_TOOL_PENCIL", 0x143),
    ("BTN_TOOL_AIRBRUSH", 0x144),
    ("BTN_TOOL_FINGER", 0x145),
    ("BTN_TOOL_MOUSE", 0x146),
    ("BTN_TOOL_LENS", 0x147),
    ("BTN_TOUCH", 0x14a),
    ("BTN_STYLUS", 0x14b),
    ("BTN_STYLUS2", 0x14c),
    ("BTN_TOOL_DOUBLETAP", 0x14d),
    ("BTN_TOOL_TRIPLETAP", 0x14e),
    // D-pad buttons (some gamepads report these instead of HAT axes)
    ("BTN_DPAD_UP", 0x220),
    ("BTN_DPAD_DOWN", 0x221),
    ("BTN_DPAD_LEFT", 0x222),
    ("BTN_DPAD_RIGHT", 0x223),
    // Keys seen on tablet express-key pads
    ("KEY_ESC", 0x01),
    ("KEY_ENTER", 0x1c),
    ("KEY_LEFTCTRL", 0x1d),
    ("KEY_LEFTSHIFT", 0x2a),
    ("KEY_LEFTALT", 0x38),
    ("KEY_SPACE", 0x39),
    ("KEY_PROG1", 0x94),
    ("KEY_PROG2", 0x95),
    ("KEY_PROG3", 0xca),
];

fn table(class: EventClass) -> &'static [(&'static str, u16)] {
    match class {
        EventClass::Syn => SYN_CODES,
        EventClass::Key => KEY_CODES,
        EventClass::Rel => REL_CODES,
        EventClass::Abs => ABS_CODES,
    }
}

/// Symbolic name for a raw `(type, code)` pair.
///
/// Unknown pairs synthesise `TYPE_<t>_CODE_<c>`; receivers drop those.
#[must_use]
pub fn name_for(raw_type: u16, raw_code: u16) -> String {
    if let Some(class) = EventClass::from_raw(raw_type) {
        if let Some((name, _)) = table(class).iter().find(|(_, c)| *c == raw_code) {
            return (*name).to_string();
        }
    }
    format!("TYPE_{raw_type}_CODE_{raw_code}")
}

/// Resolve a symbolic name back to its `(class, code)` pair.
///
/// The prefix selects the class; the suffix must be in the table.
/// Returns `None` for anything outside the alphabet, including the
/// synthesised `TYPE_*_CODE_*` names.
#[must_use]
pub fn resolve(name: &str) -> Option<(EventClass, u16)> {
    let class = if name.starts_with("ABS_") {
        EventClass::Abs
    } else if name.starts_with("KEY_") || name.starts_with("BTN_") {
        EventClass::Key
    } else if name.starts_with("REL_") {
        EventClass::Rel
    } else if name.starts_with("SYN_") {
        EventClass::Syn
    } else {
        return None;
    };

    table(class)
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| (class, *code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip() {
        for class in [
            EventClass::Syn,
            EventClass::Key,
            EventClass::Rel,
            EventClass::Abs,
        ] {
            for (name, code) in table(class) {
                assert_eq!(name_for(class.raw(), *code), *name);
                assert_eq!(resolve(name), Some((class, *code)), "{name}");
            }
        }
    }

    #[test]
    fn unknown_code_synthesised() {
        assert_eq!(name_for(3, 0x3f), "TYPE_3_CODE_63");
        assert_eq!(name_for(21, 5), "TYPE_21_CODE_5");
    }

    #[test]
    fn unknown_name_rejected() {
        assert!(resolve("ABS_QUUX").is_none());
        assert!(resolve("TYPE_3_CODE_63").is_none());
        assert!(resolve("FROB_X").is_none());
    }

    #[test]
    fn stylus_buttons_resolve_as_key_class() {
        let (class, code) = resolve("BTN_STYLUS").unwrap();
        assert_eq!(class, EventClass::Key);
        assert_eq!(code, 0x14b);
    }

    #[test]
    fn sync_report_is_class_syn() {
        let (class, code) = resolve("SYN_REPORT").unwrap();
        assert_eq!(class, EventClass::Syn);
        assert_eq!(code, 0);
        assert_eq!(class.raw(), 0);
    }
}
