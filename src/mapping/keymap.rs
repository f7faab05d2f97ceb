//! Key symbols and the direction → key table
//!
//! Codes are the `KEY_*` values of `linux/input-event-codes.h`, the same numbers as
//! `evdev::Key`. The table is plain data so settings validate on every platform.

use super::{Direction, MappingError};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Named keys and the Linux input event codes they produce
const NAMED_KEYS: &[(&str, u16)] = &[
    ("esc", 1),
    ("escape", 1),
    ("backspace", 14),
    ("tab", 15),
    ("enter", 28),
    ("return", 28),
    ("ctrl", 29),
    ("shift", 42),
    ("alt", 56),
    ("space", 57),
    ("caps_lock", 58),
    ("f1", 59),
    ("f2", 60),
    ("f3", 61),
    ("f4", 62),
    ("f5", 63),
    ("f6", 64),
    ("f7", 65),
    ("f8", 66),
    ("f9", 67),
    ("f10", 68),
    ("f11", 87),
    ("f12", 88),
    ("home", 102),
    ("up", 103),
    ("page_up", 104),
    ("left", 105),
    ("right", 106),
    ("end", 107),
    ("down", 108),
    ("page_down", 109),
    ("insert", 110),
    ("delete", 111),
    ("mute", 113),
    ("volume_down", 114),
    ("volume_up", 115),
    ("meta", 125),
    ("next_track", 163),
    ("play_pause", 164),
    ("prev_track", 165),
];

/// Single-character keys of a US layout
const CHAR_KEYS: &[(char, u16)] = &[
    ('1', 2),
    ('2', 3),
    ('3', 4),
    ('4', 5),
    ('5', 6),
    ('6', 7),
    ('7', 8),
    ('8', 9),
    ('9', 10),
    ('0', 11),
    ('-', 12),
    ('=', 13),
    ('q', 16),
    ('w', 17),
    ('e', 18),
    ('r', 19),
    ('t', 20),
    ('y', 21),
    ('u', 22),
    ('i', 23),
    ('o', 24),
    ('p', 25),
    ('[', 26),
    (']', 27),
    ('a', 30),
    ('s', 31),
    ('d', 32),
    ('f', 33),
    ('g', 34),
    ('h', 35),
    ('j', 36),
    ('k', 37),
    ('l', 38),
    (';', 39),
    ('\'', 40),
    ('`', 41),
    ('\\', 43),
    ('z', 44),
    ('x', 45),
    ('c', 46),
    ('v', 47),
    ('b', 48),
    ('n', 49),
    ('m', 50),
    (',', 51),
    ('.', 52),
    ('/', 53),
    (' ', 57),
];

/// A validated key symbol
///
/// Keeps the symbol as written in the settings next to its key code. Letters are
/// case-insensitive and always produce the unshifted key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeySymbol {
    name: String,
    code: u16,
}

impl KeySymbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Linux input event code (`KEY_*`)
    pub fn code(&self) -> u16 {
        self.code
    }

    fn lookup(symbol: &str) -> Option<u16> {
        let mut chars = symbol.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            let c = c.to_ascii_lowercase();
            return CHAR_KEYS
                .iter()
                .find(|(key, _)| *key == c)
                .map(|(_, code)| *code);
        }

        let normalized = symbol.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        NAMED_KEYS
            .iter()
            .find(|(name, _)| *name == normalized)
            .map(|(_, code)| *code)
    }
}

impl FromStr for KeySymbol {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = Self::lookup(s).ok_or_else(|| MappingError::UnknownKey(s.to_string()))?;
        Ok(Self {
            name: s.to_string(),
            code,
        })
    }
}

impl fmt::Display for KeySymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.name())
    }
}

/// Keys bound to the four dial directions plus the rotation rate limit
///
/// Built once at startup, read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMap {
    down: KeySymbol,
    up: KeySymbol,
    left: KeySymbol,
    right: KeySymbol,
    delay: Duration,
}

impl KeyMap {
    pub fn new(
        down: KeySymbol,
        up: KeySymbol,
        left: KeySymbol,
        right: KeySymbol,
        delay: Duration,
    ) -> Self {
        Self {
            down,
            up,
            left,
            right,
            delay,
        }
    }

    pub fn key(&self, direction: Direction) -> &KeySymbol {
        match direction {
            Direction::Down => &self.down,
            Direction::Up => &self.up,
            Direction::Left => &self.left,
            Direction::Right => &self.right,
        }
    }

    /// Minimum time between two rotation events
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Distinct key codes in the map
    pub fn codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = [&self.down, &self.up, &self.left, &self.right]
            .iter()
            .map(|key| key.code())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> KeySymbol {
        s.parse().unwrap()
    }

    #[test]
    fn letters_are_case_insensitive() {
        assert_eq!(key("d").code(), 32);
        assert_eq!(key("D").code(), 32);
        assert_eq!(key("D").name(), "D");
    }

    #[test]
    fn named_keys_accept_separator_variants() {
        assert_eq!(key("page_up").code(), 104);
        assert_eq!(key("Page-Up").code(), 104);
        assert_eq!(key("volume up").code(), 115);
        assert_eq!(key("Enter").code(), 28);
        assert_eq!(key(" ").code(), 57);
    }

    #[test]
    fn unknown_symbols_are_rejected() {
        let err = "hyper".parse::<KeySymbol>().unwrap_err();
        assert!(matches!(err, MappingError::UnknownKey(s) if s == "hyper"));
        assert!("".parse::<KeySymbol>().is_err());
        assert!("é".parse::<KeySymbol>().is_err());
    }

    #[test]
    fn key_map_resolves_directions_and_dedups_codes() {
        let map = KeyMap::new(
            key("d"),
            key("a"),
            key("s"),
            key("a"),
            Duration::from_millis(200),
        );
        assert_eq!(map.key(Direction::Down).name(), "d");
        assert_eq!(map.key(Direction::Right).name(), "a");
        assert_eq!(map.codes(), vec![30, 31, 32]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn codes_match_evdev_key_constants() {
        use evdev::Key;

        let expected = [
            ("a", Key::KEY_A),
            ("d", Key::KEY_D),
            ("z", Key::KEY_Z),
            ("0", Key::KEY_0),
            ("-", Key::KEY_MINUS),
            ("[", Key::KEY_LEFTBRACE),
            ("'", Key::KEY_APOSTROPHE),
            ("`", Key::KEY_GRAVE),
            ("\\", Key::KEY_BACKSLASH),
            ("/", Key::KEY_SLASH),
            ("esc", Key::KEY_ESC),
            ("enter", Key::KEY_ENTER),
            ("ctrl", Key::KEY_LEFTCTRL),
            ("shift", Key::KEY_LEFTSHIFT),
            ("alt", Key::KEY_LEFTALT),
            ("meta", Key::KEY_LEFTMETA),
            ("caps_lock", Key::KEY_CAPSLOCK),
            ("f10", Key::KEY_F10),
            ("f11", Key::KEY_F11),
            ("page_up", Key::KEY_PAGEUP),
            ("down", Key::KEY_DOWN),
            ("delete", Key::KEY_DELETE),
            ("volume_up", Key::KEY_VOLUMEUP),
            ("mute", Key::KEY_MUTE),
            ("play_pause", Key::KEY_PLAYPAUSE),
            ("next_track", Key::KEY_NEXTSONG),
            ("prev_track", Key::KEY_PREVIOUSSONG),
        ];
        for (symbol, evdev_key) in expected {
            assert_eq!(key(symbol).code(), evdev_key.code(), "{}", symbol);
        }
    }
}
