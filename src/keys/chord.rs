//! # Key Chord Module
//!
//! A [`KeyChord`] is one base key plus a set of modifier flags.
//!
//! ## Modifiers
//!
//! | Kind | Left code | Right code | Config names |
//! |------|-----------|------------|--------------|
//! | Control | KEY_LEFTCTRL | KEY_RIGHTCTRL | `ctrl`, `control` |
//! | Option | KEY_LEFTALT | KEY_RIGHTALT | `alt`, `option`, `opt` |
//! | Shift | KEY_LEFTSHIFT | KEY_RIGHTSHIFT | `shift` |
//! | Command | KEY_LEFTMETA | KEY_RIGHTMETA | `super`, `meta`, `cmd`, `command`, `win` |
//! | Function | KEY_FN | KEY_FN | `fn`, `function` |
//!
//! ## Chord Syntax
//!
//! Chords are written as `+`-separated names, modifiers first:
//!
//! ```
//! use padkeys::keys::chord::{KeyChord, Modifier};
//! use evdev::Key;
//!
//! let chord: KeyChord = "ctrl+shift+tab".parse()?;
//! assert_eq!(chord.key, Key::KEY_TAB.code());
//! assert!(chord.modifiers.contains(Modifier::Control));
//! assert!(chord.modifiers.contains(Modifier::Shift));
//!
//! // A modifier on its own is a modifier-only chord with hold semantics
//! let hold: KeyChord = "right_shift".parse()?;
//! assert!(hold.is_modifier_only());
//! # Ok::<(), padkeys::error::PadkeysError>(())
//! ```

use evdev::Key;
use std::fmt;
use std::str::FromStr;

use crate::error::PadkeysError;

/// A modifier kind, independent of its left/right key variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Control,
    Option,
    Shift,
    Command,
    Function,
}

impl Modifier {
    /// Canonical press order for standard chord synthesis.
    pub const ORDER: [Modifier; 5] = [
        Modifier::Control,
        Modifier::Option,
        Modifier::Shift,
        Modifier::Command,
        Modifier::Function,
    ];

    #[must_use]
    pub fn bit(self) -> u8 {
        match self {
            Modifier::Control => 1 << 0,
            Modifier::Option => 1 << 1,
            Modifier::Shift => 1 << 2,
            Modifier::Command => 1 << 3,
            Modifier::Function => 1 << 4,
        }
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.bit().trailing_zeros() as usize
    }

    /// Key code of the left-hand variant, used when a chord names the kind.
    #[must_use]
    pub fn left_code(self) -> u16 {
        match self {
            Modifier::Control => Key::KEY_LEFTCTRL.code(),
            Modifier::Option => Key::KEY_LEFTALT.code(),
            Modifier::Shift => Key::KEY_LEFTSHIFT.code(),
            Modifier::Command => Key::KEY_LEFTMETA.code(),
            Modifier::Function => Key::KEY_FN.code(),
        }
    }

    #[must_use]
    pub fn right_code(self) -> u16 {
        match self {
            Modifier::Control => Key::KEY_RIGHTCTRL.code(),
            Modifier::Option => Key::KEY_RIGHTALT.code(),
            Modifier::Shift => Key::KEY_RIGHTSHIFT.code(),
            Modifier::Command => Key::KEY_RIGHTMETA.code(),
            Modifier::Function => Key::KEY_FN.code(),
        }
    }

    /// Resolves a modifier kind from either variant's key code.
    #[must_use]
    pub fn from_key_code(code: u16) -> Option<Modifier> {
        Modifier::ORDER
            .into_iter()
            .find(|modifier| modifier.left_code() == code || modifier.right_code() == code)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Modifier::Control => "ctrl",
            Modifier::Option => "alt",
            Modifier::Shift => "shift",
            Modifier::Command => "super",
            Modifier::Function => "fn",
        }
    }

    fn from_name(name: &str) -> Option<Modifier> {
        match name {
            "ctrl" | "control" => Some(Modifier::Control),
            "alt" | "option" | "opt" => Some(Modifier::Option),
            "shift" => Some(Modifier::Shift),
            "super" | "meta" | "cmd" | "command" | "win" => Some(Modifier::Command),
            "fn" | "function" => Some(Modifier::Function),
            _ => None,
        }
    }
}

/// Bitset of [`Modifier`] kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModifierMask(u8);

impl ModifierMask {
    pub const EMPTY: ModifierMask = ModifierMask(0);

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1_1111)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn contains(self, modifier: Modifier) -> bool {
        self.0 & modifier.bit() != 0
    }

    #[must_use]
    pub fn with(self, modifier: Modifier) -> Self {
        Self(self.0 | modifier.bit())
    }

    #[must_use]
    pub fn without(self, modifier: Modifier) -> Self {
        Self(self.0 & !modifier.bit())
    }

    #[must_use]
    pub fn union(self, other: ModifierMask) -> Self {
        Self(self.0 | other.0)
    }

    /// Members in canonical order.
    pub fn iter(self) -> impl DoubleEndedIterator<Item = Modifier> {
        Modifier::ORDER.into_iter().filter(move |m| self.contains(*m))
    }
}

impl FromIterator<Modifier> for ModifierMask {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        iter.into_iter().fold(ModifierMask::EMPTY, ModifierMask::with)
    }
}

impl fmt::Display for ModifierMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(Modifier::name).collect();
        f.write_str(&names.join("+"))
    }
}

/// One base key plus modifier flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    /// Linux input key code of the base key.
    pub key: u16,
    pub modifiers: ModifierMask,
}

impl KeyChord {
    #[must_use]
    pub fn new(key: Key, modifiers: ModifierMask) -> Self {
        Self {
            key: key.code(),
            modifiers,
        }
    }

    #[must_use]
    pub fn plain(key: Key) -> Self {
        Self::new(key, ModifierMask::EMPTY)
    }

    /// A chord whose base key is itself a modifier and carries no flags.
    #[must_use]
    pub fn is_modifier_only(&self) -> bool {
        self.modifiers.is_empty() && Modifier::from_key_code(self.key).is_some()
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.modifiers.is_empty() {
            write!(f, "{}+", self.modifiers)?;
        }
        f.write_str(&key_name(self.key))
    }
}

impl FromStr for KeyChord {
    type Err = PadkeysError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<String> = s
            .split('+')
            .map(|part| part.trim().to_ascii_lowercase())
            .collect();

        // "ctrl++" and "+" name the plus key
        let (base, modifier_parts) = match parts.as_slice() {
            [] => return Err(PadkeysError::Binding("empty chord".to_string())),
            [.., a, b] if a.is_empty() && b.is_empty() => ("plus".to_string(), &parts[..parts.len() - 2]),
            [init @ .., last] => (last.clone(), init),
        };

        let mut modifiers = ModifierMask::EMPTY;
        for name in modifier_parts {
            let modifier = Modifier::from_name(name).ok_or_else(|| {
                PadkeysError::Binding(format!("'{}' is not a modifier in chord '{}'", name, s))
            })?;
            modifiers = modifiers.with(modifier);
        }

        let key = key_code(&base)
            .ok_or_else(|| PadkeysError::Binding(format!("unknown key '{}' in chord '{}'", base, s)))?;

        Ok(KeyChord { key, modifiers })
    }
}

/// Key names accepted in chords, beyond letters, digits and F-keys.
const NAMED_KEYS: &[(&str, Key)] = &[
    ("ctrl", Key::KEY_LEFTCTRL),
    ("control", Key::KEY_LEFTCTRL),
    ("left_ctrl", Key::KEY_LEFTCTRL),
    ("right_ctrl", Key::KEY_RIGHTCTRL),
    ("alt", Key::KEY_LEFTALT),
    ("option", Key::KEY_LEFTALT),
    ("opt", Key::KEY_LEFTALT),
    ("left_alt", Key::KEY_LEFTALT),
    ("right_alt", Key::KEY_RIGHTALT),
    ("shift", Key::KEY_LEFTSHIFT),
    ("left_shift", Key::KEY_LEFTSHIFT),
    ("right_shift", Key::KEY_RIGHTSHIFT),
    ("super", Key::KEY_LEFTMETA),
    ("meta", Key::KEY_LEFTMETA),
    ("cmd", Key::KEY_LEFTMETA),
    ("command", Key::KEY_LEFTMETA),
    ("win", Key::KEY_LEFTMETA),
    ("left_super", Key::KEY_LEFTMETA),
    ("right_super", Key::KEY_RIGHTMETA),
    ("fn", Key::KEY_FN),
    ("function", Key::KEY_FN),
    ("escape", Key::KEY_ESC),
    ("esc", Key::KEY_ESC),
    ("enter", Key::KEY_ENTER),
    ("return", Key::KEY_ENTER),
    ("tab", Key::KEY_TAB),
    ("space", Key::KEY_SPACE),
    ("backspace", Key::KEY_BACKSPACE),
    ("delete", Key::KEY_DELETE),
    ("insert", Key::KEY_INSERT),
    ("home", Key::KEY_HOME),
    ("end", Key::KEY_END),
    ("pageup", Key::KEY_PAGEUP),
    ("page_up", Key::KEY_PAGEUP),
    ("pagedown", Key::KEY_PAGEDOWN),
    ("page_down", Key::KEY_PAGEDOWN),
    ("up", Key::KEY_UP),
    ("down", Key::KEY_DOWN),
    ("left", Key::KEY_LEFT),
    ("right", Key::KEY_RIGHT),
    ("capslock", Key::KEY_CAPSLOCK),
    ("minus", Key::KEY_MINUS),
    ("-", Key::KEY_MINUS),
    ("equal", Key::KEY_EQUAL),
    ("=", Key::KEY_EQUAL),
    ("plus", Key::KEY_EQUAL),
    ("leftbrace", Key::KEY_LEFTBRACE),
    ("[", Key::KEY_LEFTBRACE),
    ("rightbrace", Key::KEY_RIGHTBRACE),
    ("]", Key::KEY_RIGHTBRACE),
    ("semicolon", Key::KEY_SEMICOLON),
    (";", Key::KEY_SEMICOLON),
    ("apostrophe", Key::KEY_APOSTROPHE),
    ("'", Key::KEY_APOSTROPHE),
    ("grave", Key::KEY_GRAVE),
    ("`", Key::KEY_GRAVE),
    ("backslash", Key::KEY_BACKSLASH),
    ("\\", Key::KEY_BACKSLASH),
    ("comma", Key::KEY_COMMA),
    (",", Key::KEY_COMMA),
    ("dot", Key::KEY_DOT),
    ("period", Key::KEY_DOT),
    (".", Key::KEY_DOT),
    ("slash", Key::KEY_SLASH),
    ("/", Key::KEY_SLASH),
    ("print", Key::KEY_SYSRQ),
    ("volumeup", Key::KEY_VOLUMEUP),
    ("volumedown", Key::KEY_VOLUMEDOWN),
    ("mute", Key::KEY_MUTE),
    ("playpause", Key::KEY_PLAYPAUSE),
    ("nextsong", Key::KEY_NEXTSONG),
    ("previoussong", Key::KEY_PREVIOUSSONG),
];

const LETTER_KEYS: [Key; 26] = [
    Key::KEY_A, Key::KEY_B, Key::KEY_C, Key::KEY_D, Key::KEY_E, Key::KEY_F, Key::KEY_G,
    Key::KEY_H, Key::KEY_I, Key::KEY_J, Key::KEY_K, Key::KEY_L, Key::KEY_M, Key::KEY_N,
    Key::KEY_O, Key::KEY_P, Key::KEY_Q, Key::KEY_R, Key::KEY_S, Key::KEY_T, Key::KEY_U,
    Key::KEY_V, Key::KEY_W, Key::KEY_X, Key::KEY_Y, Key::KEY_Z,
];

const DIGIT_KEYS: [Key; 10] = [
    Key::KEY_0, Key::KEY_1, Key::KEY_2, Key::KEY_3, Key::KEY_4,
    Key::KEY_5, Key::KEY_6, Key::KEY_7, Key::KEY_8, Key::KEY_9,
];

const FUNCTION_KEYS: [Key; 12] = [
    Key::KEY_F1, Key::KEY_F2, Key::KEY_F3, Key::KEY_F4, Key::KEY_F5, Key::KEY_F6,
    Key::KEY_F7, Key::KEY_F8, Key::KEY_F9, Key::KEY_F10, Key::KEY_F11, Key::KEY_F12,
];

/// Looks up a key code by its chord name.
///
/// Accepts letters, digits, `f1`..`f12`, the names in the table above and
/// raw codes written as `code:<n>`.
#[must_use]
pub fn key_code(name: &str) -> Option<u16> {
    let name = name.trim().to_ascii_lowercase();

    if let Some(raw) = name.strip_prefix("code:") {
        return raw.parse().ok();
    }

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_lowercase() {
            return Some(LETTER_KEYS[(c as u8 - b'a') as usize].code());
        }
        if c.is_ascii_digit() {
            return Some(DIGIT_KEYS[(c as u8 - b'0') as usize].code());
        }
    }

    if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<usize>().ok()) {
        if (1..=FUNCTION_KEYS.len()).contains(&n) {
            return Some(FUNCTION_KEYS[n - 1].code());
        }
    }

    NAMED_KEYS
        .iter()
        .find(|(key_name, _)| *key_name == name)
        .map(|(_, key)| key.code())
}

/// Human-readable name of a key code, for logs and status output.
#[must_use]
pub fn key_name(code: u16) -> String {
    if let Some(index) = LETTER_KEYS.iter().position(|key| key.code() == code) {
        return ((b'a' + index as u8) as char).to_string();
    }
    if let Some(index) = DIGIT_KEYS.iter().position(|key| key.code() == code) {
        return index.to_string();
    }
    if let Some(index) = FUNCTION_KEYS.iter().position(|key| key.code() == code) {
        return format!("f{}", index + 1);
    }
    NAMED_KEYS
        .iter()
        .find(|(_, key)| key.code() == code)
        .map(|(name, _)| (*name).to_string())
        .unwrap_or_else(|| format!("code:{}", code))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Modifier Tests ====================

    #[test]
    fn test_modifier_from_either_variant() {
        assert_eq!(Modifier::from_key_code(Key::KEY_LEFTSHIFT.code()), Some(Modifier::Shift));
        assert_eq!(Modifier::from_key_code(Key::KEY_RIGHTSHIFT.code()), Some(Modifier::Shift));
        assert_eq!(Modifier::from_key_code(Key::KEY_RIGHTMETA.code()), Some(Modifier::Command));
        assert_eq!(Modifier::from_key_code(Key::KEY_FN.code()), Some(Modifier::Function));
        assert_eq!(Modifier::from_key_code(Key::KEY_A.code()), None);
    }

    #[test]
    fn test_modifier_indices_are_dense() {
        let indices: Vec<_> = Modifier::ORDER.iter().map(|m| m.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    // ==================== ModifierMask Tests ====================

    #[test]
    fn test_mask_operations() {
        let mask = ModifierMask::EMPTY.with(Modifier::Shift).with(Modifier::Control);
        assert!(mask.contains(Modifier::Shift));
        assert!(mask.contains(Modifier::Control));
        assert!(!mask.contains(Modifier::Option));

        let mask = mask.without(Modifier::Shift);
        assert!(!mask.contains(Modifier::Shift));
        assert!(!mask.is_empty());
    }

    #[test]
    fn test_mask_iterates_in_canonical_order() {
        let mask: ModifierMask = [Modifier::Function, Modifier::Shift, Modifier::Control]
            .into_iter()
            .collect();
        let order: Vec<_> = mask.iter().collect();
        assert_eq!(order, vec![Modifier::Control, Modifier::Shift, Modifier::Function]);

        let reversed: Vec<_> = mask.iter().rev().collect();
        assert_eq!(reversed, vec![Modifier::Function, Modifier::Shift, Modifier::Control]);
    }

    #[test]
    fn test_from_bits_masks_unknown_bits() {
        assert_eq!(ModifierMask::from_bits(0xFF).bits(), 0b1_1111);
    }

    // ==================== KeyChord Tests ====================

    #[test]
    fn test_parse_plain_key() {
        let chord: KeyChord = "a".parse().unwrap();
        assert_eq!(chord, KeyChord::plain(Key::KEY_A));
        assert!(!chord.is_modifier_only());
    }

    #[test]
    fn test_parse_with_modifiers() {
        let chord: KeyChord = "Ctrl + Alt + Delete".parse().unwrap();
        assert_eq!(chord.key, Key::KEY_DELETE.code());
        assert!(chord.modifiers.contains(Modifier::Control));
        assert!(chord.modifiers.contains(Modifier::Option));
    }

    #[test]
    fn test_parse_function_keys_and_raw_codes() {
        assert_eq!("f5".parse::<KeyChord>().unwrap().key, Key::KEY_F5.code());
        assert_eq!("shift+f12".parse::<KeyChord>().unwrap().key, Key::KEY_F12.code());
        assert_eq!("code:183".parse::<KeyChord>().unwrap().key, 183);
        assert!("f13".parse::<KeyChord>().is_err());
    }

    #[test]
    fn test_parse_plus_key() {
        let chord: KeyChord = "ctrl++".parse().unwrap();
        assert_eq!(chord.key, Key::KEY_EQUAL.code());
        assert!(chord.modifiers.contains(Modifier::Control));
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<KeyChord>().is_err());
        assert!("hyper+a".parse::<KeyChord>().is_err());
        assert!("ctrl+nosuchkey".parse::<KeyChord>().is_err());
    }

    #[test]
    fn test_modifier_only_chords() {
        assert!("shift".parse::<KeyChord>().unwrap().is_modifier_only());
        assert!("right_ctrl".parse::<KeyChord>().unwrap().is_modifier_only());
        assert!("fn".parse::<KeyChord>().unwrap().is_modifier_only());
        // A modifier base key with flags is an ordinary chord
        assert!(!"ctrl+shift".parse::<KeyChord>().unwrap().is_modifier_only());
    }

    #[test]
    fn test_every_modifier_name_parses_alone() {
        let names = [
            "ctrl", "control", "alt", "option", "opt", "shift", "super", "meta", "cmd",
            "command", "win", "fn", "function",
        ];
        for name in names {
            let modifier = Modifier::from_name(name).unwrap();
            let chord: KeyChord = name.parse().unwrap();
            assert!(chord.is_modifier_only(), "{} is not modifier-only", name);
            assert_eq!(Modifier::from_key_code(chord.key), Some(modifier), "{}", name);
        }
        assert_eq!("win".parse::<KeyChord>().unwrap(), "super".parse::<KeyChord>().unwrap());
    }

    #[test]
    fn test_display() {
        let chord: KeyChord = "shift+ctrl+tab".parse().unwrap();
        assert_eq!(chord.to_string(), "ctrl+shift+tab");
        assert_eq!(KeyChord::plain(Key::KEY_F3).to_string(), "f3");
        assert_eq!(key_name(0x2ff), "code:767");
    }
}
