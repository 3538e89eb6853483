//! Text typing on top of the synthesis engine
//!
//! Printable ASCII maps to US-layout chords. Any other character is entered
//! with the Ctrl+Shift+U input-method sequence: the code point in hex,
//! terminated by a space.

use evdev::Key;
use tracing::{debug, warn};

use super::chord::{key_code, KeyChord, Modifier, ModifierMask};
use super::synth::{SynthError, SynthesisEngine};

/// US-layout symbols: (character, key, needs shift).
const SYMBOLS: &[(char, Key, bool)] = &[
    (' ', Key::KEY_SPACE, false),
    ('\n', Key::KEY_ENTER, false),
    ('\t', Key::KEY_TAB, false),
    ('-', Key::KEY_MINUS, false),
    ('_', Key::KEY_MINUS, true),
    ('=', Key::KEY_EQUAL, false),
    ('+', Key::KEY_EQUAL, true),
    ('[', Key::KEY_LEFTBRACE, false),
    ('{', Key::KEY_LEFTBRACE, true),
    (']', Key::KEY_RIGHTBRACE, false),
    ('}', Key::KEY_RIGHTBRACE, true),
    ('\\', Key::KEY_BACKSLASH, false),
    ('|', Key::KEY_BACKSLASH, true),
    (';', Key::KEY_SEMICOLON, false),
    (':', Key::KEY_SEMICOLON, true),
    ('\'', Key::KEY_APOSTROPHE, false),
    ('"', Key::KEY_APOSTROPHE, true),
    ('`', Key::KEY_GRAVE, false),
    ('~', Key::KEY_GRAVE, true),
    (',', Key::KEY_COMMA, false),
    ('<', Key::KEY_COMMA, true),
    ('.', Key::KEY_DOT, false),
    ('>', Key::KEY_DOT, true),
    ('/', Key::KEY_SLASH, false),
    ('?', Key::KEY_SLASH, true),
    ('!', Key::KEY_1, true),
    ('@', Key::KEY_2, true),
    ('#', Key::KEY_3, true),
    ('$', Key::KEY_4, true),
    ('%', Key::KEY_5, true),
    ('^', Key::KEY_6, true),
    ('&', Key::KEY_7, true),
    ('*', Key::KEY_8, true),
    ('(', Key::KEY_9, true),
    (')', Key::KEY_0, true),
];

fn shifted(key: u16) -> KeyChord {
    KeyChord {
        key,
        modifiers: ModifierMask::EMPTY.with(Modifier::Shift),
    }
}

fn plain(key: u16) -> KeyChord {
    KeyChord {
        key,
        modifiers: ModifierMask::EMPTY,
    }
}

/// Chord for a single ASCII character, if the layout has one.
#[must_use]
pub fn ascii_chord(c: char) -> Option<KeyChord> {
    if c.is_ascii_alphanumeric() {
        let code = key_code(&c.to_ascii_lowercase().to_string())?;
        return Some(if c.is_ascii_uppercase() {
            shifted(code)
        } else {
            plain(code)
        });
    }
    SYMBOLS
        .iter()
        .find(|(symbol, _, _)| *symbol == c)
        .map(|(_, key, shift)| {
            if *shift {
                shifted(key.code())
            } else {
                plain(key.code())
            }
        })
}

/// Full chord sequence for one character.
///
/// # Examples
///
/// ```
/// use padkeys::keys::text::chords_for;
///
/// assert_eq!(chords_for('a').len(), 1);
/// // ctrl+shift+u, e, 9, space
/// assert_eq!(chords_for('é').len(), 4);
/// ```
#[must_use]
pub fn chords_for(c: char) -> Vec<KeyChord> {
    if let Some(chord) = ascii_chord(c) {
        return vec![chord];
    }

    let mut chords = vec![KeyChord::new(
        Key::KEY_U,
        ModifierMask::EMPTY
            .with(Modifier::Control)
            .with(Modifier::Shift),
    )];
    for digit in format!("{:x}", u32::from(c)).chars() {
        if let Some(chord) = ascii_chord(digit) {
            chords.push(chord);
        }
    }
    chords.push(KeyChord::plain(Key::KEY_SPACE));
    chords
}

/// Types `text` through `engine`.
///
/// Returns the number of characters typed. Stops at the first character
/// whose synthesis fails.
pub fn type_text(engine: &mut SynthesisEngine, text: &str) -> Result<usize, SynthError> {
    let mut typed = 0;
    for c in text.chars() {
        for chord in chords_for(c) {
            if let Err(e) = engine.press_chord(chord) {
                warn!("Typing stopped at character {} ({:?}): {}", typed, c, e);
                return Err(e);
            }
        }
        typed += 1;
    }
    debug!("Typed {} characters", typed);
    Ok(typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::foreground::NoForeground;
    use crate::keys::sink::mocks::RecordingSink;
    use crate::keys::sink::Direction;
    use std::time::Duration;

    #[test]
    fn test_ascii_letters_and_digits() {
        assert_eq!(ascii_chord('a'), Some(KeyChord::plain(Key::KEY_A)));
        assert_eq!(ascii_chord('Z'), Some(shifted(Key::KEY_Z.code())));
        assert_eq!(ascii_chord('7'), Some(KeyChord::plain(Key::KEY_7)));
    }

    #[test]
    fn test_ascii_symbols() {
        assert_eq!(ascii_chord('?'), Some(shifted(Key::KEY_SLASH.code())));
        assert_eq!(ascii_chord('/'), Some(KeyChord::plain(Key::KEY_SLASH)));
        assert_eq!(ascii_chord('\n'), Some(KeyChord::plain(Key::KEY_ENTER)));
        assert_eq!(ascii_chord('é'), None);
    }

    #[test]
    fn test_unicode_sequence() {
        let chords = chords_for('€');
        // U+20AC
        assert_eq!(chords.len(), 6);
        assert_eq!(chords[0].to_string(), "ctrl+shift+u");
        assert_eq!(chords[1], KeyChord::plain(Key::KEY_2));
        assert_eq!(chords[3], KeyChord::plain(Key::KEY_A));
        assert_eq!(chords[5], KeyChord::plain(Key::KEY_SPACE));
    }

    #[test]
    fn test_type_text_posts_every_character() {
        let sink = RecordingSink::new();
        let mut engine = SynthesisEngine::new(Box::new(sink.clone()), Box::new(NoForeground))
            .with_delay(Duration::ZERO);

        assert_eq!(type_text(&mut engine, "Hi"), Ok(2));
        let downs: Vec<u16> = sink
            .events()
            .iter()
            .filter(|e| e.direction == Direction::Down)
            .map(|e| e.code)
            .collect();
        assert_eq!(
            downs,
            vec![Key::KEY_LEFTSHIFT.code(), Key::KEY_H.code(), Key::KEY_I.code()]
        );
    }

    #[test]
    fn test_type_text_stops_when_unauthorized() {
        let sink = RecordingSink::new();
        sink.set_authorized(false);
        let mut engine = SynthesisEngine::new(Box::new(sink.clone()), Box::new(NoForeground))
            .with_delay(Duration::ZERO);

        assert_eq!(type_text(&mut engine, "abc"), Err(SynthError::Unauthorized));
        assert!(sink.events().is_empty());
    }
}
