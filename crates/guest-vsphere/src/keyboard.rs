//! Character → USB HID usage table for console keystroke injection.

use crate::types::KeyEvent;

use log::warn;

/// Keyboard/keypad page usage ids.
const USAGE_A: u16 = 0x04;
const USAGE_ENTER: u16 = 0x28;
const USAGE_SPACE: u16 = 0x2C;

/// Map one character to its key event, or `None` if it has no mapping.
pub fn key_for(c: char) -> Option<KeyEvent> {
    match c {
        'a'..='z' => Some(KeyEvent {
            usage: USAGE_A + (c as u16 - 'a' as u16),
            shift: false,
        }),
        'A'..='Z' => Some(KeyEvent {
            usage: USAGE_A + (c as u16 - 'A' as u16),
            shift: true,
        }),
        ' ' => Some(KeyEvent { usage: USAGE_SPACE, shift: false }),
        '\n' => Some(KeyEvent { usage: USAGE_ENTER, shift: false }),
        _ => None,
    }
}

/// Translate `text` into key events, skipping (and warning about) anything unmapped.
pub fn encode(text: &str) -> Vec<KeyEvent> {
    text.chars()
        .filter_map(|c| {
            let ev = key_for(c);
            if ev.is_none() {
                warn!("Skipping unsupported character {c:?}");
            }
            ev
        })
        .collect()
}
