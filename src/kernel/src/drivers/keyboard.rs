//! Keyboard input buffer for user programs.
//!
//! Scancodes arrive from the keyboard interrupt and are decoded with
//! `pc-keyboard` (set 1, US layout). While buffering is active the last
//! printable character is held until a program asks for it.

use pc_keyboard::{layouts, DecodedKey, HandleControl, Keyboard, ScancodeSet1};

/// The last printable key, held until a program reads it.
pub struct KeyboardBuffer {
    decoder: Keyboard<layouts::Us104Key, ScancodeSet1>,
    active: bool,
    pending: Option<u8>,
}

impl KeyboardBuffer {
    pub const fn new() -> Self {
        Self {
            decoder: Keyboard::new(ScancodeSet1::new(), layouts::Us104Key, HandleControl::Ignore),
            active: false,
            pending: None,
        }
    }

    /// Starts holding decoded characters for [`take`](Self::take).
    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Stops buffering and drops anything held.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.pending = None;
    }

    /// Whether keystrokes are being kept.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feeds one raw scancode. Modifier state is tracked even while inactive.
    pub fn push_scancode(&mut self, scancode: u8) {
        let key = match self.decoder.add_byte(scancode) {
            Ok(Some(event)) => self.decoder.process_keyevent(event),
            _ => None,
        };
        if !self.active {
            return;
        }
        if let Some(DecodedKey::Unicode(c)) = key {
            if c.is_ascii() {
                self.pending = Some(c as u8);
            }
        }
    }

    /// Takes the held character, if any.
    pub fn take(&mut self) -> Option<u8> {
        self.pending.take()
    }
}

impl Default for KeyboardBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A_PRESS: u8 = 0x1E;
    const A_RELEASE: u8 = 0x9E;
    const LEFT_SHIFT_PRESS: u8 = 0x2A;
    const LEFT_SHIFT_RELEASE: u8 = 0xAA;
    const ENTER_PRESS: u8 = 0x1C;

    #[test]
    fn test_inactive_ignores_keys() {
        let mut keyboard = KeyboardBuffer::new();
        keyboard.push_scancode(A_PRESS);
        assert_eq!(keyboard.take(), None);
    }

    #[test]
    fn test_active_buffers_last_char() {
        let mut keyboard = KeyboardBuffer::new();
        keyboard.activate();
        keyboard.push_scancode(A_PRESS);
        keyboard.push_scancode(A_RELEASE);
        assert_eq!(keyboard.take(), Some(b'a'));
        assert_eq!(keyboard.take(), None);

        keyboard.push_scancode(ENTER_PRESS);
        assert_eq!(keyboard.take(), Some(b'\n'));
    }

    #[test]
    fn test_shift_tracked() {
        let mut keyboard = KeyboardBuffer::new();
        keyboard.activate();
        keyboard.push_scancode(LEFT_SHIFT_PRESS);
        keyboard.push_scancode(A_PRESS);
        keyboard.push_scancode(A_RELEASE);
        keyboard.push_scancode(LEFT_SHIFT_RELEASE);
        assert_eq!(keyboard.take(), Some(b'A'));
    }

    #[test]
    fn test_deactivate_drops_pending() {
        let mut keyboard = KeyboardBuffer::new();
        keyboard.activate();
        keyboard.push_scancode(A_PRESS);
        keyboard.deactivate();
        assert_eq!(keyboard.take(), None);
        assert!(!keyboard.is_active());
    }
}
