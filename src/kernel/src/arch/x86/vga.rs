//! VGA text mode console.
//!
//! The buffer sits at physical 0xB8000, reached through the kernel's
//! higher-half mapping of the first frame.

use crate::config::KERNEL_VIRTUAL_BASE;
use core::fmt;
use core::ptr;
use ember_common::syscall::{SCREEN_COLUMNS, SCREEN_ROWS};
use spin::Mutex;

const VGA_BUFFER_ADDR: usize = KERNEL_VIRTUAL_BASE as usize + 0xB8000;

const BUFFER_HEIGHT: usize = SCREEN_ROWS as usize;
const BUFFER_WIDTH: usize = SCREEN_COLUMNS as usize;

/// Standard 16-color VGA palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    /// Black.
    Black = 0,
    /// Blue.
    Blue = 1,
    /// Green.
    Green = 2,
    /// Cyan.
    Cyan = 3,
    /// Red.
    Red = 4,
    /// Magenta.
    Magenta = 5,
    /// Brown.
    Brown = 6,
    /// Light gray.
    LightGray = 7,
    /// Dark gray.
    DarkGray = 8,
    /// Light blue.
    LightBlue = 9,
    /// Light green.
    LightGreen = 10,
    /// Light cyan.
    LightCyan = 11,
    /// Light red.
    LightRed = 12,
    /// Pink.
    Pink = 13,
    /// Yellow.
    Yellow = 14,
    /// White.
    White = 15,
}

/// Attribute byte: background in the high nibble.
pub const fn attribute(foreground: Color, background: Color) -> u8 {
    (background as u8) << 4 | (foreground as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct ScreenChar {
    ascii_character: u8,
    attribute: u8,
}

#[repr(transparent)]
struct Buffer {
    chars: [[ScreenChar; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

/// Global VGA writer.
pub static WRITER: Mutex<Writer> = Mutex::new(Writer::new());

/// Text writer with a cursor on the bottom row; output scrolls up.
pub struct Writer {
    column_position: usize,
    attribute: u8,
    buffer: *mut Buffer,
}

// SAFETY: the buffer is memory-mapped hardware alive for the kernel's
// lifetime, and every access goes through the WRITER lock.
unsafe impl Send for Writer {}

impl Writer {
    const fn new() -> Self {
        Writer {
            column_position: 0,
            attribute: attribute(Color::White, Color::Black),
            buffer: VGA_BUFFER_ADDR as *mut Buffer,
        }
    }

    /// Sets the attribute used for later writes.
    pub fn set_color(&mut self, foreground: Color, background: Color) {
        self.attribute = attribute(foreground, background);
    }

    fn put(&mut self, row: usize, col: usize, byte: u8, attribute: u8) {
        debug_assert!(row < BUFFER_HEIGHT && col < BUFFER_WIDTH);
        // SAFETY: indices are in bounds and the buffer is mapped (see module
        // docs). Volatile because the card reads it behind our back.
        unsafe {
            ptr::write_volatile(
                &mut (*self.buffer).chars[row][col],
                ScreenChar {
                    ascii_character: byte,
                    attribute,
                },
            );
        }
    }

    /// Writes one byte at the cursor in `attribute`.
    pub fn write_byte_with(&mut self, byte: u8, attribute: u8) {
        match byte {
            b'\n' => self.new_line(),
            0x08 => {
                if self.column_position > 0 {
                    self.column_position -= 1;
                    self.put(BUFFER_HEIGHT - 1, self.column_position, b' ', attribute);
                }
            }
            byte => {
                if self.column_position >= BUFFER_WIDTH {
                    self.new_line();
                }
                self.put(BUFFER_HEIGHT - 1, self.column_position, byte, attribute);
                self.column_position += 1;
            }
        }
    }

    fn new_line(&mut self) {
        for row in 1..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                // SAFETY: row - 1 and row are both below BUFFER_HEIGHT.
                unsafe {
                    let character = ptr::read_volatile(&(*self.buffer).chars[row][col]);
                    ptr::write_volatile(&mut (*self.buffer).chars[row - 1][col], character);
                }
            }
        }
        self.clear_row(BUFFER_HEIGHT - 1);
        self.column_position = 0;
    }

    fn clear_row(&mut self, row: usize) {
        for col in 0..BUFFER_WIDTH {
            self.put(row, col, b' ', self.attribute);
        }
    }

    /// Blanks every cell and homes the cursor.
    pub fn clear_screen(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
        self.column_position = 0;
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            match byte {
                0x20..=0x7e | b'\n' => self.write_byte_with(byte, self.attribute),
                _ => self.write_byte_with(0xfe, self.attribute),
            }
        }
        Ok(())
    }
}

impl ember_hal::Console for Writer {
    fn write_str(&mut self, s: &str) {
        let _ = <Self as fmt::Write>::write_str(self, s);
    }

    fn clear(&mut self) {
        self.clear_screen();
    }

    fn put_char(&mut self, byte: u8, color: u8) {
        self.write_byte_with(byte, color);
    }

    /// Paints `bytes` starting at cell `position` without moving the cursor.
    fn write_at(&mut self, bytes: &[u8], color: u8, position: usize) {
        for (cell, byte) in (position..BUFFER_WIDTH * BUFFER_HEIGHT).zip(bytes) {
            self.put(cell / BUFFER_WIDTH, cell % BUFFER_WIDTH, *byte, color);
        }
    }
}

/// Prints to the VGA buffer without a newline.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::arch::x86::vga::_print(format_args!($($arg)*))
    };
}

/// Prints to the VGA buffer with a newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)))
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    super::without_interrupts(|| {
        // `Writer` never fails. The panic handler prints through here, so a
        // failing Display impl must not raise a second panic.
        let _ = WRITER.lock().write_fmt(args);
    });
}

/// Sets the color of the global writer.
pub fn set_color(foreground: Color, background: Color) {
    super::without_interrupts(|| WRITER.lock().set_color(foreground, background));
}

/// Clears the screen through the global writer.
pub fn clear_screen() {
    super::without_interrupts(|| WRITER.lock().clear_screen());
}
