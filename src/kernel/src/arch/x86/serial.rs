//! Serial port driver for the 16550 UART on COM1.
//!
//! Carries the kernel log. Output is polled; nothing here uses interrupts.

use crate::config::LOG_LEVEL;
use core::fmt::{self, Write};
use ember_hal::Serial;
use spin::{Mutex, MutexGuard};
use uart_16550::SerialPort;

/// COM1 I/O port address.
const COM1_PORT: u16 = 0x3F8;

/// Global serial port instance, lazily initialized.
pub static SERIAL: spin::Once<Mutex<SerialPort>> = spin::Once::new();

/// Initializes the global serial port. Idempotent.
pub fn init() {
    get_serial();
}

fn get_serial() -> &'static Mutex<SerialPort> {
    SERIAL.call_once(|| {
        // SAFETY: COM1 is the standard first UART and only this module drives it.
        let mut serial = unsafe { SerialPort::new(COM1_PORT) };
        serial.init();
        Mutex::new(serial)
    })
}

/// Exclusive access to COM1 for the lifetime of the guard.
///
/// Line endings are written as CRLF.
pub struct SerialLine<'a>(MutexGuard<'a, SerialPort>);

impl SerialLine<'static> {
    /// Locks the global port.
    pub fn lock() -> Self {
        SerialLine(get_serial().lock())
    }
}

impl Serial for SerialLine<'_> {
    fn write_byte(&mut self, byte: u8) {
        self.0.send(byte);
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.0.try_receive().ok()
    }
}

impl fmt::Write for SerialLine<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

/// Prints to the serial port without a newline.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::arch::x86::serial::_print(format_args!($($arg)*))
    };
}

/// Prints to the serial port with a newline.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)))
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    super::without_interrupts(|| {
        // `SerialLine` never fails. The panic handler prints through here, so
        // a failing Display impl must not raise a second panic.
        let _ = SerialLine::lock().write_fmt(args);
    });
}

/// `log` sink writing `[LEVEL] target: message` lines to COM1.
pub struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            crate::serial_println!("[{:5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Installs [`SerialLogger`] as the global logger at [`LOG_LEVEL`].
pub fn init_logger() {
    init();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LOG_LEVEL);
    }
}
