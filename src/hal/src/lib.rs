//! Ember Hardware Abstraction Layer (HAL) traits.
//!
//! This crate defines traits that abstract away platform-specific hardware details.
//! The kernel core is written against these so it can run on the host under test.

#![no_std]

use ember_common::time::RtcTime;
use ember_common::KernelError;

/// Trait for a serial port or similar character-based communication channel.
pub trait Serial {
    /// Writes a single byte to the serial port.
    fn write_byte(&mut self, byte: u8);
    /// Reads a single byte from the serial port, if available.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Trait for a text-based console output.
///
/// Colors are raw VGA attribute bytes (background in the high nibble).
pub trait Console {
    /// Writes a string at the cursor in the default color.
    fn write_str(&mut self, s: &str);
    /// Clears the console screen.
    fn clear(&mut self);
    /// Writes one byte at the cursor.
    fn put_char(&mut self, byte: u8, color: u8);
    /// Writes bytes at the cursor.
    fn write_bytes(&mut self, bytes: &[u8], color: u8) {
        for &b in bytes {
            self.put_char(b, color);
        }
    }
    /// Paints bytes starting at cell `position` (row * width + column) without moving the cursor.
    fn write_at(&mut self, bytes: &[u8], color: u8, position: usize);
}

/// Trait for controlling interrupts.
pub trait InterruptController {
    /// Unmasks the interrupt lines the kernel handles.
    fn enable(&mut self);
    /// Masks every interrupt line.
    fn disable(&mut self);
    /// Acknowledges interrupt vector `irq`.
    fn end_of_interrupt(&mut self, irq: u8);
}

/// Trait for a system timer.
pub trait Timer {
    /// Returns the number of ticks since the system started.
    fn current_ticks(&self) -> u64;
}

/// Trait for a real-time clock.
pub trait Rtc {
    /// Current wall-clock time.
    fn now(&mut self) -> RtcTime;
}

/// Failure reported by a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The transfer reaches past the end of the device.
    OutOfRange,
    /// The buffer is not a whole number of blocks.
    Misaligned,
    /// The device reported an error or timed out.
    Io,
}

impl From<DeviceError> for KernelError {
    fn from(_: DeviceError) -> Self {
        KernelError::DeviceError
    }
}

/// Trait for storage addressed in 512-byte blocks.
pub trait BlockDevice {
    /// Size of the device in blocks.
    fn block_count(&self) -> u32;
    /// Fills `buf` (a multiple of the block size) starting at block `lba`.
    fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), DeviceError>;
    /// Stores `buf` (a multiple of the block size) starting at block `lba`.
    fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<(), DeviceError>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    fn block_count(&self) -> u32 {
        (**self).block_count()
    }

    fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        (**self).read_blocks(lba, buf)
    }

    fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<(), DeviceError> {
        (**self).write_blocks(lba, buf)
    }
}
