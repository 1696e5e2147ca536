//! Port-mapped I/O.

use core::arch::asm;

/// Reads a byte from `port`.
///
/// # Safety
///
/// Port reads can have device side effects; the caller must own the device.
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    let value: u8;
    // SAFETY: upheld by the caller.
    unsafe {
        asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
    }
    value
}

/// Writes a byte to `port`.
///
/// # Safety
///
/// See [`inb`].
#[inline]
pub unsafe fn outb(port: u16, value: u8) {
    // SAFETY: upheld by the caller.
    unsafe {
        asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
    }
}

/// Reads a word from `port`.
///
/// # Safety
///
/// See [`inb`].
#[inline]
pub unsafe fn inw(port: u16) -> u16 {
    let value: u16;
    // SAFETY: upheld by the caller.
    unsafe {
        asm!("in ax, dx", out("ax") value, in("dx") port, options(nomem, nostack, preserves_flags));
    }
    value
}

/// Writes a word to `port`.
///
/// # Safety
///
/// See [`inb`].
#[inline]
pub unsafe fn outw(port: u16, value: u16) {
    // SAFETY: upheld by the caller.
    unsafe {
        asm!("out dx, ax", in("dx") port, in("ax") value, options(nomem, nostack, preserves_flags));
    }
}

/// Gives slow devices (the PIC) time to settle between writes.
#[inline]
pub fn io_wait() {
    // SAFETY: port 0x80 is the POST diagnostic port; writes are ignored.
    unsafe { outb(0x80, 0) };
}
