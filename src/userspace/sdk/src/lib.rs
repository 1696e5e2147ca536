//! Ember user-program SDK.
//!
//! Thin wrappers over `int 0x30`. Requests are passed as the packed
//! [`DriverRequest`] record; the status comes back in `eax`, so the status
//! pointer argument is always null here.

#![cfg_attr(not(test), no_std)]

pub use ember_common::fs::{self, DriverRequest, FileName};
pub use ember_common::syscall::{SyscallNumber, SCREEN_COLUMNS, SCREEN_ROWS};
pub use ember_common::time::RtcTime;
pub use ember_common::{KernelError, KernelResult};

/// Longest string [`puts_at`] paints, one screen row.
pub const PUTS_AT_MAX: usize = SCREEN_COLUMNS as usize;

/// Turns a status code into a result.
pub fn check(status: i32) -> KernelResult<()> {
    match status {
        0 => Ok(()),
        code => Err(KernelError::from_status(code).unwrap_or(KernelError::UnknownSyscall)),
    }
}

/// Copies `text` into a NUL-terminated buffer, truncated to [`PUTS_AT_MAX`].
pub fn nul_terminated(text: &[u8]) -> [u8; PUTS_AT_MAX + 1] {
    let mut buf = [0u8; PUTS_AT_MAX + 1];
    let len = text
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(text.len())
        .min(PUTS_AT_MAX);
    buf[..len].copy_from_slice(&text[..len]);
    buf
}

#[cfg(target_arch = "x86")]
mod calls {
    use super::*;
    use core::arch::asm;

    #[inline(always)]
    fn syscall(number: SyscallNumber, ebx: u32, ecx: u32, edx: u32) -> i32 {
        let eax: u32;
        // SAFETY: the kernel validates every pointer argument against this
        // process's address space.
        unsafe {
            asm!(
                "int 0x30",
                inlateout("eax") number as u32 => eax,
                in("ebx") ebx,
                in("ecx") ecx,
                in("edx") edx,
            );
        }
        eax as i32
    }

    fn with_request(number: SyscallNumber, request: &DriverRequest) -> KernelResult<()> {
        let record = request.encode();
        check(syscall(number, record.as_ptr() as u32, 0, 0))
    }

    /// Reads a file into `request.buf`.
    pub fn read_file(request: &DriverRequest) -> KernelResult<()> {
        with_request(SyscallNumber::ReadFile, request)
    }

    /// Copies a directory table into `request.buf`.
    pub fn read_directory(request: &DriverRequest) -> KernelResult<()> {
        with_request(SyscallNumber::ReadDirectory, request)
    }

    /// Creates a file, or a directory when `request.buffer_size` is zero.
    pub fn write_file(request: &DriverRequest) -> KernelResult<()> {
        with_request(SyscallNumber::WriteFile, request)
    }

    /// Deletes a file or an empty directory.
    pub fn delete(request: &DriverRequest) -> KernelResult<()> {
        with_request(SyscallNumber::Delete, request)
    }

    /// Loads and starts a program; `request.buf` is its link address and
    /// `request.buffer_size` the room reserved for the image.
    pub fn create_process(request: &DriverRequest) -> KernelResult<()> {
        with_request(SyscallNumber::CreateProcess, request)
    }

    /// Terminates process `pid`.
    pub fn destroy_process(pid: u32) -> KernelResult<()> {
        check(syscall(SyscallNumber::DestroyProcess, pid, 0, 0))
    }

    /// Terminates the calling process.
    pub fn exit() -> ! {
        syscall(SyscallNumber::Exit, 0, 0, 0);
        loop {
            core::hint::spin_loop();
        }
    }

    /// Next buffered key, if any. Needs [`keyboard_activate`].
    pub fn get_key() -> Option<u8> {
        let mut key = 0u8;
        syscall(SyscallNumber::GetKey, &mut key as *mut u8 as u32, 0, 0);
        (key != 0).then_some(key)
    }

    /// Writes one character at the cursor.
    pub fn put_char(c: u8, color: u8) {
        syscall(SyscallNumber::PutChar, &c as *const u8 as u32, u32::from(color), 0);
    }

    /// Writes `text` at the cursor.
    pub fn puts(text: &[u8], color: u8) {
        syscall(SyscallNumber::Puts, text.as_ptr() as u32, text.len() as u32, u32::from(color));
    }

    /// Paints `text` at screen cell `cell` (row * columns + column).
    pub fn puts_at(text: &[u8], color: u8, cell: u32) {
        let buf = nul_terminated(text);
        syscall(SyscallNumber::PutsAt, buf.as_ptr() as u32, u32::from(color), cell);
    }

    /// Current wall-clock time.
    pub fn read_clock() -> RtcTime {
        let mut raw = [0u8; RtcTime::ENCODED_LEN];
        syscall(SyscallNumber::ReadClock, raw.as_mut_ptr() as u32, 0, 0);
        RtcTime::from_bytes(raw)
    }

    /// Starts keeping keystrokes for [`get_key`].
    pub fn keyboard_activate() {
        syscall(SyscallNumber::KeyboardActivate, 0, 0, 0);
    }

    /// Stops keeping keystrokes.
    pub fn keyboard_deactivate() {
        syscall(SyscallNumber::KeyboardDeactivate, 0, 0, 0);
    }
}

#[cfg(target_arch = "x86")]
pub use calls::*;
