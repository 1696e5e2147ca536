//! System call numbers and register conventions.
//!
//! A program raises interrupt [`SYSCALL_VECTOR`] with the call number in
//! `eax` and up to three arguments in `ebx`, `ecx` and `edx`. Calls that
//! report a status take a pointer to an `i32` in the last argument; a null
//! pointer skips the write-back. The status is also returned in `eax`.

use crate::error::KernelError;

/// Interrupt vector of the system call gate.
pub const SYSCALL_VECTOR: u8 = 0x30;

/// Text console width in cells.
pub const SCREEN_COLUMNS: u32 = 80;
/// Text console height in cells.
pub const SCREEN_ROWS: u32 = 25;

/// System call numbers.
///
/// | No. | Call | `ebx` | `ecx` | `edx` |
/// |-----|------|-------|-------|-------|
/// | 0 | read file | request | status ptr | |
/// | 1 | read directory | request | status ptr | |
/// | 2 | write file | request | status ptr | |
/// | 3 | delete | request | status ptr | |
/// | 4 | get key | out byte ptr | | |
/// | 5 | put char | char ptr | color | |
/// | 6 | puts | buffer | count | color |
/// | 7 | keyboard on | | | |
/// | 8 | create process | request | status ptr | |
/// | 9 | destroy process | pid | status ptr | |
/// | 10 | exit | | | |
/// | 11 | puts at | NUL-terminated buffer | color | cell index |
/// | 12 | read clock | out time ptr | | |
/// | 13 | keyboard off | | | |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SyscallNumber {
    ReadFile = 0,
    ReadDirectory = 1,
    WriteFile = 2,
    Delete = 3,
    GetKey = 4,
    PutChar = 5,
    Puts = 6,
    KeyboardActivate = 7,
    CreateProcess = 8,
    DestroyProcess = 9,
    Exit = 10,
    PutsAt = 11,
    ReadClock = 12,
    KeyboardDeactivate = 13,
}

impl TryFrom<u32> for SyscallNumber {
    type Error = KernelError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => SyscallNumber::ReadFile,
            1 => SyscallNumber::ReadDirectory,
            2 => SyscallNumber::WriteFile,
            3 => SyscallNumber::Delete,
            4 => SyscallNumber::GetKey,
            5 => SyscallNumber::PutChar,
            6 => SyscallNumber::Puts,
            7 => SyscallNumber::KeyboardActivate,
            8 => SyscallNumber::CreateProcess,
            9 => SyscallNumber::DestroyProcess,
            10 => SyscallNumber::Exit,
            11 => SyscallNumber::PutsAt,
            12 => SyscallNumber::ReadClock,
            13 => SyscallNumber::KeyboardDeactivate,
            _ => return Err(KernelError::UnknownSyscall),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_round_trip() {
        for n in 0..=13u32 {
            let call = SyscallNumber::try_from(n).expect("known call");
            assert_eq!(call as u32, n);
        }
        assert_eq!(
            SyscallNumber::try_from(14),
            Err(KernelError::UnknownSyscall)
        );
    }
}
