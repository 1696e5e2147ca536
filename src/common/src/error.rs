//! System-wide error types for Ember.

use core::fmt;

/// Status code written back to user space when an operation succeeds.
pub const STATUS_SUCCESS: i32 = 0;

/// Every recoverable failure the kernel reports.
///
/// Each variant maps to a stable positive status code (see [`KernelError::status`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KernelError {
    /// No entry or process with the requested identity exists.
    NotFound,
    /// A live entry with the same name and extension exists.
    AlreadyExists,
    /// The target is not a directory table.
    NotADirectory,
    /// The target is a directory where a file was expected.
    IsADirectory,
    /// The directory still has occupied entries.
    DirectoryNotEmpty,
    /// No free entry slot remains in the directory table.
    DirectoryFull,
    /// The destination buffer cannot hold the stored data.
    BufferTooSmall,
    /// Not enough free clusters.
    OutOfSpace,
    /// Not enough free physical frames.
    OutOfMemory,
    /// Every address-space slot is in use.
    AddressSpacePoolExhausted,
    /// Every process slot is in use.
    ProcessTableFull,
    /// The image needs more pages than a process may own.
    TooLarge,
    /// The load address or image range reaches the kernel region.
    EntryPointInKernelSpace,
    /// The page has no mapping, or the frame is not in use.
    NotMapped,
    /// A cluster chain is cyclic, truncated, or points at a reserved cluster.
    CorruptFilesystem,
    /// The block device rejected a transfer.
    DeviceError,
    /// A user pointer is outside mapped user memory.
    InvalidAddress,
    /// The system call number is not recognised.
    UnknownSyscall,
}

/// Result alias used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    const ALL: [KernelError; 18] = [
        KernelError::NotFound,
        KernelError::AlreadyExists,
        KernelError::NotADirectory,
        KernelError::IsADirectory,
        KernelError::DirectoryNotEmpty,
        KernelError::DirectoryFull,
        KernelError::BufferTooSmall,
        KernelError::OutOfSpace,
        KernelError::OutOfMemory,
        KernelError::AddressSpacePoolExhausted,
        KernelError::ProcessTableFull,
        KernelError::TooLarge,
        KernelError::EntryPointInKernelSpace,
        KernelError::NotMapped,
        KernelError::CorruptFilesystem,
        KernelError::DeviceError,
        KernelError::InvalidAddress,
        KernelError::UnknownSyscall,
    ];

    /// Numeric status handed to user space. Never [`STATUS_SUCCESS`].
    pub const fn status(self) -> i32 {
        match self {
            KernelError::NotFound => 1,
            KernelError::AlreadyExists => 2,
            KernelError::NotADirectory => 3,
            KernelError::IsADirectory => 4,
            KernelError::DirectoryNotEmpty => 5,
            KernelError::DirectoryFull => 6,
            KernelError::BufferTooSmall => 7,
            KernelError::OutOfSpace => 8,
            KernelError::OutOfMemory => 9,
            KernelError::AddressSpacePoolExhausted => 10,
            KernelError::ProcessTableFull => 11,
            KernelError::TooLarge => 12,
            KernelError::EntryPointInKernelSpace => 13,
            KernelError::NotMapped => 14,
            KernelError::CorruptFilesystem => 15,
            KernelError::DeviceError => 16,
            KernelError::InvalidAddress => 17,
            KernelError::UnknownSyscall => 18,
        }
    }

    /// Inverse of [`KernelError::status`]. Returns `None` for success or unknown codes.
    pub fn from_status(status: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.status() == status)
    }
}

/// Collapses a result into the status code user space sees.
pub fn status_of<T>(result: &KernelResult<T>) -> i32 {
    match result {
        Ok(_) => STATUS_SUCCESS,
        Err(e) => e.status(),
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NotFound => write!(f, "not found"),
            KernelError::AlreadyExists => write!(f, "already exists"),
            KernelError::NotADirectory => write!(f, "not a directory"),
            KernelError::IsADirectory => write!(f, "is a directory"),
            KernelError::DirectoryNotEmpty => write!(f, "directory not empty"),
            KernelError::DirectoryFull => write!(f, "directory full"),
            KernelError::BufferTooSmall => write!(f, "buffer too small"),
            KernelError::OutOfSpace => write!(f, "no free clusters"),
            KernelError::OutOfMemory => write!(f, "no free frames"),
            KernelError::AddressSpacePoolExhausted => write!(f, "address space pool exhausted"),
            KernelError::ProcessTableFull => write!(f, "process table full"),
            KernelError::TooLarge => write!(f, "image exceeds the page budget"),
            KernelError::EntryPointInKernelSpace => write!(f, "entry point in kernel space"),
            KernelError::NotMapped => write!(f, "not mapped"),
            KernelError::CorruptFilesystem => write!(f, "corrupt filesystem"),
            KernelError::DeviceError => write!(f, "block device error"),
            KernelError::InvalidAddress => write!(f, "invalid user address"),
            KernelError::UnknownSyscall => write!(f, "unknown system call"),
        }
    }
}

impl core::error::Error for KernelError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct_and_nonzero() {
        for (i, a) in KernelError::ALL.iter().enumerate() {
            assert_ne!(a.status(), STATUS_SUCCESS);
            for b in &KernelError::ALL[i + 1..] {
                assert_ne!(a.status(), b.status());
            }
        }
    }

    #[test]
    fn test_from_status_inverts_status() {
        for e in KernelError::ALL {
            assert_eq!(KernelError::from_status(e.status()), Some(e));
        }
        assert_eq!(KernelError::from_status(STATUS_SUCCESS), None);
        assert_eq!(KernelError::from_status(-1), None);
    }

    #[test]
    fn test_status_of() {
        let ok: KernelResult<u32> = Ok(7);
        let err: KernelResult<u32> = Err(KernelError::DirectoryFull);
        assert_eq!(status_of(&ok), STATUS_SUCCESS);
        assert_eq!(status_of(&err), KernelError::DirectoryFull.status());
    }
}
