//! Compile-time kernel configuration.
//!
//! Storage geometry lives in [`ember_common::fs`] because it is part of the
//! on-disk format.

use log::LevelFilter;

/// Paging granularity: one 4 MiB page-size-extension page per directory entry.
pub const PAGE_SIZE: u32 = 4 * 1024 * 1024;
/// Entries in a page directory.
pub const PAGE_DIRECTORY_ENTRIES: usize = 1024;

/// Physical memory managed by the frame allocator.
pub const PHYSICAL_MEMORY_SIZE: u64 = 128 * 1024 * 1024;
/// Number of physical frames.
pub const FRAME_COUNT: usize = (PHYSICAL_MEMORY_SIZE / PAGE_SIZE as u64) as usize;
/// Frame holding the kernel image, used from boot.
pub const KERNEL_FRAME: usize = 0;

/// Start of the kernel's higher-half mapping.
pub const KERNEL_VIRTUAL_BASE: u32 = 0xC000_0000;
/// Directory index of [`KERNEL_VIRTUAL_BASE`].
pub const KERNEL_PAGE_INDEX: usize = (KERNEL_VIRTUAL_BASE / PAGE_SIZE) as usize;
/// Directory entries reserved for the kernel, starting at [`KERNEL_PAGE_INDEX`].
pub const KERNEL_RESERVED_PAGES: usize = 4;

/// Process control block slots.
pub const PROCESS_COUNT_MAX: usize = 16;
/// User address spaces alive at once (the kernel's own is extra).
pub const ADDRESS_SPACE_COUNT_MAX: usize = 16;
/// Pages a single process may own, stack included.
pub const PROCESS_PAGE_COUNT_MAX: usize = 8;
/// Bytes kept from a process name.
pub const PROCESS_NAME_MAX: usize = 32;
/// Ring-0 stack per process slot.
pub const KERNEL_STACK_SIZE: usize = 16 * 1024;

/// Kernel code segment selector.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
/// Kernel data segment selector.
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
/// User code segment selector with RPL 3.
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;
/// User data segment selector with RPL 3.
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;
/// Task state segment selector.
pub const TSS_SELECTOR: u16 = 0x28;

/// Timer interrupt rate.
pub const TIMER_FREQUENCY_HZ: u32 = 1000;
/// Hours added to the CMOS clock before it is reported.
pub const RTC_HOUR_OFFSET: i8 = 7;

/// Program started once the kernel is up.
pub const INITIAL_PROCESS: &str = "shell";
/// Buffer reserved for the initial program image.
pub const INITIAL_PROCESS_CAPACITY: u32 = 64 * 1024;
/// Clusters backing the fallback RAM disk when no ATA drive answers.
pub const RAM_DISK_CLUSTERS: usize = 128;

/// Runtime log filter installed with the serial logger.
pub const LOG_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_constants() {
        assert_eq!(FRAME_COUNT, 32);
        assert_eq!(KERNEL_PAGE_INDEX, 0x300);
        assert!(KERNEL_PAGE_INDEX + KERNEL_RESERVED_PAGES <= PAGE_DIRECTORY_ENTRIES);
    }
}
