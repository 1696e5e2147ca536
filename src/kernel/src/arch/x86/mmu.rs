//! The paging unit behind [`Mmu`], plus access to the caller's memory for
//! system calls.

use crate::config::KERNEL_VIRTUAL_BASE;
use crate::memory::{Mmu, PageDirectory};
use crate::syscall::UserMemory;
use core::arch::asm;
use ember_common::KernelResult;

/// Drives cr3 and the TLB.
///
/// Page directories live in kernel statics, so their physical address is
/// their virtual address minus [`KERNEL_VIRTUAL_BASE`].
pub struct X86Mmu;

impl Mmu for X86Mmu {
    fn load_directory(&mut self, directory: &PageDirectory) {
        let physical = directory as *const PageDirectory as u32 - KERNEL_VIRTUAL_BASE;
        // SAFETY: every directory maps the kernel at the same entry, so the
        // code and stack running this stay mapped across the load.
        unsafe { asm!("mov cr3, {}", in(reg) physical, options(nostack, preserves_flags)) };
    }

    fn invalidate_page(&mut self, address: u32) {
        // SAFETY: invlpg only drops a cached translation.
        unsafe { asm!("invlpg [{}]", in(reg) address, options(nostack, preserves_flags)) };
    }

    unsafe fn active_memory(&mut self, address: u32, len: usize) -> &mut [u8] {
        // SAFETY: the caller guarantees the range is mapped writable.
        unsafe { core::slice::from_raw_parts_mut(address as *mut u8, len) }
    }
}

/// Memory of the process that raised the system call, read through the
/// active directory.
pub struct ActiveUserMemory;

impl UserMemory for ActiveUserMemory {
    fn bytes(&mut self, address: u32, len: usize) -> KernelResult<&mut [u8]> {
        // SAFETY: the router checked the range against the caller's
        // directory, which is the active one while its syscall runs.
        Ok(unsafe { core::slice::from_raw_parts_mut(address as *mut u8, len) })
    }
}
