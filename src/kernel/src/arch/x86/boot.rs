//! Multiboot header, boot page directory and the jump to the higher half.
//!
//! `_ember_start` (the ELF entry, a physical address) turns on paging with
//! 4 MiB pages and calls `kernel_entry(magic, info)` on the boot stack.

core::arch::global_asm!(include_str!("boot.s"), options(att_syntax));

/// Value GRUB leaves in eax.
pub const MULTIBOOT_BOOTLOADER_MAGIC: u32 = 0x2BADB002;
