//! i686 support: multiboot entry, descriptor tables, interrupt plumbing and
//! the device drivers behind the `ember_hal` traits.
//!
//! The kernel core lives in [`KERNEL`]. Interrupt handlers run through
//! interrupt gates, so they already execute with interrupts off; code
//! outside a handler must take the lock inside [`without_interrupts`].

pub mod ata;
pub mod boot;
pub mod cmos;
pub mod gdt;
pub mod interrupts;
pub mod mmu;
pub mod pic;
pub mod port;
pub mod serial;
pub mod switch;
pub mod vga;

use crate::config::{KERNEL_STACK_SIZE, PROCESS_COUNT_MAX, RAM_DISK_CLUSTERS};
use crate::drivers::{CachedClock, KeyboardBuffer};
use crate::fs::RamDisk;
use crate::kernel::Kernel;
use crate::process::KernelStacks;
use core::arch::asm;
use core::sync::atomic::{AtomicBool, Ordering};
use ember_common::fs::CLUSTER_SIZE;
use ember_hal::{BlockDevice, DeviceError};
use spin::Mutex;

pub use ata::AtaDrive;
pub use mmu::X86Mmu;
pub use serial::SERIAL;
pub use vga::{Color, Writer, WRITER};

/// Storage the filesystem runs on.
pub enum BootDisk {
    /// Nothing attached yet.
    Detached,
    /// Primary master ATA drive.
    Ata(AtaDrive),
    /// Volatile fallback in kernel memory.
    Ram(RamDisk<'static>),
}

impl BlockDevice for BootDisk {
    fn block_count(&self) -> u32 {
        match self {
            BootDisk::Detached => 0,
            BootDisk::Ata(drive) => drive.block_count(),
            BootDisk::Ram(disk) => disk.block_count(),
        }
    }

    fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        match self {
            BootDisk::Detached => Err(DeviceError::Io),
            BootDisk::Ata(drive) => drive.read_blocks(lba, buf),
            BootDisk::Ram(disk) => disk.read_blocks(lba, buf),
        }
    }

    fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<(), DeviceError> {
        match self {
            BootDisk::Detached => Err(DeviceError::Io),
            BootDisk::Ata(drive) => drive.write_blocks(lba, buf),
            BootDisk::Ram(disk) => disk.write_blocks(lba, buf),
        }
    }
}

/// The kernel core.
pub static KERNEL: Mutex<Kernel<BootDisk, X86Mmu>> =
    Mutex::new(Kernel::new(BootDisk::Detached, X86Mmu));

/// Keystrokes waiting for a user program.
pub static KEYBOARD: Mutex<KeyboardBuffer> = Mutex::new(KeyboardBuffer::new());

/// Wall-clock time, refreshed from the CMOS on every tick.
pub static CLOCK: Mutex<CachedClock> = Mutex::new(CachedClock::new());

#[repr(C, align(16))]
struct KernelStackArea([u8; PROCESS_COUNT_MAX * KERNEL_STACK_SIZE]);

static mut KERNEL_STACK_AREA: KernelStackArea =
    KernelStackArea([0; PROCESS_COUNT_MAX * KERNEL_STACK_SIZE]);

#[repr(C, align(512))]
struct RamDiskArea([u8; RAM_DISK_CLUSTERS * CLUSTER_SIZE]);

static mut RAM_DISK_AREA: RamDiskArea = RamDiskArea([0; RAM_DISK_CLUSTERS * CLUSTER_SIZE]);
static RAM_DISK_TAKEN: AtomicBool = AtomicBool::new(false);

/// Ring-0 stacks, one per process slot.
pub fn kernel_stacks() -> KernelStacks {
    let base = core::ptr::addr_of!(KERNEL_STACK_AREA) as u32;
    KernelStacks::new(base, KERNEL_STACK_SIZE as u32)
}

/// Hands out the RAM disk backing store. Returns `None` after the first call.
pub fn take_ram_disk() -> Option<RamDisk<'static>> {
    if RAM_DISK_TAKEN.swap(true, Ordering::AcqRel) {
        return None;
    }
    // SAFETY: the flag above guarantees this is the only reference ever made.
    let storage = unsafe { &mut (*core::ptr::addr_of_mut!(RAM_DISK_AREA)).0 };
    Some(RamDisk::new(storage))
}

/// Disables hardware interrupts.
#[inline]
pub fn cli() {
    // SAFETY: masking interrupts has no memory effects.
    unsafe { asm!("cli", options(nomem, nostack)) };
}

/// Enables hardware interrupts.
#[inline]
pub fn sti() {
    // SAFETY: the IDT is loaded before anything calls this.
    unsafe { asm!("sti", options(nomem, nostack)) };
}

fn interrupts_enabled() -> bool {
    let flags: u32;
    // SAFETY: reads EFLAGS through the stack.
    unsafe { asm!("pushfd", "pop {}", out(reg) flags, options(nomem, preserves_flags)) };
    flags & (1 << 9) != 0
}

/// Runs `f` with interrupts disabled, restoring the previous state after.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let enabled = interrupts_enabled();
    if enabled {
        cli();
    }
    let result = f();
    if enabled {
        sti();
    }
    result
}

/// Halts the CPU until the next interrupt.
#[inline]
pub fn hlt() {
    // SAFETY: hlt only waits for an interrupt.
    unsafe { asm!("hlt", options(nomem, nostack)) };
}

/// Idles forever with interrupts enabled.
pub fn halt_loop() -> ! {
    loop {
        sti();
        hlt();
    }
}
