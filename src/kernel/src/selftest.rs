//! Boot-time smoke checks against the live hardware.

use crate::arch::x86::{BootDisk, X86Mmu};
use crate::config::{FRAME_COUNT, KERNEL_FRAME, KERNEL_VIRTUAL_BASE};
use crate::kernel::Kernel;
use crate::memory::{Frame, Page, SpaceId};
use crate::serial_println;
use ember_common::fs::{FileName, ROOT_CLUSTER};
use ember_common::KernelResult;

/// Runs all checks; the first failure is returned.
pub fn run_all(kernel: &mut Kernel<BootDisk, X86Mmu>) -> KernelResult<()> {
    serial_println!("Running kernel self tests...");

    test_frame_accounting(kernel);
    test_kernel_mapping(kernel)?;
    test_file_round_trip(kernel)?;

    serial_println!("All kernel self tests passed!");
    Ok(())
}

fn test_frame_accounting(kernel: &Kernel<BootDisk, X86Mmu>) {
    serial_println!("test_frame_accounting... ");
    let frames = kernel.memory().frames();
    assert_eq!(frames.free_count() + frames.used_count(), FRAME_COUNT);
    assert!(Frame::from_index(KERNEL_FRAME).is_some_and(|f| frames.is_used(f)));
    serial_println!("[ok]");
}

fn test_kernel_mapping(kernel: &Kernel<BootDisk, X86Mmu>) -> KernelResult<()> {
    serial_println!("test_kernel_mapping... ");
    let directory = kernel.memory().directory(SpaceId::KERNEL)?;
    assert!(directory.entry(Page::containing(KERNEL_VIRTUAL_BASE)).is_present());
    assert_eq!(kernel.memory().translate(SpaceId::KERNEL, KERNEL_VIRTUAL_BASE + 0xB8000), Some(0xB8000));
    serial_println!("[ok]");
    Ok(())
}

fn test_file_round_trip(kernel: &mut Kernel<BootDisk, X86Mmu>) -> KernelResult<()> {
    serial_println!("test_file_round_trip... ");
    let name = FileName::parse("selftest.tmp");
    let fs = kernel.fs();
    let free = fs.free_clusters();
    let payload = b"ember self test";
    fs.write(&name, ROOT_CLUSTER, payload)?;
    let mut back = [0u8; 32];
    let len = fs.read(&name, ROOT_CLUSTER, &mut back)?;
    assert_eq!(&back[..len], payload);
    fs.delete(&name, ROOT_CLUSTER)?;
    assert_eq!(fs.free_clusters(), free);
    serial_println!("[ok]");
    Ok(())
}
