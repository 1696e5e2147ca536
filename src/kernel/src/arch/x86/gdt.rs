//! Global descriptor table and the task state segment.
//!
//! Flat 4 GiB segments for ring 0 and ring 3. The TSS is only used for its
//! `esp0`, the stack the CPU switches to when an interrupt arrives from
//! user mode.

use crate::config::{
    KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR, TSS_SELECTOR, USER_CODE_SELECTOR,
    USER_DATA_SELECTOR,
};
use core::arch::asm;
use core::ptr::{addr_of, addr_of_mut};
use lazy_static::lazy_static;

#[repr(C)]
struct TaskStateSegment {
    link: u32,
    esp0: u32,
    ss0: u32,
    unused: [u32; 22],
    trap: u16,
    iomap_base: u16,
}

static mut TSS: TaskStateSegment = TaskStateSegment {
    link: 0,
    esp0: 0,
    ss0: KERNEL_DATA_SELECTOR as u32,
    unused: [0; 22],
    trap: 0,
    iomap_base: core::mem::size_of::<TaskStateSegment>() as u16,
};

const fn descriptor(base: u32, limit: u32, access: u8, flags: u8) -> u64 {
    let mut d = (limit & 0xFFFF) as u64;
    d |= ((base & 0xFF_FFFF) as u64) << 16;
    d |= (access as u64) << 40;
    d |= (((limit >> 16) & 0xF) as u64) << 48;
    d |= ((flags & 0xF) as u64) << 52;
    d |= ((base >> 24) as u64) << 56;
    d
}

const FLAT: u32 = 0xF_FFFF;
/// 4 KiB granularity, 32-bit.
const FLAGS_32: u8 = 0xC;

const ACCESS_KERNEL_CODE: u8 = 0x9A;
const ACCESS_KERNEL_DATA: u8 = 0x92;
const ACCESS_USER_CODE: u8 = 0xFA;
const ACCESS_USER_DATA: u8 = 0xF2;
const ACCESS_TSS: u8 = 0x89;

const ENTRY_COUNT: usize = 6;

#[repr(C, align(8))]
struct Gdt([u64; ENTRY_COUNT]);

#[repr(C, packed)]
struct DescriptorPointer {
    limit: u16,
    base: u32,
}

lazy_static! {
    static ref GDT: Gdt = {
        let tss = addr_of!(TSS) as u32;
        let mut entries = [0u64; ENTRY_COUNT];
        entries[(KERNEL_CODE_SELECTOR >> 3) as usize] = descriptor(0, FLAT, ACCESS_KERNEL_CODE, FLAGS_32);
        entries[(KERNEL_DATA_SELECTOR >> 3) as usize] = descriptor(0, FLAT, ACCESS_KERNEL_DATA, FLAGS_32);
        entries[(USER_CODE_SELECTOR >> 3) as usize] = descriptor(0, FLAT, ACCESS_USER_CODE, FLAGS_32);
        entries[(USER_DATA_SELECTOR >> 3) as usize] = descriptor(0, FLAT, ACCESS_USER_DATA, FLAGS_32);
        entries[(TSS_SELECTOR >> 3) as usize] = descriptor(
            tss,
            core::mem::size_of::<TaskStateSegment>() as u32 - 1,
            ACCESS_TSS,
            0,
        );
        Gdt(entries)
    };
}

/// Loads the GDT, reloads every segment register and the task register.
pub fn init() {
    let pointer = DescriptorPointer {
        limit: (core::mem::size_of::<Gdt>() - 1) as u16,
        base: &*GDT as *const Gdt as u32,
    };
    // SAFETY: the table is static and its selectors match the constants the
    // rest of the kernel uses. The far return reloads cs.
    unsafe {
        asm!(
            "lgdt [{pointer}]",
            "mov ds, {data:x}",
            "mov es, {data:x}",
            "mov fs, {data:x}",
            "mov gs, {data:x}",
            "mov ss, {data:x}",
            "push {code}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            "ltr {tss:x}",
            pointer = in(reg) &pointer,
            data = in(reg) KERNEL_DATA_SELECTOR as u32,
            code = in(reg) KERNEL_CODE_SELECTOR as u32,
            tss = in(reg) TSS_SELECTOR as u32,
            tmp = out(reg) _,
        );
    }
}

/// Sets the stack the CPU loads on the next ring 3 to ring 0 transition.
pub fn set_kernel_stack(esp0: u32) {
    // SAFETY: a single aligned word store; the CPU only reads the field on
    // privilege transitions, which cannot race a ring-0 store on one core.
    unsafe { addr_of_mut!(TSS.esp0).write_volatile(esp0) };
}

