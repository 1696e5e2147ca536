//! Interrupt descriptor table and the Rust side of the trap path.
//!
//! The stubs in `entry.s` build a [`TrapFrame`] on the kernel stack and call
//! [`ember_trap_dispatch`]. Whatever the frame holds when that returns is
//! what `iret` resumes, so a context switch is a rewrite of the frame.

use super::cmos::Cmos;
use super::gdt;
use super::mmu::ActiveUserMemory;
use super::pic::{InterruptIndex, PICS, PIT};
use super::port::inb;
use super::vga::WRITER;
use super::{halt_loop, CLOCK, KERNEL, KEYBOARD};
use crate::config::KERNEL_CODE_SELECTOR;
use crate::kernel::Tick;
use crate::process::{Context, TrapFrame};
use crate::syscall::{self, Devices, SyscallOutcome};
use core::arch::asm;
use ember_common::syscall::SYSCALL_VECTOR;
use ember_hal::InterruptController;
use lazy_static::lazy_static;

core::arch::global_asm!(include_str!("entry.s"), options(att_syntax));

extern "C" {
    static ember_isr_table: [u32; STUB_COUNT];
}

const STUB_COUNT: usize = SYSCALL_VECTOR as usize + 1;
const EXCEPTION_COUNT: u32 = 32;
const PAGE_FAULT: u32 = 14;
const KEYBOARD_DATA_PORT: u16 = 0x60;

/// Present, ring 0, 32-bit interrupt gate.
const GATE_KERNEL: u8 = 0x8E;
/// Present, ring 3 callable, 32-bit interrupt gate.
const GATE_USER: u8 = 0xEE;

#[derive(Clone, Copy)]
#[repr(C)]
struct Gate {
    offset_low: u16,
    selector: u16,
    zero: u8,
    attributes: u8,
    offset_high: u16,
}

impl Gate {
    const MISSING: Gate = Gate {
        offset_low: 0,
        selector: 0,
        zero: 0,
        attributes: 0,
        offset_high: 0,
    };

    fn new(handler: u32, attributes: u8) -> Self {
        Gate {
            offset_low: handler as u16,
            selector: KERNEL_CODE_SELECTOR,
            zero: 0,
            attributes,
            offset_high: (handler >> 16) as u16,
        }
    }
}

#[repr(C, align(8))]
struct Idt([Gate; 256]);

#[repr(C, packed)]
struct DescriptorPointer {
    limit: u16,
    base: u32,
}

lazy_static! {
    static ref IDT: Idt = {
        let mut idt = Idt([Gate::MISSING; 256]);
        // SAFETY: the table is defined in entry.s with STUB_COUNT entries.
        let stubs = unsafe { &ember_isr_table };
        for (vector, handler) in stubs.iter().enumerate() {
            let attributes = if vector == SYSCALL_VECTOR as usize {
                GATE_USER
            } else {
                GATE_KERNEL
            };
            idt.0[vector] = Gate::new(*handler, attributes);
        }
        idt
    };
}

/// Loads the IDT and remaps the PICs. Interrupts stay disabled.
pub fn init_idt() {
    let pointer = DescriptorPointer {
        limit: (core::mem::size_of::<Idt>() - 1) as u16,
        base: &*IDT as *const Idt as u32,
    };
    // SAFETY: the table is static and every gate points at a stub in entry.s.
    unsafe { asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags)) };
    PICS.lock().initialize();
}

/// Called by `ember_isr_common` with interrupts disabled.
#[no_mangle]
extern "C" fn ember_trap_dispatch(frame: &mut TrapFrame) {
    match frame.vector {
        v if v < EXCEPTION_COUNT => exception(frame),
        v if v == InterruptIndex::Timer.as_u32() => timer(frame),
        v if v == InterruptIndex::Keyboard.as_u32() => keyboard(),
        v if v == u32::from(SYSCALL_VECTOR) => syscall(frame),
        v => {
            log::trace!("spurious interrupt {}", v);
            PICS.lock().end_of_interrupt(v as u8);
        }
    }
}

fn timer(frame: &mut TrapFrame) {
    PIT.tick();
    Cmos::refresh(&mut CLOCK.lock());
    PICS.lock().end_of_interrupt(InterruptIndex::Timer.as_u8());

    let tick = KERNEL.lock().on_timer_tick(frame);
    if let Tick::Resume(context) = tick {
        resume(frame, &context);
    }
}

fn keyboard() {
    // SAFETY: reading the controller's data port acknowledges the byte.
    let scancode = unsafe { inb(KEYBOARD_DATA_PORT) };
    KEYBOARD.lock().push_scancode(scancode);
    PICS.lock().end_of_interrupt(InterruptIndex::Keyboard.as_u8());
}

fn syscall(frame: &mut TrapFrame) {
    let outcome = {
        let mut kernel = KERNEL.lock();
        let mut console = WRITER.lock();
        let mut clock = CLOCK.lock();
        let mut keyboard = KEYBOARD.lock();
        let mut devices = Devices {
            console: &mut *console,
            rtc: &mut *clock,
            keyboard: &mut *keyboard,
        };
        syscall::handle(&mut *kernel, &mut devices, &mut ActiveUserMemory, &frame.registers)
    };
    match outcome {
        SyscallOutcome::Continue(status) => frame.registers.eax = status as u32,
        SyscallOutcome::Reschedule => reschedule(frame),
    }
}

/// Faults in user mode kill the process; faults in the kernel are fatal.
fn exception(frame: &mut TrapFrame) {
    let address = if frame.vector == PAGE_FAULT {
        let cr2: u32;
        // SAFETY: reading cr2 has no side effects.
        unsafe { asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags)) };
        cr2
    } else {
        0
    };
    if !frame.from_user() {
        panic!(
            "exception {} in kernel: error {:#x}, eip {:#010x}, address {:#010x}",
            frame.vector, frame.error_code, frame.eip, address
        );
    }
    match KERNEL.lock().exit_current() {
        Ok(pid) => log::error!(
            "process {} killed by exception {} (error {:#x}, eip {:#010x}, address {:#010x})",
            pid,
            frame.vector,
            frame.error_code,
            frame.eip,
            address
        ),
        Err(e) => log::error!("exception {} with no process to blame: {}", frame.vector, e),
    }
    reschedule(frame);
}

/// The interrupted process is gone; resume another or idle.
fn reschedule(frame: &mut TrapFrame) {
    let next = KERNEL.lock().dispatch_next();
    match next {
        Some(context) => resume(frame, &context),
        None => {
            log::info!("no runnable process left");
            halt_loop();
        }
    }
}

/// Makes the pending `iret` land in `context`.
fn resume(frame: &mut TrapFrame, context: &Context) {
    *frame = context.to_trap_frame();
    gdt::set_kernel_stack(context.kernel_stack);
}
