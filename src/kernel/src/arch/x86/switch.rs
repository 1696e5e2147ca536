//! First entry into user mode.

use super::gdt;
use crate::process::{Context, TrapFrame};
use core::arch::asm;

/// Starts `context` on its own kernel stack.
///
/// The frame is popped by `ember_trap_return`, the tail of the common
/// interrupt stub.
///
/// Only used at boot; later switches rewrite the interrupt frame in place.
pub fn enter_user(context: &Context) -> ! {
    gdt::set_kernel_stack(context.kernel_stack);
    let frame = (context.kernel_stack as usize - core::mem::size_of::<TrapFrame>()) as *mut TrapFrame;
    // SAFETY: the slot's kernel stack is idle until this process traps, and
    // the frame is written just below its top. The address space in the
    // context is already active.
    unsafe {
        frame.write(context.to_trap_frame());
        asm!(
            "mov esp, {frame}",
            "jmp ember_trap_return",
            frame = in(reg) frame,
            options(noreturn),
        );
    }
}
