//! Saved CPU state of a process.
//!
//! [`TrapFrame`] is the exact layout the interrupt entry stubs leave on the
//! kernel stack; [`Context`] is what a process control block keeps between
//! time slices.

use crate::config::{USER_CODE_SELECTOR, USER_DATA_SELECTOR};
use crate::memory::SpaceId;

bitflags::bitflags! {
    /// The `eflags` register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EFlags: u32 {
        const CARRY = 1 << 0;
        /// Always set on x86.
        const RESERVED = 1 << 1;
        const PARITY = 1 << 2;
        const ZERO = 1 << 6;
        const SIGN = 1 << 7;
        const TRAP = 1 << 8;
        const INTERRUPT = 1 << 9;
        const DIRECTION = 1 << 10;
        const OVERFLOW = 1 << 11;
    }
}

impl EFlags {
    /// Flags a new process starts with: interrupts enabled.
    pub const USER_DEFAULT: EFlags = EFlags::RESERVED.union(EFlags::INTERRUPT);
}

/// General-purpose registers in `pushad` order (lowest address first).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct GeneralRegisters {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// Value of `esp` at `pushad`; ignored by `popad`.
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

/// Data segment registers in the order the entry stub pushes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SegmentRegisters {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
}

impl SegmentRegisters {
    /// Every data segment set to the ring-3 selector.
    pub const USER: SegmentRegisters = SegmentRegisters {
        gs: USER_DATA_SELECTOR as u32,
        fs: USER_DATA_SELECTOR as u32,
        es: USER_DATA_SELECTOR as u32,
        ds: USER_DATA_SELECTOR as u32,
    };
}

/// Stack image of an interrupted context.
///
/// `user_esp` and `user_ss` are only meaningful when the interrupt came from
/// ring 3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    pub segments: SegmentRegisters,
    pub registers: GeneralRegisters,
    pub vector: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub user_esp: u32,
    pub user_ss: u32,
}

impl TrapFrame {
    /// Whether the interrupted code ran in ring 3.
    pub fn from_user(&self) -> bool {
        self.cs & 3 == 3
    }
}

/// Execution state kept in a process control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub registers: GeneralRegisters,
    pub segments: SegmentRegisters,
    pub eip: u32,
    pub cs: u32,
    pub eflags: EFlags,
    pub esp: u32,
    pub ss: u32,
    /// Address space the process runs in.
    pub space: SpaceId,
    /// Top of the ring-0 stack used while the process is interrupted.
    pub kernel_stack: u32,
}

impl Context {
    /// Fresh ring-3 context starting at `entry` with the stack at `stack_top`.
    pub fn new_user(entry: u32, stack_top: u32, space: SpaceId, kernel_stack: u32) -> Self {
        Self {
            registers: GeneralRegisters {
                esp: stack_top,
                ebp: stack_top,
                ..GeneralRegisters::default()
            },
            segments: SegmentRegisters::USER,
            eip: entry,
            cs: USER_CODE_SELECTOR as u32,
            eflags: EFlags::USER_DEFAULT,
            esp: stack_top,
            ss: USER_DATA_SELECTOR as u32,
            space,
            kernel_stack,
        }
    }

    /// Copies the interrupted state out of `frame`.
    pub fn capture(&mut self, frame: &TrapFrame) {
        self.registers = frame.registers;
        self.segments = frame.segments;
        self.eip = frame.eip;
        self.cs = frame.cs;
        self.eflags = EFlags::from_bits_retain(frame.eflags);
        self.esp = frame.user_esp;
        self.ss = frame.user_ss;
    }

    /// Frame that resumes this context through `iret`.
    pub fn to_trap_frame(&self) -> TrapFrame {
        TrapFrame {
            segments: self.segments,
            registers: self.registers,
            vector: 0,
            error_code: 0,
            eip: self.eip,
            cs: self.cs,
            eflags: self.eflags.union(EFlags::RESERVED).bits(),
            user_esp: self.esp,
            user_ss: self.ss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        assert_eq!(core::mem::size_of::<GeneralRegisters>(), 32);
        assert_eq!(core::mem::size_of::<TrapFrame>(), 19 * 4);
        assert_eq!(core::mem::offset_of!(TrapFrame, eip), 14 * 4);
    }

    #[test]
    fn test_new_user_context() {
        let ctx = Context::new_user(0, 0x007F_FFFC, SpaceId::KERNEL, 0xC020_0000);
        assert_eq!(ctx.eflags.bits(), 0x202);
        assert_eq!(ctx.cs & 3, 3);
        let frame = ctx.to_trap_frame();
        assert!(frame.from_user());
        assert_eq!(frame.user_esp, 0x007F_FFFC);
        assert_eq!(frame.segments.ds, USER_DATA_SELECTOR as u32);
    }

    #[test]
    fn test_capture_restores_identically() {
        let mut ctx = Context::new_user(0, 0x1000, SpaceId::KERNEL, 0);
        let frame = TrapFrame {
            segments: SegmentRegisters::USER,
            registers: GeneralRegisters {
                eax: 1,
                ebx: 2,
                ecx: 3,
                edx: 4,
                ..GeneralRegisters::default()
            },
            vector: 32,
            error_code: 0,
            eip: 0x1234,
            cs: USER_CODE_SELECTOR as u32,
            eflags: 0x246,
            user_esp: 0x0FF0,
            user_ss: USER_DATA_SELECTOR as u32,
        };
        ctx.capture(&frame);
        let back = ctx.to_trap_frame();
        assert_eq!(back.registers, frame.registers);
        assert_eq!((back.eip, back.eflags, back.user_esp), (0x1234, 0x246, 0x0FF0));
    }
}
