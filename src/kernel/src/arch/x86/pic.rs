//! The chained 8259 interrupt controllers and the 8253/8254 interval timer.

use super::port::{io_wait, outb};
use crate::config::TIMER_FREQUENCY_HZ;
use core::sync::atomic::{AtomicU64, Ordering};
use ember_hal::{InterruptController, Timer};
use spin::Mutex;

/// IRQs 0..7 are mapped to interrupts 32..39.
pub const PIC_1_OFFSET: u8 = 32;
/// IRQs 8..15 are mapped to interrupts 40..47.
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

const PIC_1_COMMAND: u16 = 0x20;
const PIC_1_DATA: u16 = 0x21;
const PIC_2_COMMAND: u16 = 0xA0;
const PIC_2_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const END_OF_INTERRUPT: u8 = 0x20;

/// IRQ lines the kernel handles.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
    Keyboard,
}

impl InterruptIndex {
    /// Vector number as a byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Vector number as it appears in a trap frame.
    pub fn as_u32(self) -> u32 {
        u32::from(self as u8)
    }
}

/// Both controllers behind one interface.
pub struct ChainedPics {
    masks: [u8; 2],
}

impl ChainedPics {
    const fn new() -> Self {
        // Timer and keyboard on the master, cascade line open.
        Self {
            masks: [!0b0000_0111, 0xFF],
        }
    }

    /// Remaps both controllers to [`PIC_1_OFFSET`] and [`PIC_2_OFFSET`].
    pub fn initialize(&mut self) {
        // SAFETY: the 8259 ports belong to this driver.
        unsafe {
            outb(PIC_1_COMMAND, ICW1_INIT);
            io_wait();
            outb(PIC_2_COMMAND, ICW1_INIT);
            io_wait();
            outb(PIC_1_DATA, PIC_1_OFFSET);
            io_wait();
            outb(PIC_2_DATA, PIC_2_OFFSET);
            io_wait();
            outb(PIC_1_DATA, 4);
            io_wait();
            outb(PIC_2_DATA, 2);
            io_wait();
            outb(PIC_1_DATA, ICW4_8086);
            io_wait();
            outb(PIC_2_DATA, ICW4_8086);
            io_wait();
        }
        self.enable();
    }
}

impl InterruptController for ChainedPics {
    fn enable(&mut self) {
        // SAFETY: see `initialize`.
        unsafe {
            outb(PIC_1_DATA, self.masks[0]);
            outb(PIC_2_DATA, self.masks[1]);
        }
    }

    fn disable(&mut self) {
        // SAFETY: see `initialize`.
        unsafe {
            outb(PIC_1_DATA, 0xFF);
            outb(PIC_2_DATA, 0xFF);
        }
    }

    /// `irq` is the interrupt vector, not the line number.
    fn end_of_interrupt(&mut self, irq: u8) {
        // SAFETY: see `initialize`.
        unsafe {
            if irq >= PIC_2_OFFSET {
                outb(PIC_2_COMMAND, END_OF_INTERRUPT);
            }
            outb(PIC_1_COMMAND, END_OF_INTERRUPT);
        }
    }
}

/// The master/slave 8259 pair.
pub static PICS: Mutex<ChainedPics> = Mutex::new(ChainedPics::new());

const PIT_CHANNEL_0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
const PIT_BASE_HZ: u32 = 1_193_182;
/// Channel 0, low/high byte, square wave.
const PIT_MODE_3: u8 = 0x36;

/// Counts timer interrupts since boot.
pub struct Pit {
    ticks: AtomicU64,
}

impl Pit {
    const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// Starts channel 0 at [`TIMER_FREQUENCY_HZ`].
    pub fn start(&self) {
        let divisor = (PIT_BASE_HZ / TIMER_FREQUENCY_HZ) as u16;
        // SAFETY: the PIT ports belong to this driver.
        unsafe {
            outb(PIT_COMMAND, PIT_MODE_3);
            outb(PIT_CHANNEL_0, (divisor & 0xFF) as u8);
            outb(PIT_CHANNEL_0, (divisor >> 8) as u8);
        }
        log::debug!("timer at {} Hz (divisor {})", TIMER_FREQUENCY_HZ, divisor);
    }

    /// Counts one timer interrupt.
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

impl Timer for Pit {
    fn current_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Channel 0 of the interval timer.
pub static PIT: Pit = Pit::new();
