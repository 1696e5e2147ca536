//! CMOS real-time clock.

use super::port::{inb, outb};
use crate::config::RTC_HOUR_OFFSET;
use crate::drivers::rtc::{self, CachedClock, STATUS_B_24_HOUR, STATUS_B_BINARY};
use ember_common::time::RtcTime;
use ember_hal::Rtc;

const ADDRESS: u16 = 0x70;
const DATA: u16 = 0x71;
/// Keeps NMIs masked while a register is selected.
const NMI_DISABLE: u8 = 0x80;

const SECONDS: u8 = 0x00;
const MINUTES: u8 = 0x02;
const HOURS: u8 = 0x04;
const WEEKDAY: u8 = 0x06;
const DAY: u8 = 0x07;
const MONTH: u8 = 0x08;
const YEAR: u8 = 0x09;
const CENTURY: u8 = 0x32;
const STATUS_A: u8 = 0x0A;
const STATUS_B: u8 = 0x0B;

const UPDATE_IN_PROGRESS: u8 = 0x80;

/// The CMOS real-time clock.
pub struct Cmos;

impl Cmos {
    fn read(register: u8) -> u8 {
        // SAFETY: the CMOS index/data pair belongs to this driver and is
        // only touched with interrupts disabled.
        unsafe {
            outb(ADDRESS, NMI_DISABLE | register);
            inb(DATA)
        }
    }

    fn write(register: u8, value: u8) {
        // SAFETY: see `read`.
        unsafe {
            outb(ADDRESS, NMI_DISABLE | register);
            outb(DATA, value);
        }
    }

    /// Switches the chip to binary, 24-hour mode.
    pub fn init() {
        let status = Self::read(STATUS_B);
        Self::write(STATUS_B, status | STATUS_B_24_HOUR | STATUS_B_BINARY);
    }

    fn update_in_progress() -> bool {
        Self::read(STATUS_A) & UPDATE_IN_PROGRESS != 0
    }

    fn read_raw() -> RtcTime {
        RtcTime {
            second: Self::read(SECONDS),
            minute: Self::read(MINUTES),
            hour: Self::read(HOURS),
            weekday: Self::read(WEEKDAY),
            day: Self::read(DAY),
            month: Self::read(MONTH),
            year: Self::read(YEAR),
            century: Self::read(CENTURY),
        }
    }

    /// Reads the time unless the chip is mid-update.
    pub fn try_now() -> Option<RtcTime> {
        if Self::update_in_progress() {
            return None;
        }
        Some(rtc::decode(Self::read_raw(), Self::read(STATUS_B), RTC_HOUR_OFFSET))
    }

    /// Refreshes `clock`; a tick that lands mid-update keeps the old value.
    pub fn refresh(clock: &mut CachedClock) {
        if let Some(time) = Self::try_now() {
            clock.update(time);
        }
    }
}

impl Rtc for Cmos {
    fn now(&mut self) -> RtcTime {
        loop {
            if let Some(time) = Self::try_now() {
                return time;
            }
            core::hint::spin_loop();
        }
    }
}
