//! Real-time clock decoding and caching.

use ember_common::time::RtcTime;
use ember_hal::Rtc;

/// Status register B: hours are in 24-hour form.
pub const STATUS_B_24_HOUR: u8 = 0x02;
/// Status register B: values are binary rather than BCD.
pub const STATUS_B_BINARY: u8 = 0x04;

const PM_BIT: u8 = 0x80;

fn bcd_to_binary(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

/// Converts raw CMOS registers to binary 24-hour time and shifts the hour
/// by `hour_offset`, wrapping within the day.
pub fn decode(raw: RtcTime, status_b: u8, hour_offset: i8) -> RtcTime {
    let binary = status_b & STATUS_B_BINARY != 0;
    let convert = |v: u8| if binary { v } else { bcd_to_binary(v) };

    let pm = raw.hour & PM_BIT != 0;
    let mut hour = convert(raw.hour & !PM_BIT);
    if status_b & STATUS_B_24_HOUR == 0 {
        hour %= 12;
        if pm {
            hour += 12;
        }
    }
    let hour = (i16::from(hour) + i16::from(hour_offset)).rem_euclid(24) as u8;

    RtcTime {
        second: convert(raw.second),
        minute: convert(raw.minute),
        hour,
        weekday: convert(raw.weekday),
        day: convert(raw.day),
        month: convert(raw.month),
        year: convert(raw.year),
        century: convert(raw.century),
    }
}

/// Last time read from the hardware, refreshed from the timer tick.
pub struct CachedClock {
    time: RtcTime,
}

impl CachedClock {
    /// A clock reading midnight until the first update.
    pub const fn new() -> Self {
        Self {
            time: RtcTime {
                second: 0,
                minute: 0,
                hour: 0,
                weekday: 0,
                day: 0,
                month: 0,
                year: 0,
                century: 0,
            },
        }
    }

    /// Replaces the cached time.
    pub fn update(&mut self, time: RtcTime) {
        self.time = time;
    }
}

impl Default for CachedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Rtc for CachedClock {
    fn now(&mut self) -> RtcTime {
        self.time
    }
}
