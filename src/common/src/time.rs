//! Wall-clock time as reported by the real-time clock.

/// Calendar time in binary, 24-hour form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct RtcTime {
    pub second: u8,
    pub minute: u8,
    pub hour: u8,
    pub weekday: u8,
    pub day: u8,
    pub month: u8,
    pub year: u8,
    pub century: u8,
}

impl RtcTime {
    /// Size of the record copied to user space.
    pub const ENCODED_LEN: usize = 8;

    /// Layout copied to user memory by the clock call.
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        [
            self.second,
            self.minute,
            self.hour,
            self.weekday,
            self.day,
            self.month,
            self.year,
            self.century,
        ]
    }

    /// Inverse of [`RtcTime::to_bytes`].
    pub fn from_bytes(bytes: [u8; Self::ENCODED_LEN]) -> Self {
        let [second, minute, hour, weekday, day, month, year, century] = bytes;
        Self {
            second,
            minute,
            hour,
            weekday,
            day,
            month,
            year,
            century,
        }
    }

    /// Renders `HH:MM:SS`.
    pub fn format_hms(&self) -> [u8; 8] {
        let digits = |v: u8| [b'0' + (v / 10) % 10, b'0' + v % 10];
        let [h0, h1] = digits(self.hour);
        let [m0, m1] = digits(self.minute);
        let [s0, s1] = digits(self.second);
        [h0, h1, b':', m0, m1, b':', s0, s1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hms() {
        let time = RtcTime {
            hour: 7,
            minute: 5,
            second: 59,
            ..RtcTime::default()
        };
        assert_eq!(&time.format_hms(), b"07:05:59");
        assert_eq!(RtcTime::from_bytes(time.to_bytes()), time);
    }
}
