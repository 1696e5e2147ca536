//! Hardware-independent halves of the input and clock drivers.
//!
//! The port I/O lives in `arch::x86`; what is left here is decoding and
//! buffering, which runs the same on the host.

pub mod keyboard;
pub mod rtc;

pub use keyboard::KeyboardBuffer;
pub use rtc::CachedClock;
