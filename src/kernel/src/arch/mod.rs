//! Architecture-specific implementations.
//!
//! Only 32-bit x86 is supported. Everything here is thin glue between the
//! hardware and the traits in `ember_hal`.

pub mod x86;

pub use x86::*;
