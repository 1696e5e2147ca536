//! Ember Kernel
//!
//! A small 32-bit protected-mode kernel: fixed 4 MiB frames, one page
//! directory per process, a FAT-style cluster filesystem and preemptive
//! round-robin scheduling.
//!
//! # Architecture
//!
//! The kernel is structured into the following modules:
//! - `memory`: frame allocator, page directories and address spaces
//! - `fs`: cluster storage engine over any [`ember_hal::BlockDevice`]
//! - `process`: process table, creation and teardown
//! - `sched`: round-robin selection on the timer tick
//! - `syscall`: decoding and routing of `int 0x30` requests
//! - `arch`: i686 glue (boot, descriptor tables, interrupt stubs, drivers)
//!
//! Everything outside `arch` is hardware-independent and unit tested on the
//! host against the doubles in `testutil`.
//!
//! # Safety
//!
//! All unsafe code is documented with the invariants that make it sound.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod drivers;
pub mod fs;
pub mod kernel;
pub mod memory;
pub mod process;
pub mod sched;
pub mod syscall;

#[cfg(target_arch = "x86")]
pub mod arch;
#[cfg(target_arch = "x86")]
pub mod boot;
#[cfg(all(feature = "self_test", target_arch = "x86"))]
pub mod selftest;

#[cfg(test)]
mod testutil;

pub use kernel::{Kernel, Tick};
