//! Definitions shared between the Ember kernel and the programs it runs.
//!
//! Everything here is part of the user/kernel ABI or the on-disk format, so
//! layouts are fixed and little-endian.

#![cfg_attr(not(test), no_std)]

pub mod error;
pub mod fs;
pub mod syscall;
pub mod time;

pub use error::{KernelError, KernelResult};
