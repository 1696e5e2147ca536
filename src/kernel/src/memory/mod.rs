//! Physical frame accounting and per-process address spaces.

pub mod address_space;
pub mod frame;
pub mod paging;

pub use address_space::{MemoryManager, SpaceId};
pub use frame::{Frame, FrameAllocator};
pub use paging::{Mmu, Page, PageDirectory, PageDirectoryEntry, PageFlags};
