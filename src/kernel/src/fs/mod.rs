//! Cluster filesystem.
//!
//! - `table`: the cluster allocation table
//! - `directory`: one-cluster directory tables
//! - `driver`: CRUD operations over a [`BlockDevice`](ember_hal::BlockDevice)
//! - `ramdisk`: a block device in memory

pub mod directory;
pub mod driver;
pub mod ramdisk;
pub mod table;

pub use directory::DirectoryTable;
pub use driver::{Fat32, Mount, SIGNATURE};
pub use ramdisk::RamDisk;
pub use table::AllocationTable;
