//! Host-side doubles for the hardware traits.
//!
//! Only compiled for unit tests; the kernel core runs against these exactly
//! as it does against the i686 drivers.

use crate::config::PAGE_SIZE;
use crate::memory::{Mmu, Page, PageDirectory};
use crate::syscall::UserMemory;
use ember_common::fs::BLOCK_SIZE;
use ember_common::time::RtcTime;
use ember_common::{KernelError, KernelResult};
use ember_hal::{BlockDevice, Console, DeviceError, Rtc};
use std::boxed::Box;
use std::collections::HashMap;
use std::vec;
use std::vec::Vec;

/// Software page walker backed by lazily allocated host frames.
pub struct SoftMmu {
    active: Box<PageDirectory>,
    frames: HashMap<usize, Vec<u8>>,
    /// Every address passed to `invalidate_page`, in order.
    pub invalidations: Vec<u32>,
    /// Number of directory loads.
    pub loads: usize,
}

impl SoftMmu {
    pub fn new() -> Self {
        Self {
            active: Box::new(PageDirectory::with_kernel_mapping()),
            frames: HashMap::new(),
            invalidations: Vec::new(),
            loads: 0,
        }
    }

    /// Copy of the directory last loaded.
    pub fn active_directory(&self) -> &PageDirectory {
        &self.active
    }

    /// Contents of a physical frame, if anything was ever written to it.
    pub fn frame_bytes(&self, index: usize) -> Option<&[u8]> {
        self.frames.get(&index).map(|f| f.as_slice())
    }
}

impl Mmu for SoftMmu {
    fn load_directory(&mut self, directory: &PageDirectory) {
        *self.active = directory.clone();
        self.loads += 1;
    }

    fn invalidate_page(&mut self, address: u32) {
        self.invalidations.push(address);
    }

    unsafe fn active_memory(&mut self, address: u32, len: usize) -> &mut [u8] {
        let page = Page::containing(address);
        let frame = self
            .active
            .entry(page)
            .frame()
            .expect("access to an unmapped page");
        let offset = (address - page.start_address()) as usize;
        assert!(offset + len <= PAGE_SIZE as usize, "range crosses a page");
        let bytes = self
            .frames
            .entry(frame.index())
            .or_insert_with(|| vec![0; PAGE_SIZE as usize]);
        &mut bytes[offset..offset + len]
    }
}

/// Vector-backed block device with write counting and failure injection.
pub struct MemDisk {
    pub data: Vec<u8>,
    /// Completed block writes.
    pub writes: usize,
    /// Fail every write once `writes` reaches this value.
    pub fail_writes_after: Option<usize>,
}

impl MemDisk {
    pub fn new(blocks: usize) -> Self {
        Self {
            data: vec![0; blocks * BLOCK_SIZE],
            writes: 0,
            fail_writes_after: None,
        }
    }

    fn range(&self, lba: u32, len: usize) -> Result<core::ops::Range<usize>, DeviceError> {
        if len % BLOCK_SIZE != 0 {
            return Err(DeviceError::Misaligned);
        }
        let start = lba as usize * BLOCK_SIZE;
        if start + len > self.data.len() {
            return Err(DeviceError::OutOfRange);
        }
        Ok(start..start + len)
    }
}

impl BlockDevice for MemDisk {
    fn block_count(&self) -> u32 {
        (self.data.len() / BLOCK_SIZE) as u32
    }

    fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        let range = self.range(lba, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<(), DeviceError> {
        if self.fail_writes_after.is_some_and(|limit| self.writes >= limit) {
            return Err(DeviceError::Io);
        }
        let range = self.range(lba, buf.len())?;
        self.data[range].copy_from_slice(buf);
        self.writes += 1;
        Ok(())
    }
}

/// Console that records what was drawn.
#[derive(Default)]
pub struct ScriptedConsole {
    /// Bytes written at the cursor, with their color.
    pub written: Vec<(u8, u8)>,
    /// Positioned writes: (cell, bytes, color).
    pub placed: Vec<(usize, Vec<u8>, u8)>,
}

impl ScriptedConsole {
    pub fn text(&self) -> std::string::String {
        self.written.iter().map(|(b, _)| *b as char).collect()
    }
}

impl Console for ScriptedConsole {
    fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes(), 0x0F);
    }

    fn clear(&mut self) {
        self.written.clear();
        self.placed.clear();
    }

    fn put_char(&mut self, byte: u8, color: u8) {
        self.written.push((byte, color));
    }

    fn write_at(&mut self, bytes: &[u8], color: u8, position: usize) {
        self.placed.push((position, bytes.to_vec(), color));
    }
}

/// Clock frozen at one instant.
pub struct FixedRtc(pub RtcTime);

impl Rtc for FixedRtc {
    fn now(&mut self) -> RtcTime {
        self.0
    }
}

/// User memory as one flat buffer starting at address 0.
pub struct FlatUserMemory(pub Vec<u8>);

impl FlatUserMemory {
    pub fn new(len: usize) -> Self {
        Self(vec![0; len])
    }

    pub fn read_i32(&self, address: u32) -> i32 {
        let at = address as usize;
        i32::from_le_bytes([self.0[at], self.0[at + 1], self.0[at + 2], self.0[at + 3]])
    }
}

impl UserMemory for FlatUserMemory {
    fn bytes(&mut self, address: u32, len: usize) -> KernelResult<&mut [u8]> {
        let start = address as usize;
        self.0
            .get_mut(start..start + len)
            .ok_or(KernelError::InvalidAddress)
    }
}

/// A kernel over a blank 128-cluster disk, booted and formatted.
pub fn booted_kernel() -> Box<crate::kernel::Kernel<MemDisk, SoftMmu>> {
    use crate::process::KernelStacks;
    use ember_common::fs::CLUSTER_BLOCK_COUNT;

    let mut kernel = Box::new(crate::kernel::Kernel::new(
        MemDisk::new(128 * CLUSTER_BLOCK_COUNT),
        SoftMmu::new(),
    ));
    assert_eq!(
        kernel.boot(KernelStacks::new(0xC020_0000, 0x4000)),
        Ok(crate::fs::Mount::Formatted)
    );
    kernel
}
