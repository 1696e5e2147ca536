//! RAM-backed block device.

use ember_common::fs::BLOCK_SIZE;
use ember_hal::{BlockDevice, DeviceError};

/// A block device over a borrowed byte buffer.
///
/// Used as the boot fallback when no disk answers.
pub struct RamDisk<'a> {
    storage: &'a mut [u8],
}

impl<'a> RamDisk<'a> {
    /// Wraps `storage`; trailing bytes past the last whole block are ignored.
    pub fn new(storage: &'a mut [u8]) -> Self {
        Self { storage }
    }

    fn span(&self, lba: u32, len: usize) -> Result<core::ops::Range<usize>, DeviceError> {
        if len % BLOCK_SIZE != 0 {
            return Err(DeviceError::Misaligned);
        }
        let start = (lba as usize)
            .checked_mul(BLOCK_SIZE)
            .ok_or(DeviceError::OutOfRange)?;
        let end = start.checked_add(len).ok_or(DeviceError::OutOfRange)?;
        if end > self.block_count() as usize * BLOCK_SIZE {
            return Err(DeviceError::OutOfRange);
        }
        Ok(start..end)
    }
}

impl BlockDevice for RamDisk<'_> {
    fn block_count(&self) -> u32 {
        (self.storage.len() / BLOCK_SIZE) as u32
    }

    fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        let span = self.span(lba, buf.len())?;
        buf.copy_from_slice(&self.storage[span]);
        Ok(())
    }

    fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<(), DeviceError> {
        let span = self.span(lba, buf.len())?;
        self.storage[span].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Fat32, Mount};
    use ember_common::fs::{FileName, ROOT_CLUSTER};
    use std::vec;

    #[test]
    fn test_bounds() {
        let mut storage = vec![0u8; BLOCK_SIZE * 2 + 7];
        let mut disk = RamDisk::new(&mut storage);
        assert_eq!(disk.block_count(), 2);

        let mut block = [0u8; BLOCK_SIZE];
        assert_eq!(disk.read_blocks(1, &mut block), Ok(()));
        assert_eq!(disk.read_blocks(2, &mut block), Err(DeviceError::OutOfRange));
        assert_eq!(disk.write_blocks(0, &block[..100]), Err(DeviceError::Misaligned));
    }

    #[test]
    fn test_hosts_a_filesystem() {
        let mut storage = vec![0u8; BLOCK_SIZE * 4 * 16];
        let mut fs = Fat32::new(RamDisk::new(&mut storage));
        assert_eq!(fs.initialize(), Ok(Mount::Formatted));
        fs.write(&FileName::parse("a.txt"), ROOT_CLUSTER, b"ram").unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(fs.read(&FileName::parse("a.txt"), ROOT_CLUSTER, &mut buf), Ok(3));
        assert_eq!(&buf, b"ram");
    }
}
