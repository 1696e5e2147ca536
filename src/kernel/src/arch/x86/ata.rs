//! PIO driver for the primary master ATA drive, 28-bit LBA.

use super::port::{inb, inw, outb, outw};
use ember_common::fs::BLOCK_SIZE;
use ember_hal::{BlockDevice, DeviceError};

const DATA: u16 = 0x1F0;
const SECTOR_COUNT: u16 = 0x1F2;
const LBA_LOW: u16 = 0x1F3;
const LBA_MID: u16 = 0x1F4;
const LBA_HIGH: u16 = 0x1F5;
const DRIVE: u16 = 0x1F6;
const STATUS: u16 = 0x1F7;
const COMMAND: u16 = 0x1F7;

const STATUS_ERR: u8 = 0x01;
const STATUS_DRQ: u8 = 0x08;
const STATUS_DF: u8 = 0x20;
const STATUS_BSY: u8 = 0x80;

const CMD_READ_SECTORS: u8 = 0x20;
const CMD_WRITE_SECTORS: u8 = 0x30;
const CMD_CACHE_FLUSH: u8 = 0xE7;
const CMD_IDENTIFY: u8 = 0xEC;

/// Master drive, LBA addressing.
const DRIVE_MASTER_LBA: u8 = 0xE0;

const WORDS_PER_SECTOR: usize = BLOCK_SIZE / 2;
const POLL_LIMIT: u32 = 1_000_000;
/// Highest block 28-bit LBA can address.
const LBA28_LIMIT: u32 = 1 << 28;

/// Primary master ATA drive in PIO mode.
pub struct AtaDrive {
    sectors: u32,
}

fn status() -> u8 {
    // SAFETY: the primary ATA ports belong to this driver.
    unsafe { inb(STATUS) }
}

fn wait_not_busy() -> Result<u8, DeviceError> {
    for _ in 0..POLL_LIMIT {
        let s = status();
        if s & STATUS_BSY == 0 {
            return Ok(s);
        }
    }
    Err(DeviceError::Io)
}

fn wait_data() -> Result<(), DeviceError> {
    for _ in 0..POLL_LIMIT {
        let s = wait_not_busy()?;
        if s & (STATUS_ERR | STATUS_DF) != 0 {
            return Err(DeviceError::Io);
        }
        if s & STATUS_DRQ != 0 {
            return Ok(());
        }
    }
    Err(DeviceError::Io)
}

fn issue(lba: u32, command: u8) {
    // SAFETY: see `status`.
    unsafe {
        outb(DRIVE, DRIVE_MASTER_LBA | ((lba >> 24) & 0x0F) as u8);
        outb(SECTOR_COUNT, 1);
        outb(LBA_LOW, lba as u8);
        outb(LBA_MID, (lba >> 8) as u8);
        outb(LBA_HIGH, (lba >> 16) as u8);
        outb(COMMAND, command);
    }
}

impl AtaDrive {
    /// Identifies the drive. `None` if nothing ATA answers.
    pub fn probe() -> Option<Self> {
        // SAFETY: see `status`.
        unsafe {
            outb(DRIVE, 0xA0);
            outb(SECTOR_COUNT, 0);
            outb(LBA_LOW, 0);
            outb(LBA_MID, 0);
            outb(LBA_HIGH, 0);
            outb(COMMAND, CMD_IDENTIFY);
        }
        if status() == 0 {
            return None;
        }
        wait_not_busy().ok()?;
        // SAFETY: see `status`.
        if unsafe { inb(LBA_MID) != 0 || inb(LBA_HIGH) != 0 } {
            return None;
        }
        wait_data().ok()?;
        let mut identify = [0u16; WORDS_PER_SECTOR];
        for word in identify.iter_mut() {
            // SAFETY: see `status`.
            *word = unsafe { inw(DATA) };
        }
        let sectors = (u32::from(identify[61]) << 16 | u32::from(identify[60])).min(LBA28_LIMIT);
        if sectors == 0 {
            return None;
        }
        log::info!("ata: primary master, {} sectors", sectors);
        Some(Self { sectors })
    }

    fn check(&self, lba: u32, len: usize) -> Result<(), DeviceError> {
        if len % BLOCK_SIZE != 0 {
            return Err(DeviceError::Misaligned);
        }
        let count = (len / BLOCK_SIZE) as u32;
        match lba.checked_add(count) {
            Some(end) if end <= self.sectors => Ok(()),
            _ => Err(DeviceError::OutOfRange),
        }
    }
}

impl BlockDevice for AtaDrive {
    fn block_count(&self) -> u32 {
        self.sectors
    }

    fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.check(lba, buf.len())?;
        for (i, sector) in buf.chunks_exact_mut(BLOCK_SIZE).enumerate() {
            issue(lba + i as u32, CMD_READ_SECTORS);
            wait_data()?;
            for pair in sector.chunks_exact_mut(2) {
                // SAFETY: see `status`.
                let word = unsafe { inw(DATA) };
                pair.copy_from_slice(&word.to_le_bytes());
            }
        }
        Ok(())
    }

    fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<(), DeviceError> {
        self.check(lba, buf.len())?;
        for (i, sector) in buf.chunks_exact(BLOCK_SIZE).enumerate() {
            issue(lba + i as u32, CMD_WRITE_SECTORS);
            wait_data()?;
            for pair in sector.chunks_exact(2) {
                // SAFETY: see `status`.
                unsafe { outw(DATA, u16::from_le_bytes([pair[0], pair[1]])) };
            }
            // SAFETY: see `status`.
            unsafe { outb(COMMAND, CMD_CACHE_FLUSH) };
            wait_not_busy()?;
        }
        Ok(())
    }
}
