//! On-disk format of the cluster filesystem and the request record used to
//! address it from user space.

use core::fmt;

/// Size of one storage block in bytes.
pub const BLOCK_SIZE: usize = 512;
/// Blocks per cluster.
pub const CLUSTER_BLOCK_COUNT: usize = 4;
/// Size of one cluster in bytes.
pub const CLUSTER_SIZE: usize = BLOCK_SIZE * CLUSTER_BLOCK_COUNT;
/// Entries in the allocation table. The serialized table fills one cluster.
pub const CLUSTER_MAP_SIZE: usize = CLUSTER_SIZE / 4;

/// Block holding the filesystem signature.
pub const SIGNATURE_BLOCK: u32 = 0;
/// Cluster holding the serialized allocation table.
pub const FAT_CLUSTER: u32 = 1;
/// Cluster holding the root directory table.
pub const ROOT_CLUSTER: u32 = 2;

/// Media-descriptor value stored in allocation-table slot 0.
pub const CLUSTER_0_VALUE: u32 = 0x0FFF_FFF0;
/// Value stored in allocation-table slot 1.
pub const CLUSTER_1_VALUE: u32 = 0x0FFF_FFFF;
/// Marks the last cluster of a chain.
pub const END_OF_CHAIN: u32 = 0x0FFF_FFFF;
/// Marks a free cluster.
pub const EMPTY_CLUSTER: u32 = 0;

/// Size of one serialized directory entry.
pub const DIRECTORY_ENTRY_SIZE: usize = 32;
/// Entries in one directory table.
pub const DIRECTORY_TABLE_LENGTH: usize = CLUSTER_SIZE / DIRECTORY_ENTRY_SIZE;
/// Leading slots every directory table reserves for itself and its parent.
pub const RESERVED_DIRECTORY_SLOTS: usize = 2;
/// `user_attribute` value of an occupied entry.
pub const ENTRY_OCCUPIED: u8 = 0xAA;

bitflags::bitflags! {
    /// Attribute byte of a directory entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const SUBDIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// An 8.3 name, NUL padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileName {
    /// Base name.
    pub name: [u8; 8],
    /// Extension.
    pub ext: [u8; 3],
}

impl FileName {
    /// Name stored in slot 1 of every directory table.
    pub const PARENT: FileName = FileName::new(*b"..\0\0\0\0\0\0", [0; 3]);

    /// Builds a name from raw padded fields.
    pub const fn new(name: [u8; 8], ext: [u8; 3]) -> Self {
        Self { name, ext }
    }

    /// Builds a name from text, truncating to 8 and 3 bytes.
    pub fn from_parts(name: &str, ext: &str) -> Self {
        let mut out = Self::default();
        for (dst, src) in out.name.iter_mut().zip(name.bytes()) {
            *dst = src;
        }
        for (dst, src) in out.ext.iter_mut().zip(ext.bytes()) {
            *dst = src;
        }
        out
    }

    /// Parses `NAME.EXT` (or just `NAME`).
    pub fn parse(text: &str) -> Self {
        match text.split_once('.') {
            Some((name, ext)) => Self::from_parts(name, ext),
            None => Self::from_parts(text, ""),
        }
    }

    /// Base name without padding.
    pub fn name_bytes(&self) -> &[u8] {
        trim(&self.name)
    }

    /// Extension without padding.
    pub fn ext_bytes(&self) -> &[u8] {
        trim(&self.ext)
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let len = bytes
        .iter()
        .position(|&b| b == 0 || b == b' ')
        .unwrap_or(bytes.len());
    &bytes[..len]
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.name_bytes() {
            write!(f, "{}", b as char)?;
        }
        let ext = self.ext_bytes();
        if !ext.is_empty() {
            write!(f, ".")?;
            for &b in ext {
                write!(f, "{}", b as char)?;
            }
        }
        Ok(())
    }
}

/// Request record passed by pointer to the file and process system calls.
///
/// `buf` is the user buffer (or load address for process creation) and
/// `buffer_size` its length. A size of 0 on write means "create a directory".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriverRequest {
    /// User buffer or load address.
    pub buf: u32,
    /// Target entry.
    pub file: FileName,
    /// Cluster of the directory holding the entry.
    pub parent_cluster: u32,
    /// Buffer length in bytes.
    pub buffer_size: u32,
}

impl DriverRequest {
    /// Packed size of the record in user memory.
    pub const ENCODED_LEN: usize = 23;

    /// Serializes the record in its packed little-endian layout.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..4].copy_from_slice(&self.buf.to_le_bytes());
        out[4..12].copy_from_slice(&self.file.name);
        out[12..15].copy_from_slice(&self.file.ext);
        out[15..19].copy_from_slice(&self.parent_cluster.to_le_bytes());
        out[19..23].copy_from_slice(&self.buffer_size.to_le_bytes());
        out
    }

    /// Parses a packed record.
    pub fn decode(bytes: &[u8; Self::ENCODED_LEN]) -> Self {
        let mut file = FileName::default();
        file.name.copy_from_slice(&bytes[4..12]);
        file.ext.copy_from_slice(&bytes[12..15]);
        Self {
            buf: read_u32(bytes, 0),
            file,
            parent_cluster: read_u32(bytes, 15),
            buffer_size: read_u32(bytes, 19),
        }
    }
}

/// One 32-byte directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    /// Entry name.
    pub file: FileName,
    /// Raw attribute byte.
    pub attribute: u8,
    /// [`ENTRY_OCCUPIED`] when the slot is live.
    pub user_attribute: u8,
    /// Unused by the kernel, preserved on disk.
    pub undelete: u8,
    /// Creation time (FAT encoding).
    pub create_time: u16,
    /// Creation date (FAT encoding).
    pub create_date: u16,
    /// Last access date.
    pub access_date: u16,
    /// High half of the starting cluster.
    pub cluster_high: u16,
    /// Modification time.
    pub modified_time: u16,
    /// Modification date.
    pub modified_date: u16,
    /// Low half of the starting cluster.
    pub cluster_low: u16,
    /// File size in bytes; 0 for directories.
    pub size: u32,
}

impl DirectoryEntry {
    /// A live entry starting at `cluster`.
    pub fn new(file: FileName, attributes: Attributes, cluster: u32, size: u32) -> Self {
        let mut entry = Self {
            file,
            attribute: attributes.bits(),
            user_attribute: ENTRY_OCCUPIED,
            size,
            ..Self::default()
        };
        entry.set_cluster(cluster);
        entry
    }

    /// Whether the slot holds a live entry.
    pub fn is_occupied(&self) -> bool {
        self.user_attribute == ENTRY_OCCUPIED
    }

    /// Whether the entry names a subdirectory.
    pub fn is_directory(&self) -> bool {
        self.attributes().contains(Attributes::SUBDIRECTORY)
    }

    /// Known attribute bits.
    pub fn attributes(&self) -> Attributes {
        Attributes::from_bits_truncate(self.attribute)
    }

    /// Starting cluster number.
    pub fn cluster(&self) -> u32 {
        (u32::from(self.cluster_high) << 16) | u32::from(self.cluster_low)
    }

    /// Sets both halves of the starting cluster.
    pub fn set_cluster(&mut self, cluster: u32) {
        self.cluster_high = (cluster >> 16) as u16;
        self.cluster_low = cluster as u16;
    }

    /// Serializes into the on-disk layout.
    pub fn encode(&self, out: &mut [u8; DIRECTORY_ENTRY_SIZE]) {
        out[0..8].copy_from_slice(&self.file.name);
        out[8..11].copy_from_slice(&self.file.ext);
        out[11] = self.attribute;
        out[12] = self.user_attribute;
        out[13] = self.undelete;
        out[14..16].copy_from_slice(&self.create_time.to_le_bytes());
        out[16..18].copy_from_slice(&self.create_date.to_le_bytes());
        out[18..20].copy_from_slice(&self.access_date.to_le_bytes());
        out[20..22].copy_from_slice(&self.cluster_high.to_le_bytes());
        out[22..24].copy_from_slice(&self.modified_time.to_le_bytes());
        out[24..26].copy_from_slice(&self.modified_date.to_le_bytes());
        out[26..28].copy_from_slice(&self.cluster_low.to_le_bytes());
        out[28..32].copy_from_slice(&self.size.to_le_bytes());
    }

    /// Parses the on-disk layout.
    pub fn decode(bytes: &[u8; DIRECTORY_ENTRY_SIZE]) -> Self {
        let mut file = FileName::default();
        file.name.copy_from_slice(&bytes[0..8]);
        file.ext.copy_from_slice(&bytes[8..11]);
        Self {
            file,
            attribute: bytes[11],
            user_attribute: bytes[12],
            undelete: bytes[13],
            create_time: read_u16(bytes, 14),
            create_date: read_u16(bytes, 16),
            access_date: read_u16(bytes, 18),
            cluster_high: read_u16(bytes, 20),
            modified_time: read_u16(bytes, 22),
            modified_date: read_u16(bytes, 24),
            cluster_low: read_u16(bytes, 26),
            size: read_u32(bytes, 28),
        }
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry() {
        assert_eq!(CLUSTER_SIZE, 2048);
        assert_eq!(CLUSTER_MAP_SIZE, 512);
        assert_eq!(DIRECTORY_TABLE_LENGTH, 64);
    }

    #[test]
    fn test_file_name_padding() {
        let name = FileName::from_parts("clock", "");
        assert_eq!(&name.name, b"clock\0\0\0");
        assert_eq!(name.ext, [0; 3]);

        let long = FileName::parse("verylongname.text");
        assert_eq!(&long.name, b"verylong");
        assert_eq!(&long.ext, b"tex");
        assert_eq!(std::format!("{}", long), "verylong.tex");
        assert_eq!(std::format!("{}", name), "clock");
    }

    #[test]
    fn test_request_layout() {
        let request = DriverRequest {
            buf: 0x1234_5678,
            file: FileName::parse("shell"),
            parent_cluster: ROOT_CLUSTER,
            buffer_size: 0x800,
        };
        let bytes = request.encode();
        assert_eq!(&bytes[0..4], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(&bytes[4..9], b"shell");
        assert_eq!(&bytes[15..19], &[2, 0, 0, 0]);
        assert_eq!(DriverRequest::decode(&bytes), request);
    }

    #[test]
    fn test_directory_entry_layout() {
        let entry = DirectoryEntry::new(
            FileName::parse("kernel.bin"),
            Attributes::ARCHIVE,
            0x0001_0003,
            9000,
        );
        let mut raw = [0u8; DIRECTORY_ENTRY_SIZE];
        entry.encode(&mut raw);

        assert_eq!(raw[11], Attributes::ARCHIVE.bits());
        assert_eq!(raw[12], ENTRY_OCCUPIED);
        assert_eq!(&raw[20..22], &[1, 0]);
        assert_eq!(&raw[26..28], &[3, 0]);
        assert_eq!(&raw[28..32], &9000u32.to_le_bytes());

        let back = DirectoryEntry::decode(&raw);
        assert!(back.is_occupied());
        assert!(!back.is_directory());
        assert_eq!(back.cluster(), 0x0001_0003);
    }

    #[test]
    fn test_unknown_bytes_survive_reencoding() {
        let mut raw = [0u8; DIRECTORY_ENTRY_SIZE];
        DirectoryEntry::new(FileName::parse("old.txt"), Attributes::empty(), 5, 1).encode(&mut raw);
        raw[13] = 0x5C;

        let mut again = [0u8; DIRECTORY_ENTRY_SIZE];
        DirectoryEntry::decode(&raw).encode(&mut again);
        assert_eq!(again, raw);
    }

    #[test]
    fn test_zeroed_entry_is_free() {
        let entry = DirectoryEntry::decode(&[0; DIRECTORY_ENTRY_SIZE]);
        assert!(!entry.is_occupied());
    }
}
