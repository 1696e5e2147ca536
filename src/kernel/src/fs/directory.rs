//! A directory table: one cluster of fixed-size entries.

use ember_common::fs::{
    Attributes, DirectoryEntry, FileName, CLUSTER_SIZE, DIRECTORY_ENTRY_SIZE,
    DIRECTORY_TABLE_LENGTH, RESERVED_DIRECTORY_SLOTS,
};

/// Name given to the root directory's own slot.
pub const ROOT_NAME: FileName = FileName::new(*b"root\0\0\0\0", [0; 3]);

/// Raw directory table, decoded entry by entry.
///
/// Slot 0 names the directory itself and slot 1 is `..`; both record the
/// parent's cluster. Lookups never match those two slots.
pub struct DirectoryTable {
    bytes: [u8; CLUSTER_SIZE],
}

impl DirectoryTable {
    /// A zeroed table with no live entries.
    pub const fn new() -> Self {
        Self {
            bytes: [0; CLUSTER_SIZE],
        }
    }

    /// Resets the table to a fresh directory called `name` under `parent`.
    pub fn init(&mut self, name: FileName, parent: u32) {
        self.bytes = [0; CLUSTER_SIZE];
        self.set(0, &DirectoryEntry::new(name, Attributes::SUBDIRECTORY, parent, 0));
        self.set(
            1,
            &DirectoryEntry::new(FileName::PARENT, Attributes::SUBDIRECTORY, parent, 0),
        );
    }

    /// The raw cluster contents.
    pub fn as_bytes(&self) -> &[u8; CLUSTER_SIZE] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; CLUSTER_SIZE] {
        &mut self.bytes
    }

    /// Whether slot 0 holds the self reference every directory starts with.
    pub fn is_valid(&self) -> bool {
        let head = self.entry(0);
        head.is_occupied() && head.is_directory()
    }

    /// Cluster of the parent directory, as recorded in slot 0.
    pub fn parent_cluster(&self) -> u32 {
        self.entry(0).cluster()
    }

    /// Entry at `index`. Out-of-range indices read as a free slot.
    pub fn entry(&self, index: usize) -> DirectoryEntry {
        match self.raw(index) {
            Some(raw) => DirectoryEntry::decode(raw),
            None => DirectoryEntry::default(),
        }
    }

    /// Writes `entry` into slot `index`.
    pub fn set(&mut self, index: usize, entry: &DirectoryEntry) {
        if let Some(raw) = self.raw_mut(index) {
            entry.encode(raw);
        }
    }

    /// Frees slot `index`.
    pub fn clear(&mut self, index: usize) {
        if let Some(raw) = self.raw_mut(index) {
            *raw = [0; DIRECTORY_ENTRY_SIZE];
        }
    }

    /// Slot of the live entry called `name`.
    pub fn find(&self, name: &FileName) -> Option<usize> {
        self.user_slots()
            .find(|&i| {
                let entry = self.entry(i);
                entry.is_occupied() && entry.file == *name
            })
    }

    /// First unoccupied slot.
    pub fn find_free(&self) -> Option<usize> {
        self.user_slots().find(|&i| !self.entry(i).is_occupied())
    }

    /// No occupied slot beyond the reserved ones.
    pub fn is_empty(&self) -> bool {
        self.user_slots().all(|i| !self.entry(i).is_occupied())
    }

    /// Live entries beyond the reserved slots.
    pub fn entries(&self) -> impl Iterator<Item = DirectoryEntry> + '_ {
        self.user_slots()
            .map(|i| self.entry(i))
            .filter(DirectoryEntry::is_occupied)
    }

    fn user_slots(&self) -> core::ops::Range<usize> {
        RESERVED_DIRECTORY_SLOTS..DIRECTORY_TABLE_LENGTH
    }

    fn raw(&self, index: usize) -> Option<&[u8; DIRECTORY_ENTRY_SIZE]> {
        let start = index.checked_mul(DIRECTORY_ENTRY_SIZE)?;
        self.bytes.get(start..start + DIRECTORY_ENTRY_SIZE)?.try_into().ok()
    }

    fn raw_mut(&mut self, index: usize) -> Option<&mut [u8; DIRECTORY_ENTRY_SIZE]> {
        let start = index.checked_mul(DIRECTORY_ENTRY_SIZE)?;
        self.bytes
            .get_mut(start..start + DIRECTORY_ENTRY_SIZE)?
            .try_into()
            .ok()
    }
}

impl Default for DirectoryTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_common::fs::ROOT_CLUSTER;

    #[test]
    fn test_init_reserves_two_slots() {
        let mut table = DirectoryTable::new();
        table.init(ROOT_NAME, ROOT_CLUSTER);
        assert!(table.is_valid());
        assert!(table.is_empty());
        assert_eq!(table.parent_cluster(), ROOT_CLUSTER);
        assert_eq!(table.entry(1).file, FileName::PARENT);
        assert_eq!(table.find_free(), Some(2));
    }

    #[test]
    fn test_zeroed_table_is_invalid() {
        assert!(!DirectoryTable::new().is_valid());
    }

    #[test]
    fn test_lookup_ignores_reserved_slots() {
        let mut table = DirectoryTable::new();
        table.init(FileName::parse("docs"), ROOT_CLUSTER);
        assert_eq!(table.find(&FileName::parse("docs")), None);
        assert_eq!(table.find(&FileName::PARENT), None);

        let file = FileName::parse("notes.txt");
        table.set(5, &DirectoryEntry::new(file, Attributes::ARCHIVE, 9, 100));
        assert_eq!(table.find(&file), Some(5));
        assert!(!table.is_empty());
        assert_eq!(table.entries().count(), 1);

        table.clear(5);
        assert_eq!(table.find(&file), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_full_table() {
        let mut table = DirectoryTable::new();
        table.init(ROOT_NAME, ROOT_CLUSTER);
        for i in RESERVED_DIRECTORY_SLOTS..DIRECTORY_TABLE_LENGTH {
            let name = FileName::from_parts("f", "");
            table.set(i, &DirectoryEntry::new(name, Attributes::ARCHIVE, 3, 1));
        }
        assert_eq!(table.find_free(), None);
    }
}
