//! The cluster filesystem driver.
//!
//! A flat FAT-style store: block 0 holds a signature, cluster 1 the
//! allocation table, cluster 2 the root directory. Every operation works on
//! one parent directory (no path walking) and persists what it changed
//! before returning.
//!
//! Metadata updates touch two structures, the directory table and then the
//! allocation table, with no barrier between them. A crash between the two
//! writes can leak clusters; it never makes an entry point at free clusters.

use super::directory::{DirectoryTable, ROOT_NAME};
use super::table::AllocationTable;
use ember_common::fs::{
    Attributes, DirectoryEntry, FileName, BLOCK_SIZE, CLUSTER_BLOCK_COUNT, CLUSTER_MAP_SIZE,
    CLUSTER_SIZE, FAT_CLUSTER, ROOT_CLUSTER, SIGNATURE_BLOCK,
};
use ember_common::{KernelError, KernelResult};
use ember_hal::BlockDevice;

/// Contents of block 0 on a formatted device.
pub const SIGNATURE: [u8; BLOCK_SIZE] = signature();

const fn signature() -> [u8; BLOCK_SIZE] {
    const TEXT: &[u8] = b"Ember cluster filesystem\nformat 1, 2048-byte clusters\n";
    let mut block = [b' '; BLOCK_SIZE];
    let mut i = 0;
    while i < TEXT.len() {
        block[i] = TEXT[i];
        i += 1;
    }
    block[BLOCK_SIZE - 2] = b'O';
    block[BLOCK_SIZE - 1] = b'k';
    block
}

/// What [`Fat32::initialize`] found on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mount {
    /// No signature; a fresh filesystem was written.
    Formatted,
    /// An existing allocation table was loaded.
    Loaded,
}

/// Driver state: the device, the allocation table, and scratch tables.
pub struct Fat32<D> {
    device: D,
    table: AllocationTable,
    /// Parent directory of the operation in progress.
    parent: DirectoryTable,
    /// A child directory being created or inspected.
    child: DirectoryTable,
    cluster: [u8; CLUSTER_SIZE],
}

impl<D: BlockDevice> Fat32<D> {
    /// An unmounted driver over `device`.
    pub const fn new(device: D) -> Self {
        Self {
            device,
            table: AllocationTable::new(),
            parent: DirectoryTable::new(),
            child: DirectoryTable::new(),
            cluster: [0; CLUSTER_SIZE],
        }
    }

    /// Replaces the backing device. The filesystem must be initialized again.
    pub fn attach(&mut self, device: D) {
        self.device = device;
        self.table = AllocationTable::new();
    }

    /// The underlying block device.
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Mounts the device, formatting it first if the signature is missing.
    pub fn initialize(&mut self) -> KernelResult<Mount> {
        if self.cluster_limit() <= ROOT_CLUSTER as usize {
            return Err(KernelError::OutOfSpace);
        }
        if self.is_empty_storage()? {
            self.format()?;
            log::info!("formatted {} clusters", self.cluster_limit());
            Ok(Mount::Formatted)
        } else {
            let limit = self.cluster_limit();
            self.device
                .read_blocks(cluster_to_lba(FAT_CLUSTER), &mut self.cluster)?;
            self.table.load(&self.cluster, limit);
            log::info!("mounted, {} of {} clusters free", self.table.free_count(), limit);
            Ok(Mount::Loaded)
        }
    }

    /// Whether block 0 lacks the filesystem signature.
    pub fn is_empty_storage(&mut self) -> KernelResult<bool> {
        let mut block = [0u8; BLOCK_SIZE];
        self.device.read_blocks(SIGNATURE_BLOCK, &mut block)?;
        Ok(block != SIGNATURE)
    }

    /// Writes the signature, a fresh allocation table and an empty root.
    pub fn format(&mut self) -> KernelResult<()> {
        self.device.write_blocks(SIGNATURE_BLOCK, &SIGNATURE)?;
        self.table.format(self.cluster_limit());
        self.parent.init(ROOT_NAME, ROOT_CLUSTER);
        write_cluster(&mut self.device, ROOT_CLUSTER, self.parent.as_bytes())?;
        self.persist_table()
    }

    /// Copies the file `name` in directory `parent` into `dest`.
    ///
    /// Returns the file size; only that many bytes of `dest` are written.
    pub fn read(&mut self, name: &FileName, parent: u32, dest: &mut [u8]) -> KernelResult<usize> {
        self.load_parent(parent)?;
        let slot = self.parent.find(name).ok_or(KernelError::NotFound)?;
        let entry = self.parent.entry(slot);
        if entry.is_directory() {
            return Err(KernelError::IsADirectory);
        }
        let size = entry.size as usize;
        if size > dest.len() {
            return Err(KernelError::BufferTooSmall);
        }

        let mut copied = 0;
        for cluster in self.table.chain(entry.cluster()) {
            if copied == size {
                break;
            }
            read_cluster(&mut self.device, cluster?, &mut self.cluster)?;
            let n = (size - copied).min(CLUSTER_SIZE);
            dest[copied..copied + n].copy_from_slice(&self.cluster[..n]);
            copied += n;
        }
        if copied != size {
            return Err(KernelError::CorruptFilesystem);
        }
        Ok(size)
    }

    /// Copies the directory table of subdirectory `name` into `dest`.
    pub fn read_directory(
        &mut self,
        name: &FileName,
        parent: u32,
        dest: &mut [u8],
    ) -> KernelResult<()> {
        let dest = dest
            .get_mut(..CLUSTER_SIZE)
            .ok_or(KernelError::BufferTooSmall)?;
        self.load_parent(parent)?;
        let slot = self.parent.find(name).ok_or(KernelError::NotFound)?;
        let entry = self.parent.entry(slot);
        if !entry.is_directory() {
            return Err(KernelError::NotADirectory);
        }
        read_cluster(&mut self.device, entry.cluster(), dest)
    }

    /// Creates `name` in `parent` holding `data`, or a directory if `data` is empty.
    ///
    /// Returns the first cluster of the new entry. Nothing reaches the device
    /// until every check has passed; a failed write leaves the allocation
    /// table as it was.
    pub fn write(&mut self, name: &FileName, parent: u32, data: &[u8]) -> KernelResult<u32> {
        self.load_parent(parent)?;
        if self.parent.find(name).is_some() {
            return Err(KernelError::AlreadyExists);
        }
        let slot = self.parent.find_free().ok_or(KernelError::DirectoryFull)?;
        let size = u32::try_from(data.len()).map_err(|_| KernelError::OutOfSpace)?;
        let needed = data.len().div_ceil(CLUSTER_SIZE).max(1);
        if needed > CLUSTER_MAP_SIZE {
            return Err(KernelError::OutOfSpace);
        }
        let mut chosen = [0u32; CLUSTER_MAP_SIZE];
        let clusters = &mut chosen[..needed];
        self.table.find_free(clusters)?;

        let attributes = if data.is_empty() {
            self.child.init(*name, parent);
            write_cluster(&mut self.device, clusters[0], self.child.as_bytes())?;
            Attributes::SUBDIRECTORY
        } else {
            for (cluster, chunk) in clusters.iter().zip(data.chunks(CLUSTER_SIZE)) {
                self.cluster[..chunk.len()].copy_from_slice(chunk);
                self.cluster[chunk.len()..].fill(0);
                write_cluster(&mut self.device, *cluster, &self.cluster)?;
            }
            Attributes::ARCHIVE
        };

        self.table.link(clusters);
        let entry = DirectoryEntry::new(*name, attributes, clusters[0], size);
        self.parent.set(slot, &entry);
        if let Err(e) = write_cluster(&mut self.device, parent, self.parent.as_bytes()) {
            self.table.free_chain(clusters[0])?;
            return Err(e);
        }
        self.persist_table()?;
        log::debug!("created {} at cluster {} ({} bytes)", name, clusters[0], size);
        Ok(clusters[0])
    }

    /// Removes `name` from `parent` and frees its clusters.
    ///
    /// Directories must be empty apart from their reserved slots.
    pub fn delete(&mut self, name: &FileName, parent: u32) -> KernelResult<()> {
        self.load_parent(parent)?;
        let slot = self.parent.find(name).ok_or(KernelError::NotFound)?;
        let entry = self.parent.entry(slot);
        if entry.is_directory() {
            read_cluster(&mut self.device, entry.cluster(), self.child.as_bytes_mut())?;
            if !self.child.is_empty() {
                return Err(KernelError::DirectoryNotEmpty);
            }
        }
        // Validate the chain before the entry disappears from disk.
        self.table.chain(entry.cluster()).try_for_each(|c| c.map(drop))?;

        self.parent.clear(slot);
        write_cluster(&mut self.device, parent, self.parent.as_bytes())?;
        self.table.free_chain(entry.cluster())?;
        self.persist_table()?;
        log::debug!("deleted {} from cluster {}", name, parent);
        Ok(())
    }

    /// Calls `f` for every live entry of `parent`.
    pub fn for_each_entry(
        &mut self,
        parent: u32,
        mut f: impl FnMut(&DirectoryEntry),
    ) -> KernelResult<()> {
        self.load_parent(parent)?;
        self.parent.entries().for_each(|entry| f(&entry));
        Ok(())
    }

    /// Clusters the device can hold, capped at the table size.
    pub fn cluster_limit(&self) -> usize {
        (self.device.block_count() as usize / CLUSTER_BLOCK_COUNT).min(CLUSTER_MAP_SIZE)
    }

    /// Clusters still available for data.
    pub fn free_clusters(&self) -> usize {
        self.table.free_count()
    }

    /// The in-memory allocation table.
    pub fn table(&self) -> &AllocationTable {
        &self.table
    }

    fn load_parent(&mut self, parent: u32) -> KernelResult<()> {
        if !(ROOT_CLUSTER as usize..self.cluster_limit()).contains(&(parent as usize)) {
            return Err(KernelError::NotADirectory);
        }
        read_cluster(&mut self.device, parent, self.parent.as_bytes_mut())?;
        if !self.parent.is_valid() {
            return Err(KernelError::NotADirectory);
        }
        Ok(())
    }

    fn persist_table(&mut self) -> KernelResult<()> {
        self.table.store(&mut self.cluster);
        write_cluster(&mut self.device, FAT_CLUSTER, &self.cluster)
    }
}

/// First block of a cluster.
pub const fn cluster_to_lba(cluster: u32) -> u32 {
    cluster * CLUSTER_BLOCK_COUNT as u32
}

fn read_cluster<D: BlockDevice>(device: &mut D, cluster: u32, buf: &mut [u8]) -> KernelResult<()> {
    device.read_blocks(cluster_to_lba(cluster), &mut buf[..CLUSTER_SIZE])?;
    Ok(())
}

fn write_cluster<D: BlockDevice>(device: &mut D, cluster: u32, buf: &[u8]) -> KernelResult<()> {
    device.write_blocks(cluster_to_lba(cluster), &buf[..CLUSTER_SIZE])?;
    Ok(())
}
