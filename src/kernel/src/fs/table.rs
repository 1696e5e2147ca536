//! In-memory copy of the cluster allocation table.

use ember_common::fs::{
    CLUSTER_0_VALUE, CLUSTER_1_VALUE, CLUSTER_MAP_SIZE, CLUSTER_SIZE, EMPTY_CLUSTER, END_OF_CHAIN,
    ROOT_CLUSTER,
};
use ember_common::{KernelError, KernelResult};

/// Cluster allocation table.
///
/// Each entry is empty, end-of-chain, reserved, or the next cluster of a
/// chain. Only clusters below `limit` (the device size) are ever handed out.
pub struct AllocationTable {
    entries: [u32; CLUSTER_MAP_SIZE],
    limit: usize,
}

impl AllocationTable {
    pub const fn new() -> Self {
        Self {
            entries: [EMPTY_CLUSTER; CLUSTER_MAP_SIZE],
            limit: 0,
        }
    }

    /// Fresh table: reserved slots and the root directory claimed, everything else free.
    pub fn format(&mut self, limit: usize) {
        self.entries = [EMPTY_CLUSTER; CLUSTER_MAP_SIZE];
        self.entries[0] = CLUSTER_0_VALUE;
        self.entries[1] = CLUSTER_1_VALUE;
        self.entries[ROOT_CLUSTER as usize] = END_OF_CHAIN;
        self.limit = limit.min(CLUSTER_MAP_SIZE);
    }

    /// Reads the table from its on-disk cluster.
    pub fn load(&mut self, bytes: &[u8; CLUSTER_SIZE], limit: usize) {
        for (entry, raw) in self.entries.iter_mut().zip(bytes.chunks_exact(4)) {
            *entry = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        }
        self.limit = limit.min(CLUSTER_MAP_SIZE);
    }

    /// Serializes the table for its on-disk cluster.
    pub fn store(&self, out: &mut [u8; CLUSTER_SIZE]) {
        for (entry, raw) in self.entries.iter().zip(out.chunks_exact_mut(4)) {
            raw.copy_from_slice(&entry.to_le_bytes());
        }
    }

    /// Raw entry for `cluster`, if it is inside the table.
    pub fn get(&self, cluster: u32) -> Option<u32> {
        self.entries.get(cluster as usize).copied()
    }

    /// Clusters on the device that are free.
    pub fn free_count(&self) -> usize {
        self.entries[..self.limit]
            .iter()
            .filter(|&&e| e == EMPTY_CLUSTER)
            .count()
    }

    /// Picks the lowest `out.len()` free clusters without claiming them.
    pub fn find_free(&self, out: &mut [u32]) -> KernelResult<()> {
        let mut free = self.entries[..self.limit]
            .iter()
            .enumerate()
            .filter(|(_, &e)| e == EMPTY_CLUSTER)
            .map(|(i, _)| i as u32);
        for slot in out.iter_mut() {
            *slot = free.next().ok_or(KernelError::OutOfSpace)?;
        }
        Ok(())
    }

    /// Chains `clusters` in order and terminates the last one.
    pub fn link(&mut self, clusters: &[u32]) {
        for pair in clusters.windows(2) {
            self.entries[pair[0] as usize] = pair[1];
        }
        if let Some(&last) = clusters.last() {
            self.entries[last as usize] = END_OF_CHAIN;
        }
    }

    /// Marks every cluster of the chain starting at `start` empty.
    ///
    /// The chain is validated in full before anything is changed.
    pub fn free_chain(&mut self, start: u32) -> KernelResult<usize> {
        let length = self.chain(start).try_fold(0usize, |n, c| c.map(|_| n + 1))?;
        let mut cluster = start;
        for _ in 0..length {
            let next = self.entries[cluster as usize];
            self.entries[cluster as usize] = EMPTY_CLUSTER;
            cluster = next;
        }
        Ok(length)
    }

    /// Walks the chain starting at `start`.
    pub fn chain(&self, start: u32) -> Chain<'_> {
        Chain {
            table: self,
            next: Some(start),
            steps: 0,
        }
    }

    fn is_data_cluster(&self, cluster: u32) -> bool {
        (ROOT_CLUSTER as usize..self.limit).contains(&(cluster as usize))
    }
}

impl Default for AllocationTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a cluster chain.
///
/// Yields `CorruptFilesystem` (and stops) on a pointer to a free, reserved or
/// out-of-range cluster, or when the walk outgrows the table.
pub struct Chain<'a> {
    table: &'a AllocationTable,
    next: Option<u32>,
    steps: usize,
}

impl Iterator for Chain<'_> {
    type Item = KernelResult<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        let cluster = self.next.take()?;
        self.steps += 1;
        if self.steps > CLUSTER_MAP_SIZE || !self.table.is_data_cluster(cluster) {
            return Some(Err(KernelError::CorruptFilesystem));
        }
        match self.table.entries[cluster as usize] {
            END_OF_CHAIN => {}
            EMPTY_CLUSTER => return Some(Err(KernelError::CorruptFilesystem)),
            next => self.next = Some(next),
        }
        Some(Ok(cluster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn table(limit: usize) -> AllocationTable {
        let mut table = AllocationTable::new();
        table.format(limit);
        table
    }

    #[test]
    fn test_format_reserves_system_slots() {
        let table = table(CLUSTER_MAP_SIZE);
        assert_eq!(table.get(0), Some(CLUSTER_0_VALUE));
        assert_eq!(table.get(1), Some(CLUSTER_1_VALUE));
        assert_eq!(table.get(ROOT_CLUSTER), Some(END_OF_CHAIN));
        assert_eq!(table.free_count(), CLUSTER_MAP_SIZE - 3);
    }

    #[test]
    fn test_find_free_does_not_claim() {
        let table = table(16);
        let mut picked = [0u32; 3];
        table.find_free(&mut picked).unwrap();
        assert_eq!(picked, [3, 4, 5]);
        assert_eq!(table.free_count(), 13);

        let mut too_many = [0u32; 14];
        assert_eq!(table.find_free(&mut too_many), Err(KernelError::OutOfSpace));
    }

    #[test]
    fn test_link_and_walk() {
        let mut table = table(16);
        table.link(&[3, 7, 4]);
        let chain: Vec<u32> = table.chain(3).map(Result::unwrap).collect();
        assert_eq!(chain, [3, 7, 4]);

        assert_eq!(table.free_chain(3), Ok(3));
        assert_eq!(table.free_count(), 13);
    }

    #[test]
    fn test_cycle_detected() {
        let mut table = table(16);
        table.link(&[3, 4]);
        table.entries[4] = 3;
        assert!(table.chain(3).any(|c| c == Err(KernelError::CorruptFilesystem)));
        assert_eq!(table.free_chain(3), Err(KernelError::CorruptFilesystem));
        assert_eq!(table.get(3), Some(4));
    }

    #[test]
    fn test_dangling_pointer_detected() {
        let mut table = table(16);
        table.entries[3] = 9;
        let walk: Vec<_> = table.chain(3).collect();
        assert_eq!(walk, [Ok(3), Err(KernelError::CorruptFilesystem)]);
    }

    #[test]
    fn test_serialized_layout() {
        let mut table = table(CLUSTER_MAP_SIZE);
        table.link(&[3]);
        let mut raw = [0u8; CLUSTER_SIZE];
        table.store(&mut raw);
        assert_eq!(&raw[0..4], &CLUSTER_0_VALUE.to_le_bytes());
        assert_eq!(&raw[12..16], &END_OF_CHAIN.to_le_bytes());

        let mut back = AllocationTable::new();
        back.load(&raw, CLUSTER_MAP_SIZE);
        assert_eq!(back.get(3), Some(END_OF_CHAIN));
        assert_eq!(back.free_count(), table.free_count());
    }
}
