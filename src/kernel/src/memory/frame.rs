//! Physical frame allocator.
//!
//! Physical memory is a small fixed set of 4 MiB frames, so a used/free flag
//! per frame and a linear scan are enough.

use crate::config::{FRAME_COUNT, KERNEL_FRAME, PAGE_SIZE};
use ember_common::{KernelError, KernelResult};

/// A physical frame, identified by its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frame(usize);

impl Frame {
    /// Frame number `index`, or `None` past the end of physical memory.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < FRAME_COUNT {
            Some(Frame(index))
        } else {
            None
        }
    }

    /// Frame containing the physical address.
    pub const fn containing(address: u32) -> Option<Self> {
        Self::from_index((address / PAGE_SIZE) as usize)
    }

    /// Frame number, counted from physical address 0.
    pub const fn index(self) -> usize {
        self.0
    }

    /// First physical byte of the frame.
    pub const fn start_address(self) -> u32 {
        self.0 as u32 * PAGE_SIZE
    }
}

/// Tracks which physical frames are in use.
///
/// Invariant: `free` equals the number of `false` entries in `used`.
pub struct FrameAllocator {
    used: [bool; FRAME_COUNT],
    free: usize,
}

impl FrameAllocator {
    /// All frames free except the one holding the kernel.
    pub const fn new() -> Self {
        let mut used = [false; FRAME_COUNT];
        used[KERNEL_FRAME] = true;
        Self {
            used,
            free: FRAME_COUNT - 1,
        }
    }

    /// Whether at least `n` frames are free.
    pub fn allocate_check(&self, n: usize) -> bool {
        self.free >= n
    }

    /// Claims the lowest-numbered free frame.
    pub fn allocate_one(&mut self) -> KernelResult<Frame> {
        let index = self
            .used
            .iter()
            .position(|used| !used)
            .ok_or(KernelError::OutOfMemory)?;
        self.used[index] = true;
        self.free -= 1;
        log::trace!("frame {} allocated, {} free", index, self.free);
        Ok(Frame(index))
    }

    /// Returns a frame to the pool.
    ///
    /// Freeing a frame that is already free is an error (`NotMapped`) and
    /// leaves the counters untouched. The kernel frame can never be freed.
    pub fn free_one(&mut self, frame: Frame) -> KernelResult<()> {
        if frame.0 == KERNEL_FRAME {
            return Err(KernelError::InvalidAddress);
        }
        if !self.used[frame.0] {
            return Err(KernelError::NotMapped);
        }
        self.used[frame.0] = false;
        self.free += 1;
        log::trace!("frame {} freed, {} free", frame.0, self.free);
        Ok(())
    }

    /// Whether `frame` is allocated.
    pub fn is_used(&self, frame: Frame) -> bool {
        self.used[frame.0]
    }

    /// Frames available.
    pub fn free_count(&self) -> usize {
        self.free
    }

    /// Frames handed out, the kernel frame included.
    pub fn used_count(&self) -> usize {
        FRAME_COUNT - self.free
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_accounting(frames: &FrameAllocator) {
        let flagged_free = frames.used.iter().filter(|u| !**u).count();
        assert_eq!(frames.free_count(), flagged_free);
        assert_eq!(frames.free_count() + frames.used_count(), FRAME_COUNT);
    }

    #[test]
    fn test_kernel_frame_reserved() {
        let frames = FrameAllocator::new();
        assert_eq!(frames.free_count(), FRAME_COUNT - 1);
        assert!(frames.is_used(Frame(KERNEL_FRAME)));
        assert_accounting(&frames);
    }

    #[test]
    fn test_allocates_lowest_free() {
        let mut frames = FrameAllocator::new();
        let a = frames.allocate_one().unwrap();
        let b = frames.allocate_one().unwrap();
        assert_eq!((a.index(), b.index()), (1, 2));

        frames.free_one(a).unwrap();
        assert_eq!(frames.allocate_one().unwrap(), a);
    }

    #[test]
    fn test_exhaustion() {
        let mut frames = FrameAllocator::new();
        for _ in 1..FRAME_COUNT {
            frames.allocate_one().unwrap();
        }
        assert!(frames.allocate_check(0));
        assert!(!frames.allocate_check(1));
        assert_eq!(frames.allocate_one(), Err(KernelError::OutOfMemory));
        assert_accounting(&frames);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut frames = FrameAllocator::new();
        let frame = frames.allocate_one().unwrap();
        frames.free_one(frame).unwrap();
        assert_eq!(frames.free_one(frame), Err(KernelError::NotMapped));
        assert_eq!(
            frames.free_one(Frame(KERNEL_FRAME)),
            Err(KernelError::InvalidAddress)
        );
        assert_accounting(&frames);
    }

    #[test]
    fn test_accounting_holds_over_mixed_sequence() {
        let mut frames = FrameAllocator::new();
        let mut held = std::vec::Vec::new();
        let mut seed = 0x2545_f491u32;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 3 != 0 {
                match frames.allocate_one() {
                    Ok(frame) => {
                        assert!(!held.contains(&frame));
                        held.push(frame);
                    }
                    Err(e) => assert_eq!(e, KernelError::OutOfMemory),
                }
            } else if !held.is_empty() {
                let frame = held.swap_remove(seed as usize % held.len());
                frames.free_one(frame).unwrap();
            }
            assert_accounting(&frames);
            assert_eq!(frames.used_count(), held.len() + 1);
        }
    }

    #[test]
    fn test_frame_addresses() {
        assert_eq!(Frame::containing(0x003F_FFFF).unwrap().index(), 0);
        assert_eq!(Frame::containing(0x0140_0000).unwrap().index(), 5);
        assert_eq!(Frame::from_index(3).unwrap().start_address(), 0x00C0_0000);
        assert_eq!(Frame::from_index(FRAME_COUNT), None);
    }
}
