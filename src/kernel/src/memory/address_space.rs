//! Address-space manager.
//!
//! Owns the frame allocator and a fixed pool of page directories. Slot 0 is
//! the kernel's own directory; the rest are handed out to processes. Every
//! directory maps the kernel image at the same higher-half entry, so kernel
//! code stays reachable across a switch.
//!
//! Callers must run with interrupts disabled while mutating.

use super::frame::{Frame, FrameAllocator};
use super::paging::{Mmu, Page, PageDirectory, PageDirectoryEntry, PageFlags};
use crate::config::{
    ADDRESS_SPACE_COUNT_MAX, KERNEL_PAGE_INDEX, KERNEL_RESERVED_PAGES, KERNEL_VIRTUAL_BASE,
    PAGE_SIZE,
};
use ember_common::{KernelError, KernelResult};

const SLOT_COUNT: usize = ADDRESS_SPACE_COUNT_MAX + 1;

/// Handle to an address space in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpaceId(usize);

impl SpaceId {
    /// The kernel's own address space.
    pub const KERNEL: SpaceId = SpaceId(0);

    /// Pool slot of the space.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Frames, directories, and the hardware they are loaded into.
pub struct MemoryManager<M> {
    frames: FrameAllocator,
    directories: [PageDirectory; SLOT_COUNT],
    in_use: [bool; SLOT_COUNT],
    active: SpaceId,
    mmu: M,
}

impl<M: Mmu> MemoryManager<M> {
    /// A pool holding only the kernel space. Call [`MemoryManager::init`] before use.
    pub const fn new(mmu: M) -> Self {
        const KERNEL_ONLY: PageDirectory = PageDirectory::with_kernel_mapping();
        let mut in_use = [false; SLOT_COUNT];
        in_use[SpaceId::KERNEL.0] = true;
        Self {
            frames: FrameAllocator::new(),
            directories: [KERNEL_ONLY; SLOT_COUNT],
            in_use,
            active: SpaceId::KERNEL,
            mmu,
        }
    }

    /// Loads the kernel directory. Called once at boot.
    pub fn init(&mut self) {
        self.active = SpaceId::KERNEL;
        self.mmu.load_directory(&self.directories[SpaceId::KERNEL.0]);
        log::debug!("kernel address space active");
    }

    /// Takes a free slot and resets it to a kernel-only directory.
    pub fn create_address_space(&mut self) -> KernelResult<SpaceId> {
        let index = self
            .in_use
            .iter()
            .position(|used| !used)
            .ok_or(KernelError::AddressSpacePoolExhausted)?;
        self.in_use[index] = true;
        self.directories[index] = PageDirectory::with_kernel_mapping();
        log::debug!("address space {} created", index);
        Ok(SpaceId(index))
    }

    /// Installs or overwrites the entry for `page` and drops its cached translation.
    pub fn map(
        &mut self,
        space: SpaceId,
        frame: Frame,
        page: Page,
        flags: PageFlags,
    ) -> KernelResult<()> {
        let directory = self.directory_mut(space)?;
        directory.set(page, PageDirectoryEntry::new(frame, flags));
        self.mmu.invalidate_page(page.start_address());
        Ok(())
    }

    /// Allocates a frame and maps it user-accessible and writable at `page`.
    pub fn allocate_user_page(&mut self, space: SpaceId, page: Page) -> KernelResult<Frame> {
        if page.is_kernel() {
            return Err(KernelError::EntryPointInKernelSpace);
        }
        self.directory(space)?;
        let frame = self.frames.allocate_one()?;
        self.map(space, frame, page, PageFlags::USER_DATA)?;
        Ok(frame)
    }

    /// Removes the mapping at `page` and returns its frame to the allocator.
    pub fn unmap_and_free(&mut self, space: SpaceId, page: Page) -> KernelResult<Frame> {
        let frame = self
            .directory(space)?
            .entry(page)
            .frame()
            .ok_or(KernelError::NotMapped)?;
        self.frames.free_one(frame)?;
        self.directory_mut(space)?.clear(page);
        self.mmu.invalidate_page(page.start_address());
        Ok(frame)
    }

    /// Makes `space` the active address space.
    ///
    /// Reloading the directory register alone is not trusted to purge every
    /// stale translation, so each user page present in the old or the new
    /// directory is invalidated, plus the kernel-reserved region.
    pub fn switch_to(&mut self, space: SpaceId) -> KernelResult<()> {
        let previous = self.active;
        self.directory(space)?;
        self.mmu.load_directory(&self.directories[space.0]);
        self.active = space;

        for index in 0..KERNEL_PAGE_INDEX {
            let Some(page) = Page::from_index(index) else {
                break;
            };
            if self.directories[previous.0].entry(page).is_present()
                || self.directories[space.0].entry(page).is_present()
            {
                self.mmu.invalidate_page(page.start_address());
            }
        }
        for i in 0..KERNEL_RESERVED_PAGES as u32 {
            self.mmu.invalidate_page(KERNEL_VIRTUAL_BASE + i * PAGE_SIZE);
        }
        Ok(())
    }

    /// The space loaded into the MMU.
    pub fn current_address_space(&self) -> SpaceId {
        self.active
    }

    /// Frees every user frame in `space` and returns the slot to the pool.
    ///
    /// Switches to the kernel directory first if `space` is active.
    pub fn release(&mut self, space: SpaceId) -> KernelResult<()> {
        if space == SpaceId::KERNEL {
            return Err(KernelError::InvalidAddress);
        }
        self.directory(space)?;
        if self.active == space {
            self.switch_to(SpaceId::KERNEL)?;
        }
        let mut pages = [None; KERNEL_PAGE_INDEX];
        for (slot, (page, _)) in pages.iter_mut().zip(self.directories[space.0].user_mappings()) {
            *slot = Some(page);
        }
        for page in pages.into_iter().flatten() {
            self.unmap_and_free(space, page)?;
        }
        self.in_use[space.0] = false;
        log::debug!("address space {} released", space.0);
        Ok(())
    }

    /// Physical address backing `address` in `space`.
    pub fn translate(&self, space: SpaceId, address: u32) -> Option<u32> {
        let frame = self.directory(space).ok()?.entry(Page::containing(address)).frame()?;
        Some(frame.start_address() + address % PAGE_SIZE)
    }

    /// Whether `[address, address + len)` is mapped user-accessible in `space`.
    pub fn is_user_range(&self, space: SpaceId, address: u32, len: usize) -> bool {
        let Ok(directory) = self.directory(space) else {
            return false;
        };
        let Some(end) = u32::try_from(len)
            .ok()
            .and_then(|len| address.checked_add(len))
        else {
            return false;
        };
        if end > KERNEL_VIRTUAL_BASE {
            return false;
        }
        if len == 0 {
            return true;
        }
        let first = Page::containing(address).index();
        let last = Page::containing(end - 1).index();
        (first..=last).all(|index| {
            Page::from_index(index)
                .map(|page| directory.entry(page).flags().contains(PageFlags::USER_DATA))
                .unwrap_or(false)
        })
    }

    /// The physical frame allocator.
    pub fn frames(&self) -> &FrameAllocator {
        &self.frames
    }

    /// Directory of a live space.
    pub fn directory(&self, space: SpaceId) -> KernelResult<&PageDirectory> {
        if space.0 < SLOT_COUNT && self.in_use[space.0] {
            Ok(&self.directories[space.0])
        } else {
            Err(KernelError::InvalidAddress)
        }
    }

    fn directory_mut(&mut self, space: SpaceId) -> KernelResult<&mut PageDirectory> {
        if space.0 < SLOT_COUNT && self.in_use[space.0] {
            Ok(&mut self.directories[space.0])
        } else {
            Err(KernelError::InvalidAddress)
        }
    }

    /// Spaces still available in the pool.
    pub fn free_space_count(&self) -> usize {
        self.in_use.iter().filter(|used| !**used).count()
    }

    pub fn mmu(&self) -> &M {
        &self.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut M {
        &mut self.mmu
    }
}
