//! Page directories for 32-bit paging with 4 MiB pages.
//!
//! Every mapping is a single page-size-extension directory entry, so there
//! are no second-level tables: entry `i` covers `[i * 4 MiB, (i + 1) * 4 MiB)`.

use super::frame::Frame;
use crate::config::{KERNEL_PAGE_INDEX, PAGE_DIRECTORY_ENTRIES, PAGE_SIZE};

bitflags::bitflags! {
    /// Low bits of a page directory entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        /// Maps a whole 4 MiB page instead of pointing at a page table.
        const HUGE = 1 << 7;
        const GLOBAL = 1 << 8;
    }
}

impl PageFlags {
    /// Flags of the kernel's higher-half mapping.
    pub const KERNEL: PageFlags = PageFlags::PRESENT
        .union(PageFlags::WRITABLE)
        .union(PageFlags::HUGE);
    /// Flags of a page handed to a user process.
    pub const USER_DATA: PageFlags = PageFlags::PRESENT
        .union(PageFlags::WRITABLE)
        .union(PageFlags::USER)
        .union(PageFlags::HUGE);
}

/// Physical base bits of a 4 MiB entry.
const ADDRESS_MASK: u32 = !(PAGE_SIZE - 1);

/// One raw directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageDirectoryEntry(u32);

impl PageDirectoryEntry {
    /// A not-present entry.
    pub const EMPTY: PageDirectoryEntry = PageDirectoryEntry(0);

    /// Maps `frame` with `flags`; `PRESENT` and `HUGE` are always set.
    pub const fn new(frame: Frame, flags: PageFlags) -> Self {
        let flags = flags.union(PageFlags::PRESENT).union(PageFlags::HUGE);
        PageDirectoryEntry(frame.start_address() | flags.bits())
    }

    /// Whether the entry maps a frame.
    pub const fn is_present(self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    /// Mapped frame, if present.
    pub const fn frame(self) -> Option<Frame> {
        if self.is_present() {
            Frame::containing(self.0 & ADDRESS_MASK)
        } else {
            None
        }
    }

    /// Known flag bits.
    pub const fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0)
    }

    /// The entry as the CPU reads it.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A virtual page, identified by its directory index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Page(usize);

impl Page {
    /// Page containing the virtual address.
    pub const fn containing(address: u32) -> Self {
        Page((address / PAGE_SIZE) as usize)
    }

    /// Page number `index`, or `None` past the end of the directory.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < PAGE_DIRECTORY_ENTRIES {
            Some(Page(index))
        } else {
            None
        }
    }

    /// Directory index of the page.
    pub const fn index(self) -> usize {
        self.0
    }

    /// First virtual address of the page.
    pub const fn start_address(self) -> u32 {
        self.0 as u32 * PAGE_SIZE
    }

    /// Whether the page lies in the kernel's higher half.
    pub const fn is_kernel(self) -> bool {
        self.0 >= KERNEL_PAGE_INDEX
    }
}

/// A page directory, aligned so its physical address can be loaded into `cr3`.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PageDirectoryEntry; PAGE_DIRECTORY_ENTRIES],
}

impl PageDirectory {
    /// A directory with nothing mapped.
    pub const fn empty() -> Self {
        Self {
            entries: [PageDirectoryEntry::EMPTY; PAGE_DIRECTORY_ENTRIES],
        }
    }

    /// A directory holding only the kernel's higher-half mapping of frame 0.
    pub const fn with_kernel_mapping() -> Self {
        let mut directory = Self::empty();
        if let Some(frame) = Frame::from_index(crate::config::KERNEL_FRAME) {
            directory.entries[KERNEL_PAGE_INDEX] = PageDirectoryEntry::new(frame, PageFlags::KERNEL);
        }
        directory
    }

    /// Entry covering `page`.
    pub fn entry(&self, page: Page) -> PageDirectoryEntry {
        self.entries[page.0]
    }

    /// Installs `entry` for `page`.
    pub fn set(&mut self, page: Page, entry: PageDirectoryEntry) {
        self.entries[page.0] = entry;
    }

    /// Removes the mapping for `page`.
    pub fn clear(&mut self, page: Page) {
        self.entries[page.0] = PageDirectoryEntry::EMPTY;
    }

    /// Present user-half pages with their frames.
    pub fn user_mappings(&self) -> impl Iterator<Item = (Page, Frame)> + '_ {
        self.entries[..KERNEL_PAGE_INDEX]
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.frame().map(|frame| (Page(i), frame)))
    }
}

/// The translation hardware, seen from the address-space manager.
pub trait Mmu {
    /// Makes `directory` the active translation table.
    fn load_directory(&mut self, directory: &PageDirectory);

    /// Drops any cached translation for the page starting at `address`.
    fn invalidate_page(&mut self, address: u32);

    /// Bytes `[address, address + len)` as seen through the active directory.
    ///
    /// # Safety
    ///
    /// The whole range must be mapped writable in the active directory, and
    /// the caller must not keep the slice across a directory switch.
    unsafe fn active_memory(&mut self, address: u32, len: usize) -> &mut [u8];
}
