//! Process control blocks and process lifetime.
//!
//! Processes live in a fixed table. Creation loads an image from the
//! filesystem straight into freshly mapped pages of a new address space;
//! destruction hands every frame and the address-space slot back.

pub mod context;

pub use context::{Context, EFlags, GeneralRegisters, SegmentRegisters, TrapFrame};

use crate::config::{
    KERNEL_VIRTUAL_BASE, PAGE_SIZE, PROCESS_COUNT_MAX, PROCESS_NAME_MAX, PROCESS_PAGE_COUNT_MAX,
};
use crate::fs::Fat32;
use crate::memory::{MemoryManager, Mmu, Page, SpaceId};
use core::fmt;
use ember_common::fs::DriverRequest;
use ember_common::{KernelError, KernelResult};
use ember_hal::BlockDevice;

/// Process identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u32);

impl Pid {
    /// Wraps a raw id, as passed in from user space.
    pub const fn new(raw: u32) -> Self {
        Pid(raw)
    }

    /// The raw id.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Inactive,
    Waiting,
    Running,
}

/// Process control block.
#[derive(Debug, Clone, Copy)]
pub struct Process {
    pid: Pid,
    name: [u8; PROCESS_NAME_MAX],
    state: ProcessState,
    context: Context,
    pages: [Option<Page>; PROCESS_PAGE_COUNT_MAX],
}

impl Process {
    const INACTIVE: Process = Process {
        pid: Pid(0),
        name: [0; PROCESS_NAME_MAX],
        state: ProcessState::Inactive,
        context: Context {
            registers: GeneralRegisters {
                edi: 0,
                esi: 0,
                ebp: 0,
                esp: 0,
                ebx: 0,
                edx: 0,
                ecx: 0,
                eax: 0,
            },
            segments: SegmentRegisters {
                gs: 0,
                fs: 0,
                es: 0,
                ds: 0,
            },
            eip: 0,
            cs: 0,
            eflags: EFlags::RESERVED,
            esp: 0,
            ss: 0,
            space: SpaceId::KERNEL,
            kernel_stack: 0,
        },
        pages: [None; PROCESS_PAGE_COUNT_MAX],
    };

    /// Process id.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Name up to the first NUL.
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(PROCESS_NAME_MAX);
        core::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Registers saved at the last switch away.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub(crate) fn set_state(&mut self, state: ProcessState) {
        self.state = state;
    }

    /// Address space the process owns.
    pub fn space(&self) -> SpaceId {
        self.context.space
    }

    /// Virtual pages claimed by the process, stack included.
    pub fn pages(&self) -> impl Iterator<Item = Page> + '_ {
        self.pages.iter().flatten().copied()
    }

    /// Whether the slot holds a live process.
    pub fn is_active(&self) -> bool {
        self.state != ProcessState::Inactive
    }
}

/// Placement of the per-slot ring-0 stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStacks {
    base: u32,
    size: u32,
}

impl KernelStacks {
    /// `PROCESS_COUNT_MAX` stacks of `size` bytes laid out from `base`.
    pub const fn new(base: u32, size: u32) -> Self {
        Self { base, size }
    }

    /// Initial stack pointer for slot `slot`.
    pub const fn top(&self, slot: usize) -> u32 {
        self.base + self.size * (slot as u32 + 1)
    }
}

/// Owner of the process table.
pub struct ProcessManager {
    table: [Process; PROCESS_COUNT_MAX],
    next_pid: u32,
    stacks: KernelStacks,
}

impl ProcessManager {
    /// An empty table. Kernel stacks are placed by [`ProcessManager::set_kernel_stacks`].
    pub const fn new() -> Self {
        Self {
            table: [Process::INACTIVE; PROCESS_COUNT_MAX],
            next_pid: 1,
            stacks: KernelStacks::new(0, 0),
        }
    }

    /// Places the ring-0 stacks handed to new processes.
    pub fn set_kernel_stacks(&mut self, stacks: KernelStacks) {
        self.stacks = stacks;
    }

    /// Loads `request.file` from `request.parent_cluster` at address
    /// `request.buf` in a new address space and queues it as Waiting.
    ///
    /// `request.buffer_size` bounds the image. The pages mapped cover the
    /// image plus one stack page; the stack pointer starts at the top of the
    /// last one. On any failure every frame and the address space are given
    /// back and the table is left as it was.
    pub fn create<D: BlockDevice, M: Mmu>(
        &mut self,
        request: &DriverRequest,
        memory: &mut MemoryManager<M>,
        fs: &mut Fat32<D>,
    ) -> KernelResult<Pid> {
        let slot = self
            .table
            .iter()
            .position(|p| !p.is_active())
            .ok_or(KernelError::ProcessTableFull)?;

        let load = request.buf;
        let size = request.buffer_size;
        let offset = load % PAGE_SIZE;
        let end = u64::from(load) + u64::from(size) + u64::from(PAGE_SIZE);
        if load >= KERNEL_VIRTUAL_BASE || end > u64::from(KERNEL_VIRTUAL_BASE) {
            return Err(KernelError::EntryPointInKernelSpace);
        }
        let needed = (u64::from(offset) + u64::from(size) + u64::from(PAGE_SIZE))
            .div_ceil(u64::from(PAGE_SIZE)) as usize;
        if needed > PROCESS_PAGE_COUNT_MAX {
            return Err(KernelError::TooLarge);
        }
        if !memory.frames().allocate_check(needed) {
            return Err(KernelError::OutOfMemory);
        }

        let space = memory.create_address_space()?;
        let first = Page::containing(load).index();
        let mut pages = [None; PROCESS_PAGE_COUNT_MAX];
        for (i, slot_page) in pages.iter_mut().enumerate().take(needed) {
            let page = Page::from_index(first + i).ok_or(KernelError::EntryPointInKernelSpace);
            let mapped = page.and_then(|page| memory.allocate_user_page(space, page).map(|_| page));
            match mapped {
                Ok(page) => *slot_page = Some(page),
                Err(e) => {
                    memory.release(space)?;
                    return Err(e);
                }
            }
        }

        let previous = memory.current_address_space();
        memory.switch_to(space)?;
        // SAFETY: [load, load + size) lies inside the pages just mapped
        // writable in `space`, which is now active. The slice is dropped
        // before switching back.
        let loaded = fs.read(&request.file, request.parent_cluster, unsafe {
            memory.mmu_mut().active_memory(load, size as usize)
        });
        memory.switch_to(previous)?;
        let image_len = match loaded {
            Ok(len) => len,
            Err(e) => {
                memory.release(space)?;
                return Err(e);
            }
        };

        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        let stack_top = Page::containing(load).start_address() + needed as u32 * PAGE_SIZE - 4;

        let process = &mut self.table[slot];
        *process = Process::INACTIVE;
        process.pid = pid;
        for (dst, src) in process.name.iter_mut().zip(request.file.name_bytes()) {
            *dst = *src;
        }
        process.state = ProcessState::Waiting;
        process.context = Context::new_user(load, stack_top, space, self.stacks.top(slot));
        process.pages = pages;

        log::info!(
            "process {} ({}) created: {} bytes, {} pages, slot {}",
            pid,
            process.name(),
            image_len,
            needed,
            slot
        );
        Ok(pid)
    }

    /// Tears down `pid`: frees its frames and address space and resets the slot.
    pub fn destroy<M: Mmu>(&mut self, pid: Pid, memory: &mut MemoryManager<M>) -> KernelResult<()> {
        let slot = self.slot_of(pid).ok_or(KernelError::NotFound)?;
        let process = self.table[slot];
        let space = process.space();
        if memory.current_address_space() == space {
            memory.switch_to(SpaceId::KERNEL)?;
        }
        for page in process.pages() {
            memory.unmap_and_free(space, page)?;
        }
        memory.release(space)?;
        self.table[slot] = Process::INACTIVE;
        log::info!("process {} ({}) destroyed", pid, process.name());
        Ok(())
    }

    /// The Running process, if any.
    pub fn current(&self) -> Option<&Process> {
        self.table.iter().find(|p| p.state == ProcessState::Running)
    }

    /// Looks up a live process by id.
    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slot_of(pid).map(|slot| &self.table[slot])
    }

    /// Table slot of a live process.
    pub fn slot_of(&self, pid: Pid) -> Option<usize> {
        self.table.iter().position(|p| p.is_active() && p.pid == pid)
    }

    /// Live processes, Waiting or Running.
    pub fn active_count(&self) -> usize {
        self.table.iter().filter(|p| p.is_active()).count()
    }

    pub(crate) fn slots(&self) -> &[Process; PROCESS_COUNT_MAX] {
        &self.table
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Process; PROCESS_COUNT_MAX] {
        &mut self.table
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ADDRESS_SPACE_COUNT_MAX, FRAME_COUNT};
    use crate::fs::Fat32;
    use crate::testutil::{MemDisk, SoftMmu};
    use ember_common::fs::{FileName, CLUSTER_BLOCK_COUNT, ROOT_CLUSTER};
    use std::boxed::Box;
    use std::vec::Vec;

    struct Rig {
        processes: ProcessManager,
        memory: Box<MemoryManager<SoftMmu>>,
        fs: Box<Fat32<MemDisk>>,
    }

    fn rig() -> Rig {
        let mut memory = Box::new(MemoryManager::new(SoftMmu::new()));
        memory.init();
        let mut fs = Box::new(Fat32::new(MemDisk::new(128 * CLUSTER_BLOCK_COUNT)));
        fs.initialize().unwrap();
        let mut processes = ProcessManager::new();
        processes.set_kernel_stacks(KernelStacks::new(0xC010_0000, 0x4000));
        Rig { processes, memory, fs }
    }

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn request(name: &str, size: u32) -> DriverRequest {
        DriverRequest {
            buf: 0,
            file: FileName::parse(name),
            parent_cluster: ROOT_CLUSTER,
            buffer_size: size,
        }
    }

    impl Rig {
        fn create(&mut self, req: &DriverRequest) -> KernelResult<Pid> {
            self.processes.create(req, &mut self.memory, &mut self.fs)
        }
    }

    #[test]
    fn test_create_loads_image() {
        let mut rig = rig();
        let data = image(9000);
        rig.fs.write(&FileName::parse("prog"), ROOT_CLUSTER, &data).unwrap();

        let pid = rig.create(&request("prog", 9000)).unwrap();
        let process = rig.processes.get(pid).unwrap();
        assert_eq!(process.state(), ProcessState::Waiting);
        assert_eq!(process.name(), "prog");
        assert_eq!(process.pages().count(), 2);
        assert_eq!(process.context().eip, 0);
        assert_eq!(process.context().esp, 2 * PAGE_SIZE - 4);
        assert_eq!(process.context().eflags.bits(), 0x202);
        assert_eq!(process.context().kernel_stack, 0xC010_4000);
        assert_eq!(rig.memory.current_address_space(), SpaceId::KERNEL);

        let frame = rig
            .memory
            .directory(process.space())
            .unwrap()
            .entry(Page::containing(0))
            .frame()
            .unwrap();
        let bytes = rig.memory.mmu().frame_bytes(frame.index()).unwrap();
        assert_eq!(&bytes[..9000], &data[..]);
        assert_eq!(rig.memory.frames().free_count(), FRAME_COUNT - 3);
    }

    #[test]
    fn test_pids_are_unique_and_not_reused() {
        let mut rig = rig();
        rig.fs.write(&FileName::parse("p"), ROOT_CLUSTER, b"x").unwrap();
        let a = rig.create(&request("p", 16)).unwrap();
        rig.processes.destroy(a, &mut rig.memory).unwrap();
        let b = rig.create(&request("p", 16)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_kernel_space_load_address_rejected() {
        let mut rig = rig();
        let mut req = request("p", 16);
        req.buf = KERNEL_VIRTUAL_BASE;
        assert_eq!(rig.create(&req), Err(KernelError::EntryPointInKernelSpace));

        req.buf = KERNEL_VIRTUAL_BASE - PAGE_SIZE;
        assert_eq!(rig.create(&req), Err(KernelError::EntryPointInKernelSpace));
    }

    #[test]
    fn test_page_budget() {
        let mut rig = rig();
        let req = request("p", PAGE_SIZE * PROCESS_PAGE_COUNT_MAX as u32);
        assert_eq!(rig.create(&req), Err(KernelError::TooLarge));
    }

    #[test]
    fn test_not_enough_frames_leaves_state_unchanged() {
        let mut rig = rig();
        rig.fs.write(&FileName::parse("p"), ROOT_CLUSTER, &image(9000)).unwrap();
        let space = rig.memory.create_address_space().unwrap();
        while rig.memory.frames().free_count() > 1 {
            let index = rig.memory.frames().used_count() + 1;
            rig.memory
                .allocate_user_page(space, Page::containing(index as u32 * PAGE_SIZE))
                .unwrap();
        }
        let spaces = rig.memory.free_space_count();

        assert_eq!(rig.create(&request("p", 9000)), Err(KernelError::OutOfMemory));
        assert_eq!(rig.memory.frames().free_count(), 1);
        assert_eq!(rig.memory.free_space_count(), spaces);
        assert_eq!(rig.processes.active_count(), 0);
    }

    #[test]
    fn test_address_space_pool_exhausted() {
        let mut rig = rig();
        rig.fs.write(&FileName::parse("p"), ROOT_CLUSTER, b"x").unwrap();
        for _ in 0..ADDRESS_SPACE_COUNT_MAX {
            rig.memory.create_address_space().unwrap();
        }
        let frames = rig.memory.frames().free_count();

        assert_eq!(
            rig.create(&request("p", 16)),
            Err(KernelError::AddressSpacePoolExhausted)
        );
        assert_eq!(rig.memory.frames().free_count(), frames);
        assert_eq!(rig.memory.free_space_count(), 0);
        assert_eq!(rig.processes.active_count(), 0);
        assert_eq!(rig.memory.current_address_space(), SpaceId::KERNEL);
    }

    #[test]
    fn test_missing_image_rolls_back() {
        let mut rig = rig();
        assert_eq!(rig.create(&request("ghost", 100)), Err(KernelError::NotFound));
        assert_eq!(rig.memory.frames().free_count(), FRAME_COUNT - 1);
        assert_eq!(rig.memory.free_space_count(), ADDRESS_SPACE_COUNT_MAX);
        assert_eq!(rig.processes.active_count(), 0);
    }

    #[test]
    fn test_image_larger_than_buffer_rolls_back() {
        let mut rig = rig();
        rig.fs.write(&FileName::parse("p"), ROOT_CLUSTER, &image(300)).unwrap();
        assert_eq!(rig.create(&request("p", 200)), Err(KernelError::BufferTooSmall));
        assert_eq!(rig.memory.frames().free_count(), FRAME_COUNT - 1);
    }

    #[test]
    fn test_process_table_full() {
        let mut rig = rig();
        for process in rig.processes.slots_mut() {
            process.set_state(ProcessState::Waiting);
        }
        assert_eq!(rig.create(&request("p", 1)), Err(KernelError::ProcessTableFull));
    }

    #[test]
    fn test_destroy_reclaims_everything() {
        let mut rig = rig();
        rig.fs.write(&FileName::parse("p"), ROOT_CLUSTER, &image(64)).unwrap();
        let pid = rig.create(&request("p", 64)).unwrap();
        let space = rig.processes.get(pid).unwrap().space();
        rig.memory.switch_to(space).unwrap();

        rig.processes.destroy(pid, &mut rig.memory).unwrap();
        assert_eq!(rig.memory.current_address_space(), SpaceId::KERNEL);
        assert_eq!(rig.memory.frames().free_count(), FRAME_COUNT - 1);
        assert_eq!(rig.memory.free_space_count(), ADDRESS_SPACE_COUNT_MAX);
        assert!(rig.processes.get(pid).is_none());
        assert_eq!(rig.processes.destroy(pid, &mut rig.memory), Err(KernelError::NotFound));
    }

    #[test]
    fn test_current_process() {
        let mut rig = rig();
        assert!(rig.processes.current().is_none());
        rig.fs.write(&FileName::parse("p"), ROOT_CLUSTER, b"x").unwrap();
        let pid = rig.create(&request("p", 16)).unwrap();
        let slot = rig.processes.slot_of(pid).unwrap();
        rig.processes.slots_mut()[slot].set_state(ProcessState::Running);
        assert_eq!(rig.processes.current().map(Process::pid), Some(pid));
    }
}
