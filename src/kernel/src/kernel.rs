//! The kernel core: memory, storage, processes and the scheduler behind one owner.
//!
//! The i686 glue keeps a single instance in a spin lock and only touches it
//! with interrupts disabled.

use crate::config::KERNEL_VIRTUAL_BASE;
use crate::fs::{Fat32, Mount};
use crate::memory::{MemoryManager, Mmu, SpaceId};
use crate::process::{Context, KernelStacks, Pid, Process, ProcessManager, TrapFrame};
use crate::sched::Scheduler;
use ember_common::fs::DriverRequest;
use ember_common::{KernelError, KernelResult};
use ember_hal::BlockDevice;

/// What the timer handler should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Return to the interrupted code unchanged.
    Kernel,
    /// Resume this process instead.
    Resume(Context),
}

/// Memory, storage, the process table and the scheduler.
pub struct Kernel<D, M> {
    memory: MemoryManager<M>,
    fs: Fat32<D>,
    processes: ProcessManager,
    scheduler: Scheduler,
}

impl<D: BlockDevice, M: Mmu> Kernel<D, M> {
    /// An unbooted kernel; nothing touches the hardware until [`Kernel::boot`].
    pub const fn new(device: D, mmu: M) -> Self {
        Self {
            memory: MemoryManager::new(mmu),
            fs: Fat32::new(device),
            processes: ProcessManager::new(),
            scheduler: Scheduler::new(),
        }
    }

    /// Activates the kernel address space and mounts the filesystem.
    pub fn boot(&mut self, stacks: KernelStacks) -> KernelResult<Mount> {
        self.memory.init();
        self.processes.set_kernel_stacks(stacks);
        self.fs.initialize()
    }

    /// Replaces the block device the filesystem runs on.
    pub fn attach_device(&mut self, device: D) {
        self.fs.attach(device);
    }

    /// Loads `request.file` into a new process and queues it as Waiting.
    pub fn create_process(&mut self, request: &DriverRequest) -> KernelResult<Pid> {
        self.processes.create(request, &mut self.memory, &mut self.fs)
    }

    /// Tears down `pid` and reclaims its frames and address space.
    pub fn destroy_process(&mut self, pid: Pid) -> KernelResult<()> {
        self.processes.destroy(pid, &mut self.memory)
    }

    /// Destroys the Running process.
    pub fn exit_current(&mut self) -> KernelResult<Pid> {
        let pid = self.current_process().ok_or(KernelError::NotFound)?.pid();
        self.destroy_process(pid)?;
        Ok(pid)
    }

    /// The Running process, if any.
    pub fn current_process(&self) -> Option<&Process> {
        self.processes.current()
    }

    /// Timer interrupt entry.
    ///
    /// Kernel code is never preempted: if the tick interrupted an address at
    /// or above the kernel base, or nothing is running, the interrupted code
    /// simply continues.
    pub fn on_timer_tick(&mut self, frame: &TrapFrame) -> Tick {
        if frame.eip >= KERNEL_VIRTUAL_BASE {
            return Tick::Kernel;
        }
        if self.scheduler.save_context(&mut self.processes, frame).is_none() {
            return Tick::Kernel;
        }
        match self.dispatch_next() {
            Some(context) => Tick::Resume(context),
            None => Tick::Kernel,
        }
    }

    /// Selects the next Waiting process, switches to its address space and
    /// returns the context to resume. Used at boot, on every tick and after
    /// the running process goes away.
    pub fn dispatch_next(&mut self) -> Option<Context> {
        let slot = self.scheduler.select_next(&mut self.processes)?;
        let context = *self.processes.slots()[slot].context();
        if let Err(e) = self.memory.switch_to(context.space) {
            log::error!("cannot switch to address space {}: {}", context.space.index(), e);
            self.memory.switch_to(SpaceId::KERNEL).ok()?;
            return None;
        }
        Some(context)
    }

    /// The mounted filesystem.
    pub fn fs(&mut self) -> &mut Fat32<D> {
        &mut self.fs
    }

    /// Frame and address-space state.
    pub fn memory(&self) -> &MemoryManager<M> {
        &self.memory
    }

    /// The process table.
    pub fn processes(&self) -> &ProcessManager {
        &self.processes
    }
}
