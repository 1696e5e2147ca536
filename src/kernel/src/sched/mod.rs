//! Preemptive round-robin scheduler.
//!
//! Driven only by the timer tick. The cursor remembers the last dispatched
//! slot and the search for the next Waiting process starts just after it,
//! so every runnable process gets a turn before any gets a second one.

use crate::config::PROCESS_COUNT_MAX;
use crate::process::{Pid, ProcessManager, ProcessState, TrapFrame};

/// Round-robin cursor over the process table.
pub struct Scheduler {
    last: usize,
}

impl Scheduler {
    /// A scheduler that starts its scan at slot 0.
    pub const fn new() -> Self {
        Self {
            last: PROCESS_COUNT_MAX - 1,
        }
    }

    /// Stores the interrupted state into the Running process and marks it Waiting.
    ///
    /// Returns `None` when nothing was running.
    pub fn save_context(&mut self, processes: &mut ProcessManager, frame: &TrapFrame) -> Option<Pid> {
        let process = processes
            .slots_mut()
            .iter_mut()
            .find(|p| p.state() == ProcessState::Running)?;
        process.context_mut().capture(frame);
        process.set_state(ProcessState::Waiting);
        Some(process.pid())
    }

    /// Picks the next Waiting slot after the cursor, wrapping, and marks it Running.
    pub fn select_next(&mut self, processes: &mut ProcessManager) -> Option<usize> {
        let slot = (1..=PROCESS_COUNT_MAX)
            .map(|step| (self.last + step) % PROCESS_COUNT_MAX)
            .find(|&slot| processes.slots()[slot].state() == ProcessState::Waiting)?;
        processes.slots_mut()[slot].set_state(ProcessState::Running);
        self.last = slot;
        log::trace!("dispatch slot {} (pid {})", slot, processes.slots()[slot].pid());
        Some(slot)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn waiting(slots: &[usize]) -> ProcessManager {
        let mut processes = ProcessManager::new();
        for &slot in slots {
            processes.slots_mut()[slot].set_state(ProcessState::Waiting);
        }
        processes
    }

    /// One tick: whoever runs goes back to Waiting, the next one runs.
    fn tick(scheduler: &mut Scheduler, processes: &mut ProcessManager) -> Option<usize> {
        scheduler.save_context(processes, &TrapFrame::default());
        scheduler.select_next(processes)
    }

    #[test]
    fn test_round_robin_visits_all_before_repeating() {
        let mut processes = waiting(&[1, 4, 9]);
        let mut scheduler = Scheduler::new();
        let order: Vec<_> = (0..6).map(|_| tick(&mut scheduler, &mut processes).unwrap()).collect();
        assert_eq!(order, [1, 4, 9, 1, 4, 9]);
    }

    #[test]
    fn test_single_process_reselected() {
        let mut processes = waiting(&[3]);
        let mut scheduler = Scheduler::new();
        assert_eq!(tick(&mut scheduler, &mut processes), Some(3));
        assert_eq!(tick(&mut scheduler, &mut processes), Some(3));
        assert_eq!(processes.slots()[3].state(), ProcessState::Running);
    }

    #[test]
    fn test_at_most_one_running() {
        let mut processes = waiting(&[0, 1, 2, 15]);
        let mut scheduler = Scheduler::new();
        for _ in 0..10 {
            tick(&mut scheduler, &mut processes);
            let running = processes
                .slots()
                .iter()
                .filter(|p| p.state() == ProcessState::Running)
                .count();
            assert_eq!(running, 1);
        }
    }

    #[test]
    fn test_nothing_to_run() {
        let mut processes = ProcessManager::new();
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.save_context(&mut processes, &TrapFrame::default()), None);
        assert_eq!(scheduler.select_next(&mut processes), None);
    }

    #[test]
    fn test_save_captures_frame() {
        let mut processes = waiting(&[2]);
        let mut scheduler = Scheduler::new();
        scheduler.select_next(&mut processes);
        let frame = TrapFrame {
            eip: 0x40,
            user_esp: 0x7000,
            ..TrapFrame::default()
        };
        scheduler.save_context(&mut processes, &frame);
        let process = &processes.slots()[2];
        assert_eq!(process.state(), ProcessState::Waiting);
        assert_eq!((process.context().eip, process.context().esp), (0x40, 0x7000));
    }
}
