//! System call routing.
//!
//! The interrupt glue hands over the caller's registers; this module decodes
//! them into a [`Syscall`], checks every user pointer against the caller's
//! address space and runs the matching kernel operation. Results travel back
//! as a status code (see [`ember_common::error`]) in `eax` and, for calls
//! that take one, through a caller-supplied status pointer.

use crate::drivers::KeyboardBuffer;
use crate::kernel::Kernel;
use crate::memory::{MemoryManager, Mmu};
use crate::process::{GeneralRegisters, Pid, Process};
use ember_common::error::{status_of, STATUS_SUCCESS};
use ember_common::fs::DriverRequest;
use ember_common::syscall::{SyscallNumber, SCREEN_COLUMNS, SCREEN_ROWS};
use ember_common::time::RtcTime;
use ember_common::{KernelError, KernelResult};
use ember_hal::{BlockDevice, Console, Rtc};

const SCREEN_CELLS: usize = (SCREEN_COLUMNS * SCREEN_ROWS) as usize;

/// A decoded system call with its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    ReadFile { request: u32, status: u32 },
    ReadDirectory { request: u32, status: u32 },
    WriteFile { request: u32, status: u32 },
    Delete { request: u32, status: u32 },
    GetKey { out: u32 },
    PutChar { ch: u32, color: u8 },
    Puts { buf: u32, count: u32, color: u8 },
    KeyboardActivate,
    CreateProcess { request: u32, status: u32 },
    DestroyProcess { pid: Pid, status: u32 },
    Exit,
    PutsAt { buf: u32, color: u8, cell: u32 },
    ReadClock { out: u32 },
    KeyboardDeactivate,
}

impl Syscall {
    /// Decodes `eax` as the call number and `ebx`, `ecx`, `edx` as arguments.
    pub fn decode(eax: u32, ebx: u32, ecx: u32, edx: u32) -> KernelResult<Self> {
        Ok(match SyscallNumber::try_from(eax)? {
            SyscallNumber::ReadFile => Syscall::ReadFile { request: ebx, status: ecx },
            SyscallNumber::ReadDirectory => Syscall::ReadDirectory { request: ebx, status: ecx },
            SyscallNumber::WriteFile => Syscall::WriteFile { request: ebx, status: ecx },
            SyscallNumber::Delete => Syscall::Delete { request: ebx, status: ecx },
            SyscallNumber::GetKey => Syscall::GetKey { out: ebx },
            SyscallNumber::PutChar => Syscall::PutChar { ch: ebx, color: ecx as u8 },
            SyscallNumber::Puts => Syscall::Puts {
                buf: ebx,
                count: ecx,
                color: edx as u8,
            },
            SyscallNumber::KeyboardActivate => Syscall::KeyboardActivate,
            SyscallNumber::CreateProcess => Syscall::CreateProcess { request: ebx, status: ecx },
            SyscallNumber::DestroyProcess => Syscall::DestroyProcess {
                pid: Pid::new(ebx),
                status: ecx,
            },
            SyscallNumber::Exit => Syscall::Exit,
            SyscallNumber::PutsAt => Syscall::PutsAt {
                buf: ebx,
                color: ecx as u8,
                cell: edx,
            },
            SyscallNumber::ReadClock => Syscall::ReadClock { out: ebx },
            SyscallNumber::KeyboardDeactivate => Syscall::KeyboardDeactivate,
        })
    }
}

/// Access to the memory of the calling process.
///
/// Addresses have already been checked against the caller's page directory
/// when this is called.
pub trait UserMemory {
    fn bytes(&mut self, address: u32, len: usize) -> KernelResult<&mut [u8]>;
}

/// Character devices the calls reach.
pub struct Devices<'a> {
    pub console: &'a mut dyn Console,
    pub rtc: &'a mut dyn Rtc,
    pub keyboard: &'a mut KeyboardBuffer,
}

/// What the interrupt glue does once a call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// Resume the caller with this value in `eax`.
    Continue(i32),
    /// The caller no longer exists; pick another process.
    Reschedule,
}

/// Decodes the caller's registers and runs the call.
pub fn handle<D: BlockDevice, M: Mmu>(
    kernel: &mut Kernel<D, M>,
    devices: &mut Devices<'_>,
    user: &mut dyn UserMemory,
    registers: &GeneralRegisters,
) -> SyscallOutcome {
    match Syscall::decode(registers.eax, registers.ebx, registers.ecx, registers.edx) {
        Ok(call) => dispatch(kernel, devices, user, call),
        Err(e) => {
            log::warn!("syscall {:#x}: {}", registers.eax, e);
            SyscallOutcome::Continue(e.status())
        }
    }
}

/// Runs one decoded call on behalf of the current process.
pub fn dispatch<D: BlockDevice, M: Mmu>(
    kernel: &mut Kernel<D, M>,
    devices: &mut Devices<'_>,
    user: &mut dyn UserMemory,
    call: Syscall,
) -> SyscallOutcome {
    log::trace!("syscall {:?}", call);
    let result = match call {
        Syscall::ReadFile { request, status } => {
            let result = read_file(kernel, user, request);
            return report(kernel, user, status, result);
        }
        Syscall::ReadDirectory { request, status } => {
            let result = read_directory(kernel, user, request);
            return report(kernel, user, status, result);
        }
        Syscall::WriteFile { request, status } => {
            let result = write_file(kernel, user, request);
            return report(kernel, user, status, result);
        }
        Syscall::Delete { request, status } => {
            let result = read_request(kernel.memory(), user, request)
                .and_then(|req| kernel.fs().delete(&req.file, req.parent_cluster));
            return report(kernel, user, status, result);
        }
        Syscall::CreateProcess { request, status } => {
            let result = read_request(kernel.memory(), user, request)
                .and_then(|req| kernel.create_process(&req))
                .map(drop);
            return report(kernel, user, status, result);
        }
        Syscall::DestroyProcess { pid, status } => {
            let caller = kernel.current_process().map(Process::pid);
            let result = kernel.destroy_process(pid);
            if result.is_ok() && caller == Some(pid) {
                return SyscallOutcome::Reschedule;
            }
            return report(kernel, user, status, result);
        }
        Syscall::Exit => match kernel.exit_current() {
            Ok(_) => return SyscallOutcome::Reschedule,
            Err(e) => Err(e),
        },
        Syscall::GetKey { out } => {
            let key = devices.keyboard.take().unwrap_or(0);
            user_bytes(kernel.memory(), user, out, 1).map(|b| b[0] = key)
        }
        Syscall::PutChar { ch, color } => user_bytes(kernel.memory(), user, ch, 1)
            .map(|b| devices.console.put_char(b[0], color)),
        Syscall::Puts { buf, count, color } => {
            user_bytes(kernel.memory(), user, buf, count as usize)
                .map(|b| devices.console.write_bytes(b, color))
        }
        Syscall::PutsAt { buf, color, cell } => puts_at(kernel.memory(), devices, user, buf, color, cell),
        Syscall::ReadClock { out } => {
            let time = devices.rtc.now();
            user_bytes(kernel.memory(), user, out, RtcTime::ENCODED_LEN)
                .map(|b| b.copy_from_slice(&time.to_bytes()))
        }
        Syscall::KeyboardActivate => {
            devices.keyboard.activate();
            Ok(())
        }
        Syscall::KeyboardDeactivate => {
            devices.keyboard.deactivate();
            Ok(())
        }
    };
    if let Err(e) = result {
        log::warn!("{:?} failed: {}", call, e);
    }
    SyscallOutcome::Continue(status_of(&result))
}

fn read_file<D: BlockDevice, M: Mmu>(
    kernel: &mut Kernel<D, M>,
    user: &mut dyn UserMemory,
    request: u32,
) -> KernelResult<()> {
    let req = read_request(kernel.memory(), user, request)?;
    let dest = user_bytes(kernel.memory(), user, req.buf, req.buffer_size as usize)?;
    kernel.fs().read(&req.file, req.parent_cluster, dest).map(drop)
}

fn read_directory<D: BlockDevice, M: Mmu>(
    kernel: &mut Kernel<D, M>,
    user: &mut dyn UserMemory,
    request: u32,
) -> KernelResult<()> {
    let req = read_request(kernel.memory(), user, request)?;
    let dest = user_bytes(kernel.memory(), user, req.buf, req.buffer_size as usize)?;
    kernel.fs().read_directory(&req.file, req.parent_cluster, dest)
}

/// A zero `buffer_size` creates a directory.
fn write_file<D: BlockDevice, M: Mmu>(
    kernel: &mut Kernel<D, M>,
    user: &mut dyn UserMemory,
    request: u32,
) -> KernelResult<()> {
    let req = read_request(kernel.memory(), user, request)?;
    let data: &[u8] = if req.buffer_size == 0 {
        &[]
    } else {
        user_bytes(kernel.memory(), user, req.buf, req.buffer_size as usize)?
    };
    kernel.fs().write(&req.file, req.parent_cluster, data).map(drop)
}

fn puts_at<M: Mmu>(
    memory: &MemoryManager<M>,
    devices: &mut Devices<'_>,
    user: &mut dyn UserMemory,
    buf: u32,
    color: u8,
    cell: u32,
) -> KernelResult<()> {
    let cell = cell as usize;
    if cell >= SCREEN_CELLS {
        return Err(KernelError::InvalidAddress);
    }
    let mut text = [0u8; SCREEN_CELLS];
    let mut len = 0;
    while len < SCREEN_CELLS - cell {
        let address = buf.checked_add(len as u32).ok_or(KernelError::InvalidAddress)?;
        let byte = user_bytes(memory, user, address, 1)?[0];
        if byte == 0 {
            break;
        }
        text[len] = byte;
        len += 1;
    }
    devices.console.write_at(&text[..len], color, cell);
    Ok(())
}

/// Writes the status back (unless `status` is null) and returns it in `eax`.
fn report<D: BlockDevice, M: Mmu, T>(
    kernel: &Kernel<D, M>,
    user: &mut dyn UserMemory,
    status: u32,
    result: KernelResult<T>,
) -> SyscallOutcome {
    if let Err(e) = &result {
        log::warn!("syscall failed: {}", e);
    }
    let code = status_of(&result);
    if status != 0 {
        match user_bytes(kernel.memory(), user, status, 4) {
            Ok(bytes) => bytes.copy_from_slice(&code.to_le_bytes()),
            Err(e) => log::warn!("status pointer {:#x}: {}", status, e),
        }
    }
    SyscallOutcome::Continue(code)
}

fn read_request<M: Mmu>(
    memory: &MemoryManager<M>,
    user: &mut dyn UserMemory,
    address: u32,
) -> KernelResult<DriverRequest> {
    let bytes = user_bytes(memory, user, address, DriverRequest::ENCODED_LEN)?;
    let record: &[u8; DriverRequest::ENCODED_LEN] =
        (&*bytes).try_into().map_err(|_| KernelError::InvalidAddress)?;
    Ok(DriverRequest::decode(record))
}

fn user_bytes<'u, M: Mmu>(
    memory: &MemoryManager<M>,
    user: &'u mut dyn UserMemory,
    address: u32,
    len: usize,
) -> KernelResult<&'u mut [u8]> {
    if !memory.is_user_range(memory.current_address_space(), address, len) {
        return Err(KernelError::InvalidAddress);
    }
    user.bytes(address, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KERNEL_VIRTUAL_BASE;
    use crate::testutil::{booted_kernel, FixedRtc, FlatUserMemory, MemDisk, ScriptedConsole, SoftMmu};
    use ember_common::fs::{FileName, CLUSTER_SIZE, ROOT_CLUSTER};

    const REQUEST: u32 = 0x100;
    const STATUS: u32 = 0x200;
    const DATA: u32 = 0x1000;

    struct Rig {
        kernel: Box<Kernel<MemDisk, SoftMmu>>,
        console: ScriptedConsole,
        rtc: FixedRtc,
        keyboard: KeyboardBuffer,
        user: FlatUserMemory,
        pid: Pid,
    }

    impl Rig {
        fn new() -> Self {
            let mut kernel = booted_kernel();
            let file = FileName::parse("init");
            kernel.fs().write(&file, ROOT_CLUSTER, b"\xEB\xFE").unwrap();
            let pid = kernel
                .create_process(&DriverRequest {
                    buf: 0,
                    file,
                    parent_cluster: ROOT_CLUSTER,
                    buffer_size: 16,
                })
                .unwrap();
            kernel.dispatch_next().unwrap();
            Self {
                kernel,
                console: ScriptedConsole::default(),
                rtc: FixedRtc(RtcTime {
                    hour: 13,
                    minute: 5,
                    second: 59,
                    ..RtcTime::default()
                }),
                keyboard: KeyboardBuffer::new(),
                user: FlatUserMemory::new(4 * CLUSTER_SIZE + DATA as usize),
                pid,
            }
        }

        fn call(&mut self, call: Syscall) -> SyscallOutcome {
            let mut devices = Devices {
                console: &mut self.console,
                rtc: &mut self.rtc,
                keyboard: &mut self.keyboard,
            };
            dispatch(&mut self.kernel, &mut devices, &mut self.user, call)
        }

        fn put_request(&mut self, name: &str, buf: u32, buffer_size: u32) {
            let request = DriverRequest {
                buf,
                file: FileName::parse(name),
                parent_cluster: ROOT_CLUSTER,
                buffer_size,
            };
            let at = REQUEST as usize;
            self.user.0[at..at + DriverRequest::ENCODED_LEN].copy_from_slice(&request.encode());
        }

        fn put_bytes(&mut self, address: u32, bytes: &[u8]) {
            let at = address as usize;
            self.user.0[at..at + bytes.len()].copy_from_slice(bytes);
        }
    }

    #[test]
    fn test_decode() {
        assert_eq!(
            Syscall::decode(6, 0x10, 5, 0x0F),
            Ok(Syscall::Puts {
                buf: 0x10,
                count: 5,
                color: 0x0F
            })
        );
        assert_eq!(
            Syscall::decode(9, 3, 0, 0),
            Ok(Syscall::DestroyProcess {
                pid: Pid::new(3),
                status: 0
            })
        );
        assert_eq!(Syscall::decode(14, 0, 0, 0), Err(KernelError::UnknownSyscall));
    }

    #[test]
    fn test_write_then_read_file() {
        let mut rig = Rig::new();
        rig.put_bytes(DATA, b"hello, disk");
        rig.put_request("notes.txt", DATA, 11);
        let outcome = rig.call(Syscall::WriteFile {
            request: REQUEST,
            status: STATUS,
        });
        assert_eq!(outcome, SyscallOutcome::Continue(STATUS_SUCCESS));
        assert_eq!(rig.user.read_i32(STATUS), STATUS_SUCCESS);

        rig.put_bytes(DATA, &[0; 11]);
        rig.put_request("notes.txt", DATA, 64);
        rig.call(Syscall::ReadFile {
            request: REQUEST,
            status: STATUS,
        });
        assert_eq!(rig.user.read_i32(STATUS), STATUS_SUCCESS);
        assert_eq!(&rig.user.0[DATA as usize..DATA as usize + 11], b"hello, disk");
    }

    #[test]
    fn test_zero_size_write_creates_directory() {
        let mut rig = Rig::new();
        rig.put_request("docs", 0, 0);
        rig.call(Syscall::WriteFile {
            request: REQUEST,
            status: STATUS,
        });
        assert_eq!(rig.user.read_i32(STATUS), STATUS_SUCCESS);

        rig.put_request("docs", DATA, CLUSTER_SIZE as u32);
        rig.call(Syscall::ReadDirectory {
            request: REQUEST,
            status: STATUS,
        });
        assert_eq!(rig.user.read_i32(STATUS), STATUS_SUCCESS);

        rig.call(Syscall::Delete {
            request: REQUEST,
            status: STATUS,
        });
        assert_eq!(rig.user.read_i32(STATUS), STATUS_SUCCESS);
        rig.call(Syscall::Delete {
            request: REQUEST,
            status: STATUS,
        });
        assert_eq!(rig.user.read_i32(STATUS), KernelError::NotFound.status());
    }

    #[test]
    fn test_errors_reported_through_status() {
        let mut rig = Rig::new();
        rig.put_request("missing", DATA, 64);
        let outcome = rig.call(Syscall::ReadFile {
            request: REQUEST,
            status: STATUS,
        });
        let code = KernelError::NotFound.status();
        assert_eq!(outcome, SyscallOutcome::Continue(code));
        assert_eq!(rig.user.read_i32(STATUS), code);
    }

    #[test]
    fn test_null_status_pointer() {
        let mut rig = Rig::new();
        rig.put_request("missing", DATA, 64);
        let outcome = rig.call(Syscall::ReadFile {
            request: REQUEST,
            status: 0,
        });
        assert_eq!(outcome, SyscallOutcome::Continue(KernelError::NotFound.status()));
        assert_eq!(rig.user.read_i32(0), 0);
    }

    #[test]
    fn test_kernel_pointers_rejected() {
        let mut rig = Rig::new();
        let outcome = rig.call(Syscall::ReadFile {
            request: KERNEL_VIRTUAL_BASE,
            status: STATUS,
        });
        assert_eq!(outcome, SyscallOutcome::Continue(KernelError::InvalidAddress.status()));
        let outcome = rig.call(Syscall::Puts {
            buf: KERNEL_VIRTUAL_BASE - 4,
            count: 16,
            color: 7,
        });
        assert_eq!(outcome, SyscallOutcome::Continue(KernelError::InvalidAddress.status()));
        assert!(rig.console.written.is_empty());
    }

    #[test]
    fn test_console_output() {
        let mut rig = Rig::new();
        rig.put_bytes(DATA, b"hi!\0ignored");
        rig.call(Syscall::PutChar { ch: DATA, color: 2 });
        rig.call(Syscall::Puts {
            buf: DATA,
            count: 3,
            color: 4,
        });
        assert_eq!(rig.console.text(), "hhi!");
        assert_eq!(rig.console.written[0], (b'h', 2));

        rig.call(Syscall::PutsAt {
            buf: DATA,
            color: 0x1F,
            cell: 24 * 80 + 72,
        });
        assert_eq!(rig.console.placed, vec![(24 * 80 + 72, b"hi!".to_vec(), 0x1F)]);
    }

    #[test]
    fn test_puts_at_clipped_to_screen() {
        let mut rig = Rig::new();
        rig.put_bytes(DATA, b"0123456789\0");
        rig.call(Syscall::PutsAt {
            buf: DATA,
            color: 7,
            cell: SCREEN_CELLS as u32 - 4,
        });
        assert_eq!(rig.console.placed[0].1, b"0123".to_vec());

        let outcome = rig.call(Syscall::PutsAt {
            buf: DATA,
            color: 7,
            cell: SCREEN_CELLS as u32,
        });
        assert_eq!(outcome, SyscallOutcome::Continue(KernelError::InvalidAddress.status()));
    }

    #[test]
    fn test_keyboard() {
        let mut rig = Rig::new();
        rig.keyboard.push_scancode(0x1E);
        rig.call(Syscall::GetKey { out: DATA });
        assert_eq!(rig.user.0[DATA as usize], 0);

        rig.call(Syscall::KeyboardActivate);
        rig.keyboard.push_scancode(0x1E);
        rig.call(Syscall::GetKey { out: DATA });
        assert_eq!(rig.user.0[DATA as usize], b'a');

        rig.call(Syscall::KeyboardDeactivate);
        assert!(!rig.keyboard.is_active());
    }

    #[test]
    fn test_read_clock() {
        let mut rig = Rig::new();
        rig.call(Syscall::ReadClock { out: DATA });
        let at = DATA as usize;
        let bytes: [u8; 8] = rig.user.0[at..at + 8].try_into().unwrap();
        assert_eq!(&RtcTime::from_bytes(bytes).format_hms(), b"13:05:59");
    }

    #[test]
    fn test_create_and_destroy_process() {
        let mut rig = Rig::new();
        rig.put_request("init", 0, 16);
        rig.call(Syscall::CreateProcess {
            request: REQUEST,
            status: STATUS,
        });
        assert_eq!(rig.user.read_i32(STATUS), STATUS_SUCCESS);
        assert_eq!(rig.kernel.processes().active_count(), 2);

        let child = Pid::new(rig.pid.as_u32() + 1);
        let outcome = rig.call(Syscall::DestroyProcess {
            pid: child,
            status: STATUS,
        });
        assert_eq!(outcome, SyscallOutcome::Continue(STATUS_SUCCESS));
        assert_eq!(rig.kernel.processes().active_count(), 1);

        rig.call(Syscall::DestroyProcess {
            pid: child,
            status: STATUS,
        });
        assert_eq!(rig.user.read_i32(STATUS), KernelError::NotFound.status());
    }

    #[test]
    fn test_destroy_self_reschedules() {
        let mut rig = Rig::new();
        let pid = rig.pid;
        let outcome = rig.call(Syscall::DestroyProcess { pid, status: STATUS });
        assert_eq!(outcome, SyscallOutcome::Reschedule);
        assert!(rig.kernel.current_process().is_none());
    }

    #[test]
    fn test_exit() {
        let mut rig = Rig::new();
        assert_eq!(rig.call(Syscall::Exit), SyscallOutcome::Reschedule);
        assert_eq!(rig.kernel.processes().active_count(), 0);
        assert_eq!(
            rig.call(Syscall::Exit),
            SyscallOutcome::Continue(KernelError::NotFound.status())
        );
    }

    #[test]
    fn test_handle_unknown_number() {
        let mut rig = Rig::new();
        let registers = GeneralRegisters {
            eax: 99,
            ..GeneralRegisters::default()
        };
        let mut devices = Devices {
            console: &mut rig.console,
            rtc: &mut rig.rtc,
            keyboard: &mut rig.keyboard,
        };
        let outcome = handle(&mut rig.kernel, &mut devices, &mut rig.user, &registers);
        assert_eq!(outcome, SyscallOutcome::Continue(KernelError::UnknownSyscall.status()));
    }
}
