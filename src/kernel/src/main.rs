//! Ember Kernel Entry Point
//!
//! `_ember_start` in `arch::x86::boot` enables paging and calls
//! [`kernel_entry`] in the higher half. Interrupts stay off until the first
//! process is entered.

#![no_std]
#![no_main]

use core::panic::PanicInfo;
use ember_common::fs::{DriverRequest, FileName, ROOT_CLUSTER};
use ember_hal::Rtc;
use ember_kernel::arch::x86::boot::MULTIBOOT_BOOTLOADER_MAGIC;
use ember_kernel::arch::x86::cmos::Cmos;
use ember_kernel::arch::x86::pic::PIT;
use ember_kernel::arch::x86::vga::{self, Color};
use ember_kernel::arch::x86::{self, gdt, interrupts, serial, switch, AtaDrive, BootDisk};
use ember_kernel::arch::x86::{CLOCK, KERNEL};
use ember_kernel::boot::{self, Status};
use ember_kernel::config::{INITIAL_PROCESS, INITIAL_PROCESS_CAPACITY};
use ember_kernel::fs::Mount;
use ember_kernel::{println, serial_println};

/// Kernel entry point, called from the boot stub on the boot stack.
#[no_mangle]
pub extern "C" fn kernel_entry(magic: u32, _multiboot_info: u32) -> ! {
    // ========================================================================
    // Phase 1: Console and CPU tables
    // ========================================================================
    serial::init_logger();
    vga::clear_screen();
    boot::banner::print_banner();

    if magic == MULTIBOOT_BOOTLOADER_MAGIC {
        boot::log(Status::Ok, "Multiboot handoff");
    } else {
        boot::log(Status::Warn, "Not started by a multiboot loader");
        boot::log_detail(format_args!("magic {:#010x}", magic));
    }
    boot::log(Status::Ok, "Serial log on COM1");

    gdt::init();
    boot::log(Status::Ok, "GDT and TSS loaded");
    interrupts::init_idt();
    boot::log(Status::Ok, "IDT configured, PICs remapped");

    // ========================================================================
    // Phase 2: Memory and storage
    // ========================================================================
    let disk = match AtaDrive::probe() {
        Some(drive) => {
            boot::log(Status::Ok, "ATA disk on the primary channel");
            BootDisk::Ata(drive)
        }
        None => match x86::take_ram_disk() {
            Some(ram) => {
                boot::log(Status::Warn, "No ATA disk, using a RAM disk");
                BootDisk::Ram(ram)
            }
            None => BootDisk::Detached,
        },
    };

    let mounted = {
        let mut kernel = KERNEL.lock();
        kernel.attach_device(disk);
        kernel.boot(x86::kernel_stacks())
    };
    boot::log(Status::Ok, "Kernel address space active");
    match mounted {
        Ok(Mount::Formatted) => boot::log(Status::Info, "Blank disk formatted"),
        Ok(Mount::Loaded) => boot::log(Status::Ok, "Filesystem mounted"),
        Err(e) => {
            boot::log(Status::Fail, "Filesystem unavailable");
            boot::log_detail(format_args!("{}", e));
        }
    }
    {
        let mut kernel = KERNEL.lock();
        let frames = kernel.memory().frames().free_count();
        let clusters = kernel.fs().free_clusters();
        boot::log_detail(format_args!("{} free frames, {} free clusters", frames, clusters));
    }

    #[cfg(feature = "self_test")]
    match ember_kernel::selftest::run_all(&mut KERNEL.lock()) {
        Ok(()) => boot::log(Status::Ok, "Self tests passed"),
        Err(e) => {
            boot::log(Status::Fail, "Self tests failed");
            boot::log_detail(format_args!("{}", e));
        }
    }

    // ========================================================================
    // Phase 3: Devices and the first process
    // ========================================================================
    Cmos::init();
    let now = Cmos.now();
    CLOCK.lock().update(now);
    let hms = now.format_hms();
    boot::log(Status::Ok, "Real-time clock");
    boot::log_detail(format_args!("{}", core::str::from_utf8(&hms).unwrap_or("??:??:??")));

    PIT.start();
    boot::log(Status::Ok, "Timer started");

    let request = DriverRequest {
        buf: 0,
        file: FileName::parse(INITIAL_PROCESS),
        parent_cluster: ROOT_CLUSTER,
        buffer_size: INITIAL_PROCESS_CAPACITY,
    };
    let first = {
        let mut kernel = KERNEL.lock();
        kernel
            .create_process(&request)
            .map(|pid| (pid, kernel.dispatch_next()))
    };
    match first {
        Ok((pid, Some(context))) => {
            boot::log(Status::Ok, "Starting the shell");
            boot::log_detail(format_args!("pid {}, entry {:#010x}", pid, context.eip));
            switch::enter_user(&context)
        }
        Ok((_, None)) => boot::log(Status::Fail, "Shell created but not runnable"),
        Err(e) => {
            boot::log(Status::Fail, "Cannot start the shell");
            boot::log_detail(format_args!("{}: {}", INITIAL_PROCESS, e));
        }
    }
    x86::halt_loop()
}

/// Panic handler.
///
/// Called when the kernel encounters an unrecoverable error.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86::cli();
    serial_println!("KERNEL PANIC: {}", info);

    vga::set_color(Color::LightRed, Color::Black);
    println!("\n\n!!! KERNEL PANIC !!!");
    vga::set_color(Color::White, Color::Black);
    println!("{}", info);

    loop {
        x86::hlt();
    }
}
