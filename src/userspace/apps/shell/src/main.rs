//! First user program: starts the clock, then echoes keystrokes.

#![no_std]
#![no_main]

use ember_sdk::fs::{CLUSTER_SIZE, ROOT_CLUSTER};
use ember_sdk::{
    create_process, get_key, keyboard_activate, put_char, puts, DriverRequest, FileName,
};

const TEXT: u8 = 0x07;
const ERROR: u8 = 0x0C;
const CLOCK_CAPACITY: u32 = 4 * CLUSTER_SIZE as u32;

#[no_mangle]
#[link_section = ".text.entry"]
pub extern "C" fn _start() -> ! {
    puts(b"ember shell\n", TEXT);

    let clock = DriverRequest {
        buf: 0,
        file: FileName::parse("clock"),
        parent_cluster: ROOT_CLUSTER,
        buffer_size: CLOCK_CAPACITY,
    };
    if create_process(&clock).is_err() {
        puts(b"cannot start clock\n", ERROR);
    }

    keyboard_activate();
    loop {
        if let Some(key) = get_key() {
            put_char(key, TEXT);
        }
    }
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    ember_sdk::exit()
}
