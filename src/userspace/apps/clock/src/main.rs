//! Paints the wall-clock time in the bottom-right corner, forever.

#![no_std]
#![no_main]

use ember_sdk::{puts_at, read_clock, SCREEN_COLUMNS, SCREEN_ROWS};

const COLOR: u8 = 0x1F;
/// Eight cells wide, right-aligned on the last row.
const CELL: u32 = (SCREEN_ROWS - 1) * SCREEN_COLUMNS + SCREEN_COLUMNS - 8;

#[no_mangle]
#[link_section = ".text.entry"]
pub extern "C" fn _start() -> ! {
    let mut last = [0u8; 8];
    loop {
        let now = read_clock().format_hms();
        if now != last {
            puts_at(&now, COLOR, CELL);
            last = now;
        }
        core::hint::spin_loop();
    }
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    ember_sdk::exit()
}
