//! Boot logging with colored status indicators.
//!
//! Every line shown on the console is also sent to the serial log.

pub mod banner;

use crate::arch::x86::vga::{self, Color};
use crate::{print, println};

/// Boot status indicators.
#[derive(Debug, Clone, Copy)]
pub enum Status {
    /// `[ OK ]` in green
    Ok,
    /// `[FAIL]` in red
    Fail,
    /// `[WARN]` in yellow
    Warn,
    /// `[INFO]` in cyan
    Info,
}

/// Logs a boot stage: `[ OK ] Message text`.
pub fn log(status: Status, message: &str) {
    print_status(status);
    println!(" {}", message);
    match status {
        Status::Fail => log::error!("{}", message),
        Status::Warn => log::warn!("{}", message),
        Status::Ok | Status::Info => log::info!("{}", message),
    }
}

/// Logs an indented detail line under the previous stage.
pub fn log_detail(args: core::fmt::Arguments) {
    println!("       {}", args);
    log::info!("  {}", args);
}

fn print_status(status: Status) {
    let (text, color) = match status {
        Status::Ok => ("[ OK ]", Color::LightGreen),
        Status::Fail => ("[FAIL]", Color::LightRed),
        Status::Warn => ("[WARN]", Color::Yellow),
        Status::Info => ("[INFO]", Color::LightCyan),
    };
    vga::set_color(color, Color::Black);
    print!("{}", text);
    vga::set_color(Color::White, Color::Black);
}
