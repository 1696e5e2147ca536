//! Boot banner.

use crate::arch::x86::vga::{self, Color};
use crate::println;

/// Prints the logo and version to the console.
pub fn print_banner() {
    vga::set_color(Color::LightRed, Color::Black);
    println!("  _____           _               ");
    println!(" | ____|_ __ ___ | |__   ___ _ __ ");
    println!(" |  _| | '_ ` _ \\| '_ \\ / _ \\ '__|");
    println!(" | |___| | | | | | |_) |  __/ |   ");
    println!(" |_____|_| |_| |_|_.__/ \\___|_|   ");
    println!();
    vga::set_color(Color::White, Color::Black);
    println!(" Ember v{}", env!("CARGO_PKG_VERSION"));
    println!();
}
