//! Virtual terminal model for termcast
//!
//! Maintains a styled character grid driven by the ANSI subset a terminal
//! dashboard emits, and serializes the grid to the styled-markup dialect
//! the 3D viewer consumes.

pub mod color;
pub mod markup;
pub mod parser;
pub mod screen;
pub mod utf8;

pub use color::{ansi256_to_rgb, Rgb};
pub use markup::render;
pub use parser::{scan, EraseMode, Op, Sgr};
pub use screen::{Cell, Screen, Style, DEFAULT_HEIGHT, DEFAULT_WIDTH};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("invalid terminal size {width}x{height}")]
    InvalidSize { width: u16, height: u16 },
}
