//! The terminal cell grid
//!
//! A fixed-size grid of styled cells plus the cursor and the style register
//! that parsed operations mutate. There is no scrollback: line feeds and
//! wraps past the bottom row clamp there, so late output overwrites the
//! last row.

use crate::color::Rgb;
use crate::parser::{self, EraseMode, Op, Sgr};
use crate::TerminalError;

/// Grid size used until the producer reports its real one
pub const DEFAULT_WIDTH: u16 = 120;
pub const DEFAULT_HEIGHT: u16 = 30;

/// Style attributes shared by cells and the current-style register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub reverse: bool,
    /// Foreground override; `None` means the consumer's default
    pub fg: Option<Rgb>,
    /// Background override; `None` means the consumer's default
    pub bg: Option<Rgb>,
}

impl Style {
    /// True when any attribute deviates from the default.
    pub fn is_styled(&self) -> bool {
        self.bold
            || self.italic
            || self.underline
            || self.reverse
            || self.fg.is_some()
            || self.bg.is_some()
    }
}

/// A single grid position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub style: Style,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            style: Style::default(),
        }
    }
}

/// The virtual terminal grid
#[derive(Debug, Clone)]
pub struct Screen {
    width: u16,
    height: u16,
    /// Cells in row-major order
    cells: Vec<Cell>,
    cursor_x: u16,
    cursor_y: u16,
    /// Style applied to every glyph printed until the next SGR
    style: Style,
}

impl Screen {
    /// Create a grid of `width` x `height` default cells.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::default(); width as usize * height as usize],
            cursor_x: 0,
            cursor_y: 0,
            style: Style::default(),
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Cursor position as `(x, y)`.
    pub fn cursor_position(&self) -> (u16, u16) {
        (self.cursor_x, self.cursor_y)
    }

    /// Cell at `(x, y)`, or `None` outside the grid.
    pub fn cell_at(&self, x: u16, y: u16) -> Option<&Cell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(self.index(x, y))
    }

    /// One row of cells. Panics if `y` is out of range.
    pub fn row(&self, y: u16) -> &[Cell] {
        let start = self.index(0, y);
        &self.cells[start..start + self.width as usize]
    }

    /// Reallocate to a new size, resetting content and homing the cursor.
    pub fn resize(&mut self, width: u16, height: u16) -> Result<(), TerminalError> {
        if width == 0 || height == 0 {
            return Err(TerminalError::InvalidSize { width, height });
        }
        self.width = width;
        self.height = height;
        self.cells = vec![Cell::default(); width as usize * height as usize];
        self.cursor_x = 0;
        self.cursor_y = 0;
        Ok(())
    }

    /// Reset every cell to the default and home the cursor. The style
    /// register is left alone.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::default());
        self.cursor_x = 0;
        self.cursor_y = 0;
    }

    /// Parse a chunk of terminal output and apply it.
    pub fn process(&mut self, data: &[u8]) {
        parser::scan(data, |op| self.apply(op));
    }

    /// Apply one parsed operation.
    pub fn apply(&mut self, op: Op) {
        match op {
            Op::Print(ch) => self.put_char(ch),
            Op::LineFeed => {
                self.cursor_y = (self.cursor_y + 1).min(self.height - 1);
                self.cursor_x = 0;
            }
            Op::CarriageReturn => self.cursor_x = 0,
            Op::CursorTo { row, col } => {
                self.cursor_x = col.min(self.width - 1);
                self.cursor_y = row.min(self.height - 1);
            }
            Op::CursorDelta { dx, dy } => {
                let x = self.cursor_x as i32 + dx;
                let y = self.cursor_y as i32 + dy;
                self.cursor_x = x.clamp(0, self.width as i32 - 1) as u16;
                self.cursor_y = y.clamp(0, self.height as i32 - 1) as u16;
            }
            Op::CursorColumn(col) => self.cursor_x = col.min(self.width - 1),
            Op::EraseDisplay(mode) => self.erase_display(mode),
            Op::EraseLine(mode) => self.erase_line(mode),
            Op::Sgr(items) => {
                for sgr in items {
                    self.apply_sgr(sgr);
                }
            }
        }
    }

    fn put_char(&mut self, ch: char) {
        let idx = self.index(self.cursor_x, self.cursor_y);
        self.cells[idx] = Cell {
            ch,
            style: self.style,
        };
        self.cursor_x += 1;
        if self.cursor_x == self.width {
            self.cursor_x = 0;
            self.cursor_y = (self.cursor_y + 1).min(self.height - 1);
        }
    }

    fn erase_display(&mut self, mode: EraseMode) {
        match mode {
            EraseMode::ToEnd => {
                let start = self.index(self.cursor_x, self.cursor_y);
                self.cells[start..].fill(Cell::default());
            }
            EraseMode::ToCursor => {
                let end = self.index(self.cursor_x, self.cursor_y);
                self.cells[..=end].fill(Cell::default());
            }
            EraseMode::All => self.clear(),
        }
    }

    fn erase_line(&mut self, mode: EraseMode) {
        let row_start = self.index(0, self.cursor_y);
        let cursor = self.index(self.cursor_x, self.cursor_y);
        let row_end = row_start + self.width as usize;
        let range = match mode {
            EraseMode::ToEnd => cursor..row_end,
            EraseMode::ToCursor => row_start..cursor + 1,
            EraseMode::All => row_start..row_end,
        };
        self.cells[range].fill(Cell::default());
    }

    fn apply_sgr(&mut self, sgr: Sgr) {
        match sgr {
            Sgr::Reset => self.style = Style::default(),
            Sgr::Bold(on) => self.style.bold = on,
            Sgr::Italic(on) => self.style.italic = on,
            Sgr::Underline(on) => self.style.underline = on,
            Sgr::Reverse(on) => self.style.reverse = on,
            Sgr::Foreground(color) => self.style.fg = color,
            Sgr::Background(color) => self.style.bg = color,
        }
    }

    fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;

    fn ch_at(screen: &Screen, x: u16, y: u16) -> char {
        screen.cell_at(x, y).unwrap().ch
    }

    #[test]
    fn test_new_screen_is_blank() {
        let screen = Screen::new(10, 4);
        assert_eq!(screen.cursor_position(), (0, 0));
        for y in 0..4 {
            for x in 0..10 {
                assert_eq!(*screen.cell_at(x, y).unwrap(), Cell::default());
            }
        }
    }

    #[test]
    fn test_print_advances_cursor() {
        let mut screen = Screen::new(10, 4);
        screen.process(b"hi");
        assert_eq!(ch_at(&screen, 0, 0), 'h');
        assert_eq!(ch_at(&screen, 1, 0), 'i');
        assert_eq!(screen.cursor_position(), (2, 0));
    }

    #[test]
    fn test_wrap_without_scroll() {
        let mut screen = Screen::new(3, 2);
        screen.process(b"ABCDEFG");
        // ABC fills row 0, DEF fills row 1, then the wrap clamps at the
        // bottom row and G overwrites its first cell.
        assert_eq!(ch_at(&screen, 0, 0), 'A');
        assert_eq!(ch_at(&screen, 2, 0), 'C');
        assert_eq!(ch_at(&screen, 0, 1), 'G');
        assert_eq!(ch_at(&screen, 1, 1), 'E');
        assert_eq!(ch_at(&screen, 2, 1), 'F');
    }

    #[test]
    fn test_line_feed_clamps_at_bottom() {
        let mut screen = Screen::new(4, 2);
        screen.process(b"a\nb\nc\nd");
        assert_eq!(ch_at(&screen, 0, 0), 'a');
        // b lands on row 1; further line feeds stay there.
        assert_eq!(ch_at(&screen, 0, 1), 'd');
        assert_eq!(screen.cursor_position(), (1, 1));
    }

    #[test]
    fn test_carriage_return_overwrites() {
        let mut screen = Screen::new(8, 2);
        screen.process(b"abc\rX");
        assert_eq!(ch_at(&screen, 0, 0), 'X');
        assert_eq!(ch_at(&screen, 1, 0), 'b');
    }

    #[test]
    fn test_cursor_clamping() {
        let mut screen = Screen::new(80, 24);
        screen.process(b"\x1b[999;999H*");
        assert_eq!(ch_at(&screen, 79, 23), '*');
    }

    #[test]
    fn test_cursor_delta_clamps_at_origin() {
        let mut screen = Screen::new(10, 5);
        screen.process(b"\x1b[5;5H\x1b[99A\x1b[99D");
        assert_eq!(screen.cursor_position(), (0, 0));
    }

    #[test]
    fn test_zero_position_clamps_to_origin() {
        let mut screen = Screen::new(10, 5);
        screen.process(b"\x1b[0;0H*");
        assert_eq!(ch_at(&screen, 0, 0), '*');
    }

    #[test]
    fn test_control_bytes_ignored() {
        let mut screen = Screen::new(8, 2);
        screen.process(b"a\x07\x08\x09b");
        assert_eq!(ch_at(&screen, 0, 0), 'a');
        assert_eq!(ch_at(&screen, 1, 0), 'b');
    }

    #[test]
    fn test_clear_resets_cells_and_cursor() {
        let mut screen = Screen::new(5, 3);
        screen.process(b"\x1b[31mhello\x1b[2;1Hworld");
        screen.clear();
        assert_eq!(screen.cursor_position(), (0, 0));
        for y in 0..3 {
            for x in 0..5 {
                assert_eq!(*screen.cell_at(x, y).unwrap(), Cell::default());
            }
        }
    }

    #[test]
    fn test_erase_display_to_end() {
        let mut screen = Screen::new(4, 2);
        screen.process(b"abcdefgh\x1b[1;3H\x1b[0J");
        assert_eq!(ch_at(&screen, 0, 0), 'a');
        assert_eq!(ch_at(&screen, 1, 0), 'b');
        assert_eq!(ch_at(&screen, 2, 0), ' ');
        assert_eq!(ch_at(&screen, 0, 1), ' ');
    }

    #[test]
    fn test_erase_display_to_cursor_inclusive() {
        let mut screen = Screen::new(4, 2);
        screen.process(b"abcdefgh\x1b[2;2H\x1b[1J");
        assert_eq!(ch_at(&screen, 0, 0), ' ');
        assert_eq!(ch_at(&screen, 3, 0), ' ');
        // The cursor cell itself is erased.
        assert_eq!(ch_at(&screen, 1, 1), ' ');
        assert_eq!(ch_at(&screen, 2, 1), 'g');
    }

    #[test]
    fn test_erase_display_all_homes_cursor() {
        let mut screen = Screen::new(4, 2);
        screen.process(b"abcd\x1b[2J");
        assert_eq!(screen.cursor_position(), (0, 0));
        assert_eq!(ch_at(&screen, 0, 0), ' ');
    }

    #[test]
    fn test_erase_line_variants() {
        let mut screen = Screen::new(5, 2);
        screen.process(b"abcde\x1b[2;1Hvwxyz");

        let mut s = screen.clone();
        s.process(b"\x1b[1;3H\x1b[0K");
        assert_eq!(s.row(0).iter().map(|c| c.ch).collect::<String>(), "ab   ");

        let mut s = screen.clone();
        s.process(b"\x1b[1;3H\x1b[1K");
        assert_eq!(s.row(0).iter().map(|c| c.ch).collect::<String>(), "   de");

        let mut s = screen.clone();
        s.process(b"\x1b[1;3H\x1b[2K");
        assert_eq!(s.row(0).iter().map(|c| c.ch).collect::<String>(), "     ");
        // The other row is untouched in every variant.
        assert_eq!(s.row(1).iter().map(|c| c.ch).collect::<String>(), "vwxyz");
    }

    #[test]
    fn test_style_register_applies_to_prints() {
        let mut screen = Screen::new(6, 2);
        screen.process(b"\x1b[1;31mab\x1b[0mc");
        let styled = screen.cell_at(0, 0).unwrap();
        assert!(styled.style.bold);
        assert_eq!(styled.style.fg, Some(Rgb::new(0x80, 0, 0)));
        let plain = screen.cell_at(2, 0).unwrap();
        assert_eq!(plain.style, Style::default());
    }

    #[test]
    fn test_reset_clears_colors_and_flags() {
        let mut screen = Screen::new(6, 2);
        screen.process(b"\x1b[1;4;38;5;196;48;5;21m\x1b[0ma");
        assert_eq!(screen.cell_at(0, 0).unwrap().style, Style::default());
    }

    #[test]
    fn test_resize_resets_content() {
        let mut screen = Screen::new(4, 2);
        screen.process(b"abcd");
        screen.resize(6, 3).unwrap();
        assert_eq!(screen.width(), 6);
        assert_eq!(screen.height(), 3);
        assert_eq!(screen.cursor_position(), (0, 0));
        assert_eq!(*screen.cell_at(0, 0).unwrap(), Cell::default());
    }

    #[test]
    fn test_resize_rejects_zero() {
        let mut screen = Screen::new(4, 2);
        assert!(screen.resize(0, 3).is_err());
        assert!(screen.resize(4, 0).is_err());
        assert_eq!(screen.width(), 4);
    }

    #[test]
    fn test_cursor_stays_in_bounds_under_op_soup() {
        let mut screen = Screen::new(7, 3);
        screen.process(b"\x1b[99B\x1b[99C\x1b[2E\x1b[9;9H\x1b[99Ax\n\x1b[99G*");
        let (x, y) = screen.cursor_position();
        assert!(x < 7);
        assert!(y < 3);
    }
}
