//! Styled-markup serialization
//!
//! Renders the grid into the tag dialect the 3D viewer consumes. Runs of
//! identically-styled cells share a single tag prefix; `</closeall>` pops
//! the viewer's whole tag stack, so no matched closing tags are emitted.

use std::fmt::Write;

use crate::screen::{Screen, Style};

/// Serialize the grid to one markup string.
///
/// Trailing rows without content are dropped; a row has content when any
/// cell is non-space or carries a background color. A grid with no content
/// at all renders as the empty string. Emitted rows keep the full grid
/// width and are separated by `<br>`.
pub fn render(screen: &Screen) -> String {
    let Some(last_row) = last_content_row(screen) else {
        return String::new();
    };
    let mut out =
        String::with_capacity((last_row as usize + 1) * (screen.width() as usize + 8) * 2);
    for y in 0..=last_row {
        render_row(screen, y, &mut out);
        if y < last_row {
            out.push_str("<br>");
        }
    }
    out
}

fn last_content_row(screen: &Screen) -> Option<u16> {
    (0..screen.height())
        .rev()
        .find(|&y| screen.row(y).iter().any(|c| c.ch != ' ' || c.style.bg.is_some()))
}

fn render_row(screen: &Screen, y: u16, out: &mut String) {
    let mut last_style = Style::default();
    let mut style_open = false;
    for (x, cell) in screen.row(y).iter().enumerate() {
        if x == 0 || cell.style != last_style {
            if style_open {
                out.push_str("</closeall>");
            }
            style_open = open_tags(&cell.style, out);
            last_style = cell.style;
        }
        out.push(cell.ch);
    }
    if style_open {
        out.push_str("</closeall>");
    }
}

/// Emit the opening tags for `style` in the dialect's fixed order, returning
/// whether any tag was opened.
fn open_tags(style: &Style, out: &mut String) -> bool {
    if !style.is_styled() {
        return false;
    }
    if let Some(fg) = style.fg {
        let _ = write!(out, "<color={fg}>");
    }
    if let Some(bg) = style.bg {
        let _ = write!(out, "<mark={bg}>");
    }
    if style.bold {
        out.push_str("<b>");
    }
    if style.italic {
        out.push_str("<i>");
    }
    if style.underline {
        out.push_str("<u>");
    }
    if style.reverse {
        out.push_str("<reverse>");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_grid_renders_empty() {
        let screen = Screen::new(120, 30);
        assert_eq!(render(&screen), "");
    }

    #[test]
    fn test_colored_text_with_trailing_rows_trimmed() {
        let mut screen = Screen::new(3, 5);
        screen.process(b"\x1b[2J\x1b[1;1H\x1b[31mABC\x1b[0m");
        assert_eq!(render(&screen), "<color=#800000>ABC</closeall>");
    }

    #[test]
    fn test_256_color_foreground() {
        let mut screen = Screen::new(1, 2);
        screen.process(b"\x1b[38;5;196mX");
        assert_eq!(render(&screen), "<color=#ff0000>X</closeall>");
    }

    #[test]
    fn test_background_space_survives_trim() {
        let mut screen = Screen::new(1, 2);
        screen.process(b"\x1b[48;2;10;20;30m ");
        assert_eq!(render(&screen), "<mark=#0a141e> </closeall>");
    }

    #[test]
    fn test_foreground_colored_space_is_trimmed() {
        let mut screen = Screen::new(4, 2);
        screen.process(b"\x1b[31m ");
        assert_eq!(render(&screen), "");
    }

    #[test]
    fn test_style_run_shares_one_prefix() {
        let mut screen = Screen::new(2, 1);
        screen.process(b"\x1b[1mAB");
        assert_eq!(render(&screen), "<b>AB</closeall>");
    }

    #[test]
    fn test_style_change_mid_row() {
        let mut screen = Screen::new(2, 1);
        screen.process(b"\x1b[1mA\x1b[0;4mB");
        assert_eq!(render(&screen), "<b>A</closeall><u>B</closeall>");
    }

    #[test]
    fn test_tag_order() {
        let mut screen = Screen::new(1, 1);
        screen.process(b"\x1b[1;3;4;7;38;2;1;2;3;48;2;4;5;6mZ");
        assert_eq!(
            render(&screen),
            "<color=#010203><mark=#040506><b><i><u><reverse>Z</closeall>"
        );
    }

    #[test]
    fn test_rows_joined_with_br() {
        let mut screen = Screen::new(2, 3);
        screen.process(b"A\nB");
        assert_eq!(render(&screen), "A <br>B ");
    }

    #[test]
    fn test_gap_row_between_content_rows_is_kept() {
        let mut screen = Screen::new(1, 3);
        screen.process(b"A\n\nC");
        assert_eq!(render(&screen), "A<br> <br>C");
    }

    #[test]
    fn test_unstyled_row_tail_keeps_full_width() {
        let mut screen = Screen::new(4, 1);
        screen.process(b"\x1b[31mhi");
        assert_eq!(render(&screen), "<color=#800000>hi</closeall>  ");
    }

    #[test]
    fn test_rendering_is_stable_across_identical_snapshots() {
        let snapshot: &[u8] = b"\x1b[2J\x1b[1;1H\x1b[1;38;5;46mload: \x1b[0m0.42";
        let mut screen = Screen::new(20, 4);
        screen.process(snapshot);
        let first = render(&screen);
        screen.clear();
        screen.process(snapshot);
        assert_eq!(render(&screen), first);
    }
}
