//! ANSI control sequence scanner
//!
//! Translates a snapshot chunk into a stream of grid operations. Only the
//! CSI subset a dashboard-style producer emits is recognized; unknown final
//! bytes (including save/restore cursor) are dropped, as is a sequence cut
//! off by the end of the chunk.

use crate::color::{ansi256_to_rgb, Rgb};
use crate::utf8;

const ESC: u8 = 0x1B;

/// Operations applied to the screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Print(char),
    LineFeed,
    CarriageReturn,
    /// Absolute cursor move, already converted to 0-based
    CursorTo { row: u16, col: u16 },
    /// Relative cursor move
    CursorDelta { dx: i32, dy: i32 },
    /// Absolute column move, already converted to 0-based
    CursorColumn(u16),
    EraseDisplay(EraseMode),
    EraseLine(EraseMode),
    Sgr(Vec<Sgr>),
}

/// Region selector for erase-in-display and erase-in-line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    /// From the cursor to the end of the region
    ToEnd,
    /// From the start of the region through the cursor, inclusive
    ToCursor,
    /// The whole region
    All,
}

impl EraseMode {
    fn from_param(p: u16) -> Option<Self> {
        match p {
            0 => Some(Self::ToEnd),
            1 => Some(Self::ToCursor),
            2 => Some(Self::All),
            _ => None,
        }
    }
}

/// Decoded SGR attribute changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sgr {
    Reset,
    Bold(bool),
    Italic(bool),
    Underline(bool),
    Reverse(bool),
    Foreground(Option<Rgb>),
    Background(Option<Rgb>),
}

/// Scan `data`, feeding each recognized operation to `sink`.
pub fn scan<F: FnMut(Op)>(data: &[u8], mut sink: F) {
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b == ESC && data.get(i + 1) == Some(&b'[') {
            let start = i + 2;
            let mut end = start;
            while end < data.len() && !(0x40..=0x7E).contains(&data[end]) {
                end += 1;
            }
            if end == data.len() {
                // Chunk ended before the final byte; drop the sequence.
                return;
            }
            dispatch_csi(&data[start..end], data[end], &mut sink);
            i = end + 1;
        } else if b == 0x0A {
            sink(Op::LineFeed);
            i += 1;
        } else if b == 0x0D {
            sink(Op::CarriageReturn);
            i += 1;
        } else if b < 0x20 {
            // Other C0 controls, including a bare ESC, carry no meaning here.
            i += 1;
        } else {
            let (ch, len) = utf8::decode(data, i);
            sink(Op::Print(ch));
            i += len;
        }
    }
}

/// Scan `data` and collect the operations into a vector.
pub fn scan_collect(data: &[u8]) -> Vec<Op> {
    let mut ops = Vec::new();
    scan(data, |op| ops.push(op));
    ops
}

fn dispatch_csi<F: FnMut(Op)>(raw: &[u8], final_byte: u8, sink: &mut F) {
    match final_byte {
        b'H' | b'f' => {
            let p = params(raw, 1);
            sink(Op::CursorTo {
                row: p[0].saturating_sub(1),
                col: p.get(1).copied().unwrap_or(1).saturating_sub(1),
            });
        }
        b'A' => sink(Op::CursorDelta { dx: 0, dy: -(first(raw) as i32) }),
        b'B' => sink(Op::CursorDelta { dx: 0, dy: first(raw) as i32 }),
        b'C' => sink(Op::CursorDelta { dx: first(raw) as i32, dy: 0 }),
        b'D' => sink(Op::CursorDelta { dx: -(first(raw) as i32), dy: 0 }),
        b'E' => {
            sink(Op::CursorDelta { dx: 0, dy: first(raw) as i32 });
            sink(Op::CursorColumn(0));
        }
        b'F' => {
            sink(Op::CursorDelta { dx: 0, dy: -(first(raw) as i32) });
            sink(Op::CursorColumn(0));
        }
        b'G' => sink(Op::CursorColumn(first(raw).saturating_sub(1))),
        b'J' => {
            if let Some(mode) = EraseMode::from_param(first(raw)) {
                sink(Op::EraseDisplay(mode));
            }
        }
        b'K' => {
            if let Some(mode) = EraseMode::from_param(first(raw)) {
                sink(Op::EraseLine(mode));
            }
        }
        b'm' => sink(Op::Sgr(decode_sgr(&params(raw, 0)))),
        _ => {}
    }
}

/// Parse the semicolon-separated parameter list. `empty_default` is what an
/// empty parameter (and an absent list) stands for: 1 everywhere except SGR,
/// where parameters default to 0. A trailing `;` contributes nothing. The
/// result is never empty.
fn params(raw: &[u8], empty_default: u16) -> Vec<u16> {
    let mut out = Vec::new();
    let mut current: u16 = 0;
    let mut has_value = false;
    for &b in raw {
        match b {
            b'0'..=b'9' => {
                has_value = true;
                current = current.saturating_mul(10).saturating_add((b - b'0') as u16);
            }
            b';' => {
                out.push(if has_value { current } else { empty_default });
                current = 0;
                has_value = false;
            }
            _ => {}
        }
    }
    if has_value {
        out.push(current);
    }
    if out.is_empty() {
        out.push(empty_default);
    }
    out
}

fn first(raw: &[u8]) -> u16 {
    params(raw, 1)[0]
}

/// Decode an SGR parameter run into attribute changes.
///
/// A truncated extended-color subsequence voids the rest of the run.
fn decode_sgr(params: &[u16]) -> Vec<Sgr> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < params.len() {
        match params[i] {
            0 => out.push(Sgr::Reset),
            1 => out.push(Sgr::Bold(true)),
            22 => out.push(Sgr::Bold(false)),
            3 => out.push(Sgr::Italic(true)),
            23 => out.push(Sgr::Italic(false)),
            4 => out.push(Sgr::Underline(true)),
            24 => out.push(Sgr::Underline(false)),
            7 => out.push(Sgr::Reverse(true)),
            27 => out.push(Sgr::Reverse(false)),
            39 => out.push(Sgr::Foreground(None)),
            49 => out.push(Sgr::Background(None)),
            30..=37 => out.push(Sgr::Foreground(Some(ansi256_to_rgb((params[i] - 30) as u8)))),
            40..=47 => out.push(Sgr::Background(Some(ansi256_to_rgb((params[i] - 40) as u8)))),
            90..=97 => out.push(Sgr::Foreground(Some(ansi256_to_rgb((params[i] - 90 + 8) as u8)))),
            100..=107 => {
                out.push(Sgr::Background(Some(ansi256_to_rgb((params[i] - 100 + 8) as u8))))
            }
            code @ (38 | 48) => {
                // Extended color: 38;2;R;G;B or 38;5;N (same for 48). A
                // truncated subsequence voids the rest of the run; an
                // unknown sub-mode is left for the next iteration to see
                // as a plain code.
                let rgb = match params.get(i + 1).copied() {
                    Some(2) if i + 4 < params.len() => {
                        let rgb = Rgb::new(
                            channel(params[i + 2]),
                            channel(params[i + 3]),
                            channel(params[i + 4]),
                        );
                        i += 4;
                        rgb
                    }
                    Some(5) if i + 2 < params.len() => {
                        let rgb = ansi256_to_rgb(params[i + 2].min(255) as u8);
                        i += 2;
                        rgb
                    }
                    Some(2) | Some(5) | None => break,
                    Some(_) => {
                        i += 1;
                        continue;
                    }
                };
                out.push(if code == 38 {
                    Sgr::Foreground(Some(rgb))
                } else {
                    Sgr::Background(Some(rgb))
                });
            }
            _ => {}
        }
        i += 1;
    }
    out
}

fn channel(v: u16) -> u8 {
    v.min(255) as u8
}
