//! Column layout resolution.
//!
//! A single left-to-right scan rewrites `columns: [..]` / `column: N` /
//! `reset` directives into flex-box markup. Exactly one region can be open
//! at a time; opening a new one flushes the old one first. Width lists go
//! through a strict numeric parser: a malformed list never opens a region,
//! it is warned about and passed through as ordinary content.

use std::fmt::Write as _;

use crate::code_fence::{FenceEvent, FenceTracker};
use crate::error::{Diagnostics, PreprocessWarning};

/// The slide separator token.
pub const SLIDE_SEPARATOR: &str = "---";

/// Classification of one input line.
#[derive(Debug, Clone, PartialEq)]
enum LineToken<'a> {
    /// `columns: [w1, w2, ...]` with a valid width list.
    Columns(Vec<f64>),
    /// `column: N`, already converted to a 0-based index.
    Column(usize),
    /// `reset`.
    Reset,
    /// A line that is exactly the slide separator.
    Separator,
    /// Anything else.
    Content(&'a str),
}

fn classify<'a>(line: &'a str, diags: &mut Diagnostics) -> LineToken<'a> {
    if line.trim_end_matches('\r') == SLIDE_SEPARATOR {
        return LineToken::Separator;
    }

    let trimmed = line.trim();
    if trimmed == "reset" {
        return LineToken::Reset;
    }

    if let Some(rest) = trimmed.strip_prefix("columns:") {
        return match parse_width_list(rest.trim()) {
            Ok(widths) => LineToken::Columns(widths),
            Err(reason) => {
                diags.warn(PreprocessWarning::MalformedWidthList {
                    line: trimmed.to_string(),
                    reason,
                });
                LineToken::Content(line)
            }
        };
    }

    if let Some(rest) = trimmed.strip_prefix("column:") {
        return match rest.trim().parse::<usize>() {
            Ok(index) if index >= 1 => LineToken::Column(index - 1),
            _ => {
                diags.warn(PreprocessWarning::UnusableColumnSwitch {
                    line: trimmed.to_string(),
                    reason: "column index must be a positive integer".to_string(),
                });
                LineToken::Content(line)
            }
        };
    }

    LineToken::Content(line)
}

/// Strict `[n, n, ...]` parser. No expression evaluation; anything that is
/// not a bracketed list of positive finite numbers is rejected.
fn parse_width_list(input: &str) -> Result<Vec<f64>, String> {
    let inner = input
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| "expected a bracketed list like [1, 2]".to_string())?;

    if inner.trim().is_empty() {
        return Err("width list is empty".to_string());
    }

    inner
        .split(',')
        .map(|item| {
            let item = item.trim();
            let width: f64 = item
                .parse()
                .map_err(|_| format!("'{item}' is not a number"))?;
            if width.is_finite() && width > 0.0 {
                Ok(width)
            } else {
                Err(format!("'{item}' is not a positive width"))
            }
        })
        .collect()
}

/// An open column region: declared widths and one buffer per column.
struct ColumnRegion {
    widths: Vec<f64>,
    active: usize,
    buffers: Vec<String>,
}

impl ColumnRegion {
    fn new(widths: Vec<f64>) -> Self {
        let buffers = vec![String::new(); widths.len()];
        Self {
            widths,
            active: 0,
            buffers,
        }
    }
}

/// Rewrite column directives in `input` into flex markup.
///
/// Directive-shaped lines inside fenced code blocks are left alone. An
/// unterminated region still flushes at end of input.
pub fn resolve_columns(input: &str, diags: &mut Diagnostics) -> String {
    let mut out = String::new();
    let mut fences = FenceTracker::new();
    let mut region: Option<ColumnRegion> = None;

    for line in input.lines() {
        if !matches!(fences.scan(line), FenceEvent::Outside) {
            emit(&mut out, region.as_mut(), line);
            continue;
        }

        match classify(line, diags) {
            LineToken::Columns(widths) => {
                flush(&mut out, region.take());
                region = Some(ColumnRegion::new(widths));
            }
            LineToken::Column(index) => match region.as_mut() {
                Some(open) if index < open.buffers.len() => open.active = index,
                Some(open) => diags.warn(PreprocessWarning::UnusableColumnSwitch {
                    line: line.trim().to_string(),
                    reason: format!("only {} columns declared", open.buffers.len()),
                }),
                None => diags.warn(PreprocessWarning::UnusableColumnSwitch {
                    line: line.trim().to_string(),
                    reason: "no open column region".to_string(),
                }),
            },
            LineToken::Reset => flush(&mut out, region.take()),
            LineToken::Separator => {
                flush(&mut out, region.take());
                out.push('\n');
                out.push_str(line);
                out.push('\n');
            }
            LineToken::Content(content) => emit(&mut out, region.as_mut(), content),
        }
    }

    flush(&mut out, region.take());
    out
}

fn emit(out: &mut String, region: Option<&mut ColumnRegion>, line: &str) {
    let target = match region {
        Some(open) => &mut open.buffers[open.active],
        None => out,
    };
    target.push_str(line);
    target.push('\n');
}

/// Emit the flex container for a finished region. Each populated column
/// becomes a child `div` sized to its share of the declared widths.
fn flush(out: &mut String, region: Option<ColumnRegion>) {
    let Some(region) = region else {
        return;
    };

    let total: f64 = region.widths.iter().sum();
    out.push_str("<div style=\"display: flex;\">\n");
    for (width, buffer) in region.widths.iter().zip(&region.buffers) {
        if buffer.is_empty() {
            continue;
        }
        let share = width / total * 100.0;
        writeln!(out, "<div style=\"width: {share:.2}%;\">").ok();
        out.push_str(buffer);
        out.push_str("</div>\n");
    }
    out.push_str("</div>\n");
}
