//! Code fence tracking for the line-oriented scanners.
//!
//! Both the chart extractor and the column resolver walk the document line
//! by line and must know whether a line sits inside a fenced code block:
//! chart fences are consumed whole, and directive-shaped lines inside any
//! other fence pass through untouched.

/// How a single line relates to fenced-block structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceEvent<'a> {
    /// The line opens a fence; `info` is the info string after the markers.
    Open {
        /// Info string (language tag plus anything following it), trimmed.
        info: &'a str,
    },
    /// The line closes the currently open fence.
    Close,
    /// The line is inside an open fence.
    Inside,
    /// Ordinary line outside any fence.
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenFence {
    marker: char,
    length: usize,
}

/// Tracks fence state across a left-to-right scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct FenceTracker {
    open: Option<OpenFence>,
}

impl FenceTracker {
    /// Create a tracker positioned outside any fence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the scan is currently inside a fence.
    pub fn in_fence(&self) -> bool {
        self.open.is_some()
    }

    /// Advance over one line and report how it relates to fence structure.
    pub fn scan<'a>(&mut self, line: &'a str) -> FenceEvent<'a> {
        let stripped = strip_fence_indent(line);

        match self.open {
            Some(fence) => {
                if is_closing_fence(stripped, fence) {
                    self.open = None;
                    FenceEvent::Close
                } else {
                    FenceEvent::Inside
                }
            }
            None => match detect_fence(stripped) {
                Some((fence, info)) => {
                    self.open = Some(fence);
                    FenceEvent::Open { info }
                }
                None => FenceEvent::Outside,
            },
        }
    }
}

/// Fence markers may be indented by up to three spaces.
fn strip_fence_indent(line: &str) -> &str {
    let mut rest = line;
    for _ in 0..3 {
        match rest.strip_prefix(' ') {
            Some(next) => rest = next,
            None => break,
        }
    }
    rest
}

fn detect_fence(stripped: &str) -> Option<(OpenFence, &str)> {
    let marker = match stripped.chars().next() {
        Some(c @ ('`' | '~')) => c,
        _ => return None,
    };
    let length = stripped.chars().take_while(|c| *c == marker).count();
    if length < 3 {
        return None;
    }
    let info = stripped[length..].trim();
    // A backtick info string may not itself contain backticks.
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some((OpenFence { marker, length }, info))
}

fn is_closing_fence(stripped: &str, open: OpenFence) -> bool {
    let length = stripped.chars().take_while(|c| *c == open.marker).count();
    length >= open.length && stripped[length..].trim().is_empty()
}
