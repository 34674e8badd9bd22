//! Chart block extraction.
//!
//! A chart block is a fenced code block tagged `mermaid` or `typst` whose
//! directive area carries `+render`, with optional `+width:`/`+height:` size
//! hints. Directives may sit on the fence line itself or on leading body
//! lines. Fences without `+render` are ordinary code blocks and pass
//! through untouched.

use std::fmt;

use crate::code_fence::{FenceEvent, FenceTracker};
use crate::error::{Diagnostics, PreprocessWarning};

/// Width substituted when a `+width:` token fails validation or is absent.
pub const DEFAULT_WIDTH: &str = "100%";
/// Height substituted when no `+height:` token is given.
pub const DEFAULT_HEIGHT: &str = "auto";

/// The diagram languages deckflow hands to an external compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    /// Mermaid diagrams, compiled by `mmdc`.
    Mermaid,
    /// Typst snippets, compiled by `typst`.
    Typst,
}

impl ChartKind {
    /// All supported kinds.
    pub const ALL: [ChartKind; 2] = [ChartKind::Mermaid, ChartKind::Typst];

    /// Fence info-string tag that introduces this kind.
    pub fn fence_tag(self) -> &'static str {
        match self {
            ChartKind::Mermaid => "mermaid",
            ChartKind::Typst => "typst",
        }
    }

    /// Short tag used in artifact and temp-source file names.
    pub fn file_tag(self) -> &'static str {
        match self {
            ChartKind::Mermaid => "mmd",
            ChartKind::Typst => "typ",
        }
    }

    /// File extension for compiler input sources.
    pub fn source_extension(self) -> &'static str {
        match self {
            ChartKind::Mermaid => "mmd",
            ChartKind::Typst => "typ",
        }
    }

    /// Prefix shared by every artifact file of this kind.
    pub fn artifact_prefix(self) -> String {
        format!("deckflow-{}-", self.file_tag())
    }

    /// Match the first token of a fence info string against the known tags.
    pub fn from_fence_tag(tag: &str) -> Option<ChartKind> {
        ChartKind::ALL.into_iter().find(|kind| kind.fence_tag() == tag)
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartKind::Mermaid => write!(f, "Mermaid"),
            ChartKind::Typst => write!(f, "Typst"),
        }
    }
}

/// One extracted chart block from the current document snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartBlock {
    /// Diagram language of the block.
    pub kind: ChartKind,
    /// Diagram source, without the fence lines or directive lines.
    pub source: String,
    /// Validated width token (`DEFAULT_WIDTH` when absent or rejected).
    pub width: String,
    /// Height token (`DEFAULT_HEIGHT` when absent; never validated).
    pub height: String,
    /// 0-based occurrence ordinal of this kind within the scan; the cache key.
    pub position: usize,
}

/// A document piece produced by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal lines, passed through untouched.
    Text(String),
    /// A chart block to resolve against the cache.
    Chart(ChartBlock),
}

/// Scan a document body and split it into literal text and chart blocks.
///
/// Position indices are assigned by occurrence order within this scan,
/// independently per kind.
pub fn extract_charts(input: &str, diags: &mut Diagnostics) -> Vec<Segment> {
    let mut scanner = Scanner::new(diags);
    for line in input.lines() {
        scanner.line(line);
    }
    scanner.finish()
}

/// Validate a `+width:` token: it must end in `%` or `px`.
fn validate_width(token: &str, diags: &mut Diagnostics) -> String {
    if token.ends_with('%') || token.ends_with("px") {
        token.to_string()
    } else {
        diags.warn(PreprocessWarning::InvalidWidth {
            token: token.to_string(),
        });
        DEFAULT_WIDTH.to_string()
    }
}

/// A line consisting only of `+`-prefixed tokens.
fn is_directive_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.split_whitespace().all(|tok| tok.starts_with('+'))
}

struct Scanner<'d> {
    diags: &'d mut Diagnostics,
    fences: FenceTracker,
    segments: Vec<Segment>,
    text: String,
    candidate: Option<Candidate>,
    positions: [usize; 2],
}

/// A chart-tagged fence being collected until its closer is seen.
struct Candidate {
    kind: ChartKind,
    /// Directive tokens from the info string, ahead of any body directive lines.
    info_tokens: Vec<String>,
    /// Raw lines (fence opener included) for verbatim replay on fallback.
    raw: Vec<String>,
    body: Vec<String>,
}

impl<'d> Scanner<'d> {
    fn new(diags: &'d mut Diagnostics) -> Self {
        Self {
            diags,
            fences: FenceTracker::new(),
            segments: Vec::new(),
            text: String::new(),
            candidate: None,
            positions: [0; 2],
        }
    }

    fn line(&mut self, line: &str) {
        match self.fences.scan(line) {
            FenceEvent::Open { info } => {
                let mut tokens = info.split_whitespace();
                let kind = tokens.next().and_then(ChartKind::from_fence_tag);
                match kind {
                    Some(kind) => {
                        self.candidate = Some(Candidate {
                            kind,
                            info_tokens: tokens.map(str::to_string).collect(),
                            raw: vec![line.to_string()],
                            body: Vec::new(),
                        });
                    }
                    None => self.push_text(line),
                }
            }
            FenceEvent::Inside => match self.candidate.as_mut() {
                Some(candidate) => {
                    candidate.raw.push(line.to_string());
                    candidate.body.push(line.to_string());
                }
                None => self.push_text(line),
            },
            FenceEvent::Close => match self.candidate.take() {
                Some(candidate) => self.close_candidate(candidate, line),
                None => self.push_text(line),
            },
            FenceEvent::Outside => self.push_text(line),
        }
    }

    fn close_candidate(&mut self, mut candidate: Candidate, closer: &str) {
        let mut tokens = candidate.info_tokens.clone();
        let mut body = candidate.body.as_slice();
        while let Some((first, rest)) = body.split_first() {
            if is_directive_line(first) {
                tokens.extend(first.split_whitespace().map(str::to_string));
                body = rest;
            } else {
                break;
            }
        }

        if !tokens.iter().any(|tok| tok == "+render") {
            candidate.raw.push(closer.to_string());
            for raw in &candidate.raw {
                self.push_text(raw);
            }
            return;
        }

        let mut width = None;
        let mut height = None;
        for tok in &tokens {
            if let Some(value) = tok.strip_prefix("+width:") {
                width = Some(validate_width(value, self.diags));
            } else if let Some(value) = tok.strip_prefix("+height:") {
                height = Some(value.to_string());
            }
        }

        let slot = match candidate.kind {
            ChartKind::Mermaid => 0,
            ChartKind::Typst => 1,
        };
        let position = self.positions[slot];
        self.positions[slot] += 1;

        self.flush_text();
        self.segments.push(Segment::Chart(ChartBlock {
            kind: candidate.kind,
            source: body.join("\n"),
            width: width.unwrap_or_else(|| DEFAULT_WIDTH.to_string()),
            height: height.unwrap_or_else(|| DEFAULT_HEIGHT.to_string()),
            position,
        }));
    }

    fn push_text(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.segments.push(Segment::Text(std::mem::take(&mut self.text)));
        }
    }

    fn finish(mut self) -> Vec<Segment> {
        // An unterminated chart fence is not a chart; replay it verbatim.
        if let Some(candidate) = self.candidate.take() {
            for raw in &candidate.raw {
                self.text.push_str(raw);
                self.text.push('\n');
            }
        }
        self.flush_text();
        self.segments
    }
}
