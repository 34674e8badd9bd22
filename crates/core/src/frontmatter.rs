//! YAML front matter extraction and title-slide assembly.

use std::fmt::Write as _;

use serde::Deserialize;
use thiserror::Error;

/// Errors emitted while parsing the leading metadata block.
#[derive(Debug, Error)]
pub enum FrontmatterError {
    /// Opening marker without a matching closing `---`.
    #[error("Unterminated metadata block: expected closing '---'")]
    Unterminated,
    /// YAML failed to parse.
    #[error("Metadata parse error: {0}")]
    Parse(String),
}

/// Typed deck metadata from the leading YAML block. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckMeta {
    /// Deck title, rendered as the level-1 heading of the title slide.
    pub title: Option<String>,
    /// Subtitle; takes the byline slot over the author list when present.
    pub subtitle: Option<String>,
    /// Authors, merged from the `author` and `authors` fields.
    pub authors: Vec<String>,
    /// Affiliations.
    pub affiliations: Vec<String>,
    /// Theme name, passed through for the renderer's benefit.
    pub theme: Option<String>,
}

/// A leading metadata block split off the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Frontmatter {
    /// Raw YAML between the marker lines, markers excluded.
    pub raw: String,
    /// Parsed fields used for the title slide.
    pub meta: DeckMeta,
}

/// Permissive author/affiliation field: scalar, mapping, or list of either.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entries {
    One(Entry),
    Many(Vec<Entry>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Name(String),
    Detailed {
        name: String,
    },
}

impl Entries {
    fn into_names(self) -> Vec<String> {
        let entries = match self {
            Entries::One(entry) => vec![entry],
            Entries::Many(entries) => entries,
        };
        entries
            .into_iter()
            .map(|entry| match entry {
                Entry::Name(name) | Entry::Detailed { name } => name,
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMeta {
    title: Option<String>,
    subtitle: Option<String>,
    author: Option<Entries>,
    authors: Option<Entries>,
    affiliations: Option<Entries>,
    theme: Option<String>,
}

impl From<RawMeta> for DeckMeta {
    fn from(raw: RawMeta) -> Self {
        let mut authors = Vec::new();
        if let Some(entries) = raw.author {
            authors.extend(entries.into_names());
        }
        if let Some(entries) = raw.authors {
            authors.extend(entries.into_names());
        }
        DeckMeta {
            title: raw.title,
            subtitle: raw.subtitle,
            authors,
            affiliations: raw
                .affiliations
                .map(Entries::into_names)
                .unwrap_or_default(),
            theme: raw.theme,
        }
    }
}

/// Split a leading metadata block off `input`.
///
/// Returns `None` when the document does not begin with a marker line; the
/// caller passes such documents through unmodified. An opened block without
/// a closing marker is an error.
pub fn extract_frontmatter(input: &str) -> Result<Option<(Frontmatter, &str)>, FrontmatterError> {
    let stripped = input.strip_prefix('\u{feff}').unwrap_or(input);

    let (first, block_start) = match next_line(stripped, 0) {
        Some(line) => line,
        None => return Ok(None),
    };
    if !is_marker(first) {
        return Ok(None);
    }

    let mut cursor = block_start;
    loop {
        let line_start = cursor;
        match next_line(stripped, cursor) {
            Some((line, next)) => {
                if is_marker(line) {
                    let raw = &stripped[block_start..line_start];
                    let meta = parse_meta(raw)?;
                    let front = Frontmatter {
                        raw: raw.to_string(),
                        meta,
                    };
                    return Ok(Some((front, &stripped[next..])));
                }
                cursor = next;
            }
            None => return Err(FrontmatterError::Unterminated),
        }
    }
}

fn parse_meta(raw: &str) -> Result<DeckMeta, FrontmatterError> {
    if raw.trim().is_empty() {
        return Ok(DeckMeta::default());
    }
    let parsed: RawMeta =
        serde_yaml::from_str(raw).map_err(|err| FrontmatterError::Parse(err.to_string()))?;
    Ok(parsed.into())
}

fn next_line(input: &str, start: usize) -> Option<(&str, usize)> {
    if start >= input.len() {
        return None;
    }
    let bytes = &input.as_bytes()[start..];
    match bytes.iter().position(|b| *b == b'\n') {
        Some(pos) => Some((&input[start..start + pos], start + pos + 1)),
        None => Some((&input[start..], input.len())),
    }
}

fn is_marker(line: &str) -> bool {
    line.trim_end_matches('\r') == "---"
}

/// Marp class marker carried on the generated title slide.
const FRONT_PAGE_CLASS: &str = "<!-- _class: front-page -->";

/// Render the title slide for the given metadata.
///
/// `date` is the preformatted date line, kept as a parameter so tests are
/// not pinned to the wall clock.
pub fn title_slide(meta: &DeckMeta, date: &str) -> String {
    let mut out = String::new();
    out.push_str(FRONT_PAGE_CLASS);
    out.push('\n');

    if let Some(title) = &meta.title {
        writeln!(out, "# {title}").ok();
    }
    if let Some(subtitle) = &meta.subtitle {
        writeln!(out, "\n## {subtitle}").ok();
    } else if !meta.authors.is_empty() {
        writeln!(out, "\n## {}", meta.authors.join(" ")).ok();
    }
    if !meta.affiliations.is_empty() {
        writeln!(out, "\n### {}", meta.affiliations.join(", ")).ok();
    }
    writeln!(out, "\n### {date}").ok();
    out
}

/// Assemble the intermediate document: the original metadata block, the
/// generated title slide, a slide separator, then the processed remainder.
pub fn assemble(front: &Frontmatter, body: &str, date: &str) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&front.raw);
    if !front.raw.is_empty() && !front.raw.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n\n");
    out.push_str(&title_slide(&front.meta, date));
    out.push_str("\n---\n");
    out.push_str(body);
    out
}
