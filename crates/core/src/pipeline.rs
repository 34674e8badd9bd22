//! Document-level preprocessing pipeline.
//!
//! One [`Preprocessor`] lives for the whole watch session: it owns the
//! chart cache, so repeated passes over the same source reuse artifacts
//! that have not changed. Everything else is recomputed per pass.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::chart_cache::ChartCache;
use crate::chart_compiler::{ChartCompiler, CommandCompiler};
use crate::charts::{self, Segment};
use crate::columns;
use crate::error::{DeckflowError, Diagnostics};
use crate::frontmatter;

/// The stateful preprocessing pipeline.
pub struct Preprocessor {
    cache: ChartCache,
    compiler: Box<dyn ChartCompiler + Send>,
}

impl Preprocessor {
    /// Pipeline shelling out to the real diagram compilers, with artifacts
    /// written into `out_dir`.
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self::with_compiler(out_dir, CommandCompiler)
    }

    /// Pipeline with a custom compiler (tests, alternate toolchains).
    pub fn with_compiler(
        out_dir: impl Into<PathBuf>,
        compiler: impl ChartCompiler + Send + 'static,
    ) -> Self {
        Self {
            cache: ChartCache::new(out_dir),
            compiler: Box::new(compiler),
        }
    }

    /// Transform one source snapshot into intermediate markdown.
    ///
    /// Chart failures and malformed directives are recoverable: they are
    /// replaced inline or defaulted, recorded in the returned
    /// [`Diagnostics`], and never abort the pass.
    pub fn preprocess(&mut self, input: &str) -> Result<(String, Diagnostics), DeckflowError> {
        let mut diags = Diagnostics::new();

        let split = frontmatter::extract_frontmatter(input)?;
        let body = match &split {
            Some((_, body)) => *body,
            None => input,
        };

        let mut resolved = String::new();
        for segment in charts::extract_charts(body, &mut diags) {
            match segment {
                Segment::Text(text) => resolved.push_str(&text),
                Segment::Chart(block) => {
                    let markup = self.cache.resolve(&block, self.compiler.as_ref());
                    resolved.push_str(&markup);
                    resolved.push('\n');
                }
            }
        }

        let resolved = columns::resolve_columns(&resolved, &mut diags);

        let output = match &split {
            Some((front, _)) => frontmatter::assemble(front, &resolved, &today()),
            None => resolved,
        };
        Ok((output, diags))
    }

    /// Run one pass from `source` to `dest`, writing the result atomically
    /// so a concurrent reader never observes a partial file.
    pub fn run_file(&mut self, source: &Path, dest: &Path) -> Result<Diagnostics, DeckflowError> {
        let input = std::fs::read_to_string(source)?;
        let (output, diags) = self.preprocess(&input)?;
        write_atomic(dest, &output)?;
        log::info!("regenerated {}", dest.display());
        Ok(diags)
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Write-to-temp-then-rename in the destination directory.
fn write_atomic(dest: &Path, contents: &str) -> Result<(), DeckflowError> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(contents.as_bytes())?;
    staged
        .persist(dest)
        .map_err(|err| DeckflowError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::chart_compiler::CompileError;
    use crate::charts::ChartKind;

    struct StubCompiler;

    impl ChartCompiler for StubCompiler {
        fn compile(
            &self,
            _kind: ChartKind,
            _source: &str,
            output: &Path,
        ) -> Result<(), CompileError> {
            std::fs::write(output, b"png")?;
            Ok(())
        }
    }

    #[test]
    fn plain_document_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Preprocessor::with_compiler(dir.path(), StubCompiler);
        let (out, diags) = pipeline.preprocess("# Hello\n\nworld\n").unwrap();
        assert_eq!(out, "# Hello\n\nworld\n");
        assert!(!diags.has_warnings());
    }

    #[test]
    fn charts_resolve_before_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Preprocessor::with_compiler(dir.path(), StubCompiler);
        let input = "columns: [1, 1]\n```mermaid +render\ngraph TD\n```\ncolumn: 2\ntext\nreset\n";
        let (out, _) = pipeline.preprocess(input).unwrap();
        // The chart's markup lands inside the first column.
        let first_column = out.find("width: 50.00%").unwrap();
        let img = out.find("<img src=\"deckflow-mmd-").unwrap();
        assert!(img > first_column);
        assert!(out.contains("text\n"));
    }

    #[test]
    fn run_file_writes_complete_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("deck.md");
        let dest = dir.path().join("deckflow-tmp.md");
        std::fs::write(&source, "# One\n").unwrap();

        let mut pipeline = Preprocessor::with_compiler(dir.path(), StubCompiler);
        pipeline.run_file(&source, &dest).unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "# One\n");
        // No stray staging file may survive the rename.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|entry| {
                let name = entry.file_name();
                name != "deck.md" && name != "deckflow-tmp.md"
            })
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn missing_source_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Preprocessor::with_compiler(dir.path(), StubCompiler);
        let err = pipeline
            .run_file(&dir.path().join("absent.md"), &dir.path().join("out.md"))
            .unwrap_err();
        assert!(matches!(err, DeckflowError::Io(_)));
    }
}
