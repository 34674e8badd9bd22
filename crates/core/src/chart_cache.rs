//! Positional chart cache and diff engine.
//!
//! Chart identity is the 0-based occurrence ordinal of a kind within one
//! document scan. Inserting or deleting a chart earlier in the document
//! therefore shifts the identity of everything after the edit point and
//! forces those positions to re-render on the next pass. That drift is the
//! documented contract, not an accident to repair here.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::chart_compiler::ChartCompiler;
use crate::charts::{ChartBlock, ChartKind};

/// Opaque identity of one rendered artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactId(String);

static NEXT_ARTIFACT: AtomicU64 = AtomicU64::new(0);

impl ArtifactId {
    /// Mint a token no other artifact of this session carries.
    fn fresh() -> Self {
        let serial = NEXT_ARTIFACT.fetch_add(1, Ordering::Relaxed);
        ArtifactId(format!("{:08x}-{serial:04x}", std::process::id()))
    }

    /// Deterministic artifact file name for this identity.
    pub fn file_name(&self, kind: ChartKind) -> String {
        format!("{}{}.png", kind.artifact_prefix(), self.0)
    }
}

/// Diff outcome for one block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    /// No entry at this position yet; render and append.
    Create,
    /// Entry exists but the source changed; re-render in place.
    Update,
    /// Entry exists with byte-identical source; reference it, no render.
    Reuse,
}

#[derive(Debug)]
enum ArtifactState {
    Rendered(ArtifactId),
    /// The last compile at this position failed; retried on the next pass.
    Failed,
}

#[derive(Debug)]
struct CacheEntry {
    last_source: String,
    artifact: ArtifactState,
}

/// Per-kind positional cache deciding create/update/reuse per block.
///
/// Entry sequences only ever grow within a session and are mutated in
/// place, never reordered. The cache is the sole owner of the entries; the
/// coordinator removes artifact files only at session cleanup.
pub struct ChartCache {
    out_dir: PathBuf,
    entries: [Vec<CacheEntry>; 2],
}

fn slot(kind: ChartKind) -> usize {
    match kind {
        ChartKind::Mermaid => 0,
        ChartKind::Typst => 1,
    }
}

impl ChartCache {
    /// Cache writing artifacts into `out_dir`.
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            entries: [Vec::new(), Vec::new()],
        }
    }

    /// Number of positions ever seen for `kind` in this session.
    pub fn positions_seen(&self, kind: ChartKind) -> usize {
        self.entries[slot(kind)].len()
    }

    /// Classify a block against the current entries.
    pub fn classify(&self, block: &ChartBlock) -> DiffOutcome {
        match self.entries[slot(block.kind)].get(block.position) {
            None => DiffOutcome::Create,
            Some(entry) => {
                let unchanged = entry.last_source == block.source
                    && matches!(entry.artifact, ArtifactState::Rendered(_));
                if unchanged {
                    DiffOutcome::Reuse
                } else {
                    DiffOutcome::Update
                }
            }
        }
    }

    /// Resolve one extracted block into markup, rendering if needed.
    ///
    /// Blocks must arrive in scan order, so a `Create` always appends at
    /// the end of its kind's sequence.
    pub fn resolve(&mut self, block: &ChartBlock, compiler: &dyn ChartCompiler) -> String {
        let outcome = self.classify(block);
        log::debug!(
            "{} chart #{}: {:?}",
            block.kind.fence_tag(),
            block.position,
            outcome
        );

        if let DiffOutcome::Reuse = outcome {
            let entries = &self.entries[slot(block.kind)];
            if let ArtifactState::Rendered(id) = &entries[block.position].artifact {
                return image_markup(&id.file_name(block.kind), block);
            }
            unreachable!("Reuse classified without a rendered artifact");
        }

        if let DiffOutcome::Update = outcome {
            self.remove_stale_artifact(block);
        }

        let id = ArtifactId::fresh();
        let file_name = id.file_name(block.kind);
        let output = self.out_dir.join(&file_name);
        let entry = match compiler.compile(block.kind, &block.source, &output) {
            Ok(()) => CacheEntry {
                last_source: block.source.clone(),
                artifact: ArtifactState::Rendered(id),
            },
            Err(err) => {
                log::error!(
                    "{} chart #{} failed to compile: {err}",
                    block.kind.fence_tag(),
                    block.position
                );
                CacheEntry {
                    last_source: block.source.clone(),
                    artifact: ArtifactState::Failed,
                }
            }
        };

        let rendered = matches!(entry.artifact, ArtifactState::Rendered(_));
        let entries = &mut self.entries[slot(block.kind)];
        if block.position < entries.len() {
            entries[block.position] = entry;
        } else {
            debug_assert_eq!(block.position, entries.len());
            entries.push(entry);
        }

        if rendered {
            image_markup(&file_name, block)
        } else {
            format!("Error rendering {} chart: {}", block.kind, block.source)
        }
    }

    fn remove_stale_artifact(&self, block: &ChartBlock) {
        let entries = &self.entries[slot(block.kind)];
        if let ArtifactState::Rendered(id) = &entries[block.position].artifact {
            let stale = self.out_dir.join(id.file_name(block.kind));
            if let Err(err) = remove_if_present(&stale) {
                log::warn!("could not remove stale artifact {}: {err}", stale.display());
            }
        }
    }
}

fn image_markup(file_name: &str, block: &ChartBlock) -> String {
    let mut markup = String::new();
    write!(
        markup,
        "<img src=\"{file_name}\" width=\"{}\" height=\"{}\"/>",
        block.width, block.height
    )
    .ok();
    markup
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::chart_compiler::CompileError;
    use crate::charts::{DEFAULT_HEIGHT, DEFAULT_WIDTH};

    struct MockCompiler {
        calls: Cell<usize>,
        fail: bool,
    }

    impl MockCompiler {
        fn ok() -> Self {
            Self {
                calls: Cell::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Cell::new(0),
                fail: true,
            }
        }
    }

    impl ChartCompiler for MockCompiler {
        fn compile(
            &self,
            _kind: ChartKind,
            _source: &str,
            output: &Path,
        ) -> Result<(), CompileError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(CompileError::Io(std::io::Error::other("mock failure")));
            }
            fs::write(output, b"png").unwrap();
            Ok(())
        }
    }

    fn block(kind: ChartKind, source: &str, position: usize) -> ChartBlock {
        ChartBlock {
            kind,
            source: source.to_string(),
            width: DEFAULT_WIDTH.to_string(),
            height: DEFAULT_HEIGHT.to_string(),
            position,
        }
    }

    fn artifact_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn identical_source_at_same_position_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ChartCache::new(dir.path());
        let compiler = MockCompiler::ok();

        let first = cache.resolve(&block(ChartKind::Mermaid, "graph TD", 0), &compiler);
        let second = cache.resolve(&block(ChartKind::Mermaid, "graph TD", 0), &compiler);

        assert_eq!(first, second);
        assert_eq!(compiler.calls.get(), 1);
        assert_eq!(artifact_files(dir.path()).len(), 1);
    }

    #[test]
    fn changed_source_replaces_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ChartCache::new(dir.path());
        let compiler = MockCompiler::ok();

        let first = cache.resolve(&block(ChartKind::Mermaid, "graph TD", 0), &compiler);
        let before = artifact_files(dir.path());
        let second = cache.resolve(&block(ChartKind::Mermaid, "graph LR", 0), &compiler);
        let after = artifact_files(dir.path());

        assert_ne!(first, second, "update must mint a fresh artifact identity");
        assert_eq!(compiler.calls.get(), 2);
        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 1);
        assert_ne!(before, after, "the stale artifact file must be deleted");
    }

    #[test]
    fn insertion_shifts_every_later_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ChartCache::new(dir.path());
        let compiler = MockCompiler::ok();

        // First pass: charts A and B at positions 0 and 1.
        cache.resolve(&block(ChartKind::Mermaid, "A", 0), &compiler);
        cache.resolve(&block(ChartKind::Mermaid, "B", 1), &compiler);
        assert_eq!(compiler.calls.get(), 2);

        // Second pass after inserting N before A: every position re-renders.
        assert_eq!(cache.classify(&block(ChartKind::Mermaid, "N", 0)), DiffOutcome::Update);
        cache.resolve(&block(ChartKind::Mermaid, "N", 0), &compiler);
        assert_eq!(cache.classify(&block(ChartKind::Mermaid, "A", 1)), DiffOutcome::Update);
        cache.resolve(&block(ChartKind::Mermaid, "A", 1), &compiler);
        assert_eq!(cache.classify(&block(ChartKind::Mermaid, "B", 2)), DiffOutcome::Create);
        cache.resolve(&block(ChartKind::Mermaid, "B", 2), &compiler);

        assert_eq!(compiler.calls.get(), 5);
        assert_eq!(cache.positions_seen(ChartKind::Mermaid), 3);
    }

    #[test]
    fn kinds_keep_independent_positions() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ChartCache::new(dir.path());
        let compiler = MockCompiler::ok();

        cache.resolve(&block(ChartKind::Mermaid, "graph TD", 0), &compiler);
        cache.resolve(&block(ChartKind::Typst, "#circle()", 0), &compiler);

        assert_eq!(cache.positions_seen(ChartKind::Mermaid), 1);
        assert_eq!(cache.positions_seen(ChartKind::Typst), 1);
        let files = artifact_files(dir.path());
        assert!(files.iter().any(|name| name.starts_with("deckflow-mmd-")));
        assert!(files.iter().any(|name| name.starts_with("deckflow-typ-")));
    }

    #[test]
    fn failed_render_emits_error_marker_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ChartCache::new(dir.path());

        let failing = MockCompiler::failing();
        let markup = cache.resolve(&block(ChartKind::Mermaid, "graph TD", 0), &failing);
        assert_eq!(markup, "Error rendering Mermaid chart: graph TD");
        assert!(artifact_files(dir.path()).is_empty());

        // Same source, same position: a failure is never reused.
        let working = MockCompiler::ok();
        let retry = cache.resolve(&block(ChartKind::Mermaid, "graph TD", 0), &working);
        assert_eq!(working.calls.get(), 1);
        assert!(retry.starts_with("<img src=\"deckflow-mmd-"));
    }

    #[test]
    fn cache_never_shrinks_when_charts_disappear() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ChartCache::new(dir.path());
        let compiler = MockCompiler::ok();

        cache.resolve(&block(ChartKind::Mermaid, "A", 0), &compiler);
        cache.resolve(&block(ChartKind::Mermaid, "B", 1), &compiler);

        // Next pass only sees one chart; the second entry stays put.
        cache.resolve(&block(ChartKind::Mermaid, "A", 0), &compiler);
        assert_eq!(cache.positions_seen(ChartKind::Mermaid), 2);
    }

    #[test]
    fn markup_carries_size_hints() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ChartCache::new(dir.path());
        let compiler = MockCompiler::ok();

        let mut sized = block(ChartKind::Typst, "#circle()", 0);
        sized.width = "300px".to_string();
        sized.height = "50%".to_string();
        let markup = cache.resolve(&sized, &compiler);
        assert!(markup.ends_with("width=\"300px\" height=\"50%\"/>"));
    }
}
