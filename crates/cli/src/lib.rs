#![deny(missing_docs)]
//! deckflow CLI: argument surface and watch/render coordination around the
//! core preprocessing pipeline.

/// Command-line argument definitions.
pub mod args;
/// Session teardown.
pub mod cleanup;
/// Deck renderer invocation.
pub mod render;
/// Watch/render coordination.
pub mod watch;

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use deckflow_core::{DeckflowError, Preprocessor};

pub use args::{Args, ExportFormat};
pub use watch::{Phase, WatchSession};

/// Fatal errors for one CLI invocation.
#[derive(Debug, Error)]
pub enum CliError {
    /// The input file does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),
    /// The supplied theme file does not exist.
    #[error("theme file not found: {0}")]
    MissingTheme(PathBuf),
    /// A preprocessing pass failed before any watching started.
    #[error(transparent)]
    Core(#[from] DeckflowError),
    /// IO error outside the pipeline.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The filesystem watcher could not be set up.
    #[error("could not watch {path}: {source}")]
    Watch {
        /// What the watcher was pointed at.
        path: PathBuf,
        /// Underlying watcher error.
        source: notify::Error,
    },
    /// The deck renderer failed in one-shot export mode.
    #[error("renderer failed: {0}")]
    Renderer(String),
    /// The interrupt handler could not be installed.
    #[error("could not install interrupt handler: {0}")]
    Interrupt(#[from] ctrlc::Error),
}

/// Run one deckflow invocation to completion.
///
/// Missing input or theme files are fatal before anything is written. The
/// session always ends in cleanup, whether it finishes normally, fails, or
/// is interrupted.
pub fn run(args: &Args) -> Result<(), CliError> {
    watch::enter(Phase::Idle);

    if !args.input.is_file() {
        return Err(CliError::MissingInput(args.input.clone()));
    }
    if let Some(theme) = &args.theme
        && !theme.is_file()
    {
        return Err(CliError::MissingTheme(theme.clone()));
    }

    let session = WatchSession::new(args.input.clone(), args.theme.clone());
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            cancel.store(true, Ordering::SeqCst);
        })?;
    }

    let preprocessor = Preprocessor::new(session.artifact_dir());
    let result = run_session(args, &session, preprocessor, &cancel);

    watch::enter(Phase::CleaningUp);
    let removed = cleanup::clean_session(&session);
    log::info!("cleanup removed {removed} session files");
    watch::enter(Phase::Terminated);
    result
}

/// First pipeline pass, optional archive append, then the requested mode.
fn run_session(
    args: &Args,
    session: &WatchSession,
    mut preprocessor: Preprocessor,
    cancel: &Arc<AtomicBool>,
) -> Result<(), CliError> {
    preprocessor.run_file(session.input(), session.intermediate())?;

    if let Some(archive) = &args.archive {
        append_archive(session.input(), archive)?;
    }

    match args.export_format() {
        Some(format) => {
            watch::enter(Phase::Rendering);
            render::run_export(args, session, format, cancel)
        }
        None => watch::run_watch(args, session, preprocessor, Arc::clone(cancel)),
    }
}

/// Append the raw input source to the archive file, creating it if needed.
pub fn append_archive(input: &Path, archive: &Path) -> Result<(), CliError> {
    let content = fs::read_to_string(input)?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(archive)?;
    file.write_all(content.as_bytes())?;
    log::info!("archived {} into {}", input.display(), archive.display());
    Ok(())
}
