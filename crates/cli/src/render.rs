//! Deck renderer invocation.
//!
//! The renderer is an opaque collaborator: it reads the intermediate
//! markdown file and either serves a live preview (left running until the
//! session ends) or produces one fixed-format export and exits.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::args::ExportFormat;
use crate::watch::WatchSession;
use crate::{Args, CliError};

/// Deck renderer binary.
const RENDERER: &str = "marp";
/// Bound on a one-shot export; live preview has no timeout.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(120);
const EXPORT_POLL: Duration = Duration::from_millis(200);

impl ExportFormat {
    fn renderer_flag(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "--pdf",
            ExportFormat::Pptx => "--pptx",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Pptx => "pptx",
        }
    }
}

fn base_command(args: &Args, session: &WatchSession) -> Command {
    let mut command = Command::new(RENDERER);
    command.arg(session.intermediate()).arg("--html");
    if let Some(theme) = &args.theme {
        command.arg("--theme").arg(theme);
    }
    if !args.no_local {
        command.arg("--allow-local-files");
    }
    command
}

/// Launch the renderer in live-preview mode.
pub fn spawn_preview(args: &Args, session: &WatchSession) -> Result<Child, CliError> {
    let mut command = base_command(args, session);
    command.arg("--watch").arg("--preview");
    log::info!("starting {RENDERER} preview");
    command
        .spawn()
        .map_err(|err| CliError::Renderer(format!("failed to launch {RENDERER}: {err}")))
}

/// Where a one-shot export lands, next to the input file.
pub fn export_path(input: &Path, format: ExportFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "deck".to_string());
    input.with_file_name(format!("{stem}-deck.{}", format.extension()))
}

/// Run a one-shot export to completion with a bounded wait.
///
/// A non-zero exit is fatal for this invocation. Cancellation kills the
/// renderer and returns cleanly; an interrupted session is not an error.
pub fn run_export(
    args: &Args,
    session: &WatchSession,
    format: ExportFormat,
    cancel: &Arc<AtomicBool>,
) -> Result<(), CliError> {
    let output = export_path(&args.input, format);
    let mut command = base_command(args, session);
    command.arg(format.renderer_flag()).arg("-o").arg(&output);

    log::info!("exporting {}", output.display());
    let mut child = command
        .spawn()
        .map_err(|err| CliError::Renderer(format!("failed to launch {RENDERER}: {err}")))?;

    let deadline = Instant::now() + EXPORT_TIMEOUT;
    loop {
        if cancel.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            log::info!("export interrupted");
            return Ok(());
        }
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => {
                return Err(CliError::Renderer(format!("{RENDERER} exited with {status}")));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CliError::Renderer(format!(
                        "{RENDERER} did not finish within {}s",
                        EXPORT_TIMEOUT.as_secs()
                    )));
                }
                thread::sleep(EXPORT_POLL);
            }
            Err(err) => return Err(CliError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_path_keeps_directory_and_stem() {
        let out = export_path(Path::new("talks/deck.md"), ExportFormat::Pdf);
        assert_eq!(out, PathBuf::from("talks/deck-deck.pdf"));

        let out = export_path(Path::new("deck.md"), ExportFormat::Pptx);
        assert_eq!(out, PathBuf::from("deck-deck.pptx"));
    }
}
