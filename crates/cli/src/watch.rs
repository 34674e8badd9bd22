//! Watch/render coordination.
//!
//! One watch session runs two concurrent activities: a filesystem watcher
//! feeding debounced change events to a single regeneration worker, and
//! the external deck renderer in live-preview mode. The preprocessor (and
//! with it the chart cache) sits behind a mutex so only one pipeline pass
//! ever runs at a time, and the intermediate file is written atomically by
//! the pipeline, so the renderer never reads a partial document.

use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};

use deckflow_core::{ChartKind, Preprocessor};

use crate::render;
use crate::{Args, CliError};

/// File name of the intermediate markdown handed to the renderer.
pub const INTERMEDIATE_MD: &str = "deckflow-tmp.md";
/// File name of the HTML the renderer may leave alongside it.
pub const INTERMEDIATE_HTML: &str = "deckflow-tmp.html";

/// Quiet interval required after the last change event before regenerating.
const DEBOUNCE: Duration = Duration::from_millis(200);
/// How often the worker wakes to check for cancellation.
const POLL: Duration = Duration::from_millis(150);
/// How often the renderer child is polled for unexpected exit.
const RENDERER_POLL: Duration = Duration::from_millis(500);

/// Coordinator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the first pipeline pass.
    Idle,
    /// Watching the source and regenerating on change.
    Watching,
    /// Running the renderer to completion (one-shot export).
    Rendering,
    /// Tearing down session files.
    CleaningUp,
    /// Session over.
    Terminated,
}

/// Logs a phase transition.
pub fn enter(phase: Phase) {
    log::debug!("coordinator phase: {phase:?}");
}

/// Session-scoped file inventory.
///
/// The coordinator owns this for the duration of one invocation and is the
/// only component that deletes the files listed here.
#[derive(Debug, Clone)]
pub struct WatchSession {
    input: PathBuf,
    artifact_dir: PathBuf,
    intermediate: PathBuf,
    intermediate_html: PathBuf,
    theme: Option<PathBuf>,
}

impl WatchSession {
    /// Session rooted in the process working directory.
    pub fn new(input: PathBuf, theme: Option<PathBuf>) -> Self {
        Self::rooted(input, theme, PathBuf::from("."))
    }

    /// Session with an explicit directory for intermediate files and
    /// artifacts.
    pub fn rooted(input: PathBuf, theme: Option<PathBuf>, dir: PathBuf) -> Self {
        Self {
            input,
            intermediate: dir.join(INTERMEDIATE_MD),
            intermediate_html: dir.join(INTERMEDIATE_HTML),
            artifact_dir: dir,
            theme,
        }
    }

    /// The tracked source file.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// The intermediate markdown file handed to the renderer.
    pub fn intermediate(&self) -> &Path {
        &self.intermediate
    }

    /// Directory that receives chart artifacts.
    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Session files removed one by one at cleanup (artifacts are swept by
    /// prefix instead).
    pub fn ephemeral_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.intermediate.clone(), self.intermediate_html.clone()];
        if let Some(theme) = &self.theme {
            files.push(theme.clone());
        }
        files
    }

    /// Whether `file_name` matches the session's artifact naming pattern.
    pub fn is_artifact_name(name: &str) -> bool {
        name.ends_with(".png")
            && ChartKind::ALL
                .iter()
                .any(|kind| name.starts_with(&kind.artifact_prefix()))
    }
}

/// Run the watch loop until cancelled.
///
/// The renderer child is monitored but its failure does not end the
/// session; the watcher keeps running until the cancellation flag is set.
pub fn run_watch(
    args: &Args,
    session: &WatchSession,
    preprocessor: Preprocessor,
    cancel: Arc<AtomicBool>,
) -> Result<(), CliError> {
    let preprocessor = Mutex::new(preprocessor);
    let (tx, rx) = mpsc::channel::<()>();

    let target = session.input().to_path_buf();
    let mut watcher = notify::recommended_watcher(
        move |event: Result<notify::Event, notify::Error>| match event {
            Ok(event) if is_relevant(&event, &target) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(err) => log::warn!("watch error: {err}"),
        },
    )
    .map_err(|source| CliError::Watch {
        path: session.input().to_path_buf(),
        source,
    })?;

    let watch_dir = match session.input().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .map_err(|source| CliError::Watch {
            path: watch_dir.clone(),
            source,
        })?;

    // A renderer that cannot start (or later dies) does not end the
    // session; the watcher keeps regenerating the intermediate file.
    let child = match render::spawn_preview(args, session) {
        Ok(child) => Some(child),
        Err(err) => {
            log::error!("{err}; watch continues without a preview");
            None
        }
    };
    let child = Arc::new(Mutex::new(child));
    let monitor = spawn_renderer_monitor(Arc::clone(&child));

    enter(Phase::Watching);
    log::info!("watching {}", session.input().display());

    // Covers the synchronous pass that ran before the watcher started.
    let mut last_regeneration = Instant::now();
    while !cancel.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL) {
            Ok(()) => {
                // Coalesce the burst: wait for a quiet interval.
                while rx.recv_timeout(DEBOUNCE).is_ok() {}
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                log::debug!(
                    "last regeneration {:.1}s ago",
                    last_regeneration.elapsed().as_secs_f32()
                );
                regenerate(&preprocessor, session);
                last_regeneration = Instant::now();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    shutdown_renderer(&child);
    drop(watcher);
    monitor.join().ok();
    Ok(())
}

/// One serialized pipeline pass. Failures are logged; the session survives.
fn regenerate(preprocessor: &Mutex<Preprocessor>, session: &WatchSession) {
    log::info!("{} changed; regenerating", session.input().display());
    match preprocessor.lock() {
        Ok(mut pipeline) => {
            if let Err(err) = pipeline.run_file(session.input(), session.intermediate()) {
                log::error!("regeneration failed: {err}");
            }
        }
        Err(_) => log::error!("preprocessor lock poisoned; skipping regeneration"),
    }
}

fn is_relevant(event: &notify::Event, target: &Path) -> bool {
    use notify::EventKind;

    let interesting = matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    );
    interesting
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == target.file_name())
}

/// Watches the renderer child for an exit the coordinator did not request.
/// A dead renderer does not stop the watch session.
fn spawn_renderer_monitor(child: Arc<Mutex<Option<Child>>>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            thread::sleep(RENDERER_POLL);
            let mut guard = match child.lock() {
                Ok(guard) => guard,
                Err(_) => break,
            };
            match guard.as_mut() {
                // The coordinator already took the child for shutdown.
                None => break,
                Some(renderer) => match renderer.try_wait() {
                    Ok(Some(status)) => {
                        if status.success() {
                            log::info!("renderer exited");
                        } else {
                            log::error!("renderer exited with {status}; watch continues");
                        }
                        guard.take();
                        break;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        log::warn!("could not poll renderer: {err}");
                    }
                },
            }
        }
    })
}

fn shutdown_renderer(child: &Arc<Mutex<Option<Child>>>) {
    if let Ok(mut guard) = child.lock()
        && let Some(mut renderer) = guard.take()
    {
        let _ = renderer.kill();
        let _ = renderer.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_match_both_kinds() {
        assert!(WatchSession::is_artifact_name("deckflow-mmd-0000abcd-0001.png"));
        assert!(WatchSession::is_artifact_name("deckflow-typ-0000abcd-0002.png"));
        assert!(!WatchSession::is_artifact_name("deckflow-tmp.md"));
        assert!(!WatchSession::is_artifact_name("photo.png"));
        assert!(!WatchSession::is_artifact_name("deckflow-mmd-notes.txt"));
    }

    #[test]
    fn ephemeral_files_include_theme_only_when_supplied() {
        let bare = WatchSession::rooted("deck.md".into(), None, "/tmp/session".into());
        assert_eq!(bare.ephemeral_files().len(), 2);

        let themed = WatchSession::rooted(
            "deck.md".into(),
            Some("theme.css".into()),
            "/tmp/session".into(),
        );
        let files = themed.ephemeral_files();
        assert_eq!(files.len(), 3);
        assert!(files.contains(&PathBuf::from("theme.css")));
    }

    #[test]
    fn modify_events_for_the_target_are_relevant() {
        let event = notify::Event::new(notify::EventKind::Modify(
            notify::event::ModifyKind::Any,
        ))
        .add_path(PathBuf::from("/work/deck.md"));
        assert!(is_relevant(&event, Path::new("deck.md")));
        assert!(!is_relevant(&event, Path::new("other.md")));
    }
}
