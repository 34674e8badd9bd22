//! Session teardown.
//!
//! Cleanup runs on every exit path, normal completion and interruption
//! alike, and must be idempotent: a file that is already gone is not an
//! error.

use std::fs;
use std::path::Path;

use crate::watch::WatchSession;

/// Remove every session-scoped file: the intermediate markdown and HTML,
/// the supplied theme file, and all chart artifacts matching the session's
/// naming pattern. Returns how many files were actually removed.
pub fn clean_session(session: &WatchSession) -> usize {
    let mut removed = 0;
    for path in session.ephemeral_files() {
        removed += remove_quietly(&path);
    }
    removed + sweep_artifacts(session.artifact_dir())
}

fn remove_quietly(path: &Path) -> usize {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("removed {}", path.display());
            1
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
        Err(err) => {
            log::warn!("could not remove {}: {err}", path.display());
            0
        }
    }
}

/// Delete every artifact file in `dir`, regardless of cache state.
fn sweep_artifacts(dir: &Path) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("could not scan {}: {err}", dir.display());
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if WatchSession::is_artifact_name(&name.to_string_lossy()) {
            removed += remove_quietly(&entry.path());
        }
    }
    removed
}
