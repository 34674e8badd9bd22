//! External diagram compiler invocation.
//!
//! The cache engine talks to compilers through the [`ChartCompiler`] trait;
//! [`CommandCompiler`] is the production implementation shelling out to
//! `mmdc` and `typst`.

use std::io::Write as _;
use std::path::Path;
use std::process::Command;

use thiserror::Error;

use crate::charts::ChartKind;

/// Error from one external compile attempt.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The compiler binary could not be launched at all.
    #[error("failed to launch {command}: {source}")]
    Launch {
        /// Name of the compiler binary.
        command: &'static str,
        /// Underlying launch error.
        source: std::io::Error,
    },
    /// The compiler ran but exited non-zero.
    #[error("{command} exited with {status}")]
    Failed {
        /// Name of the compiler binary.
        command: &'static str,
        /// Reported exit status.
        status: std::process::ExitStatus,
    },
    /// IO error while staging the compiler input.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Seam to the external diagram compilers.
///
/// Contract: exit successfully and produce `output`, or fail and produce
/// nothing.
pub trait ChartCompiler {
    /// Compile `source` of the given kind into a PNG at `output`.
    fn compile(&self, kind: ChartKind, source: &str, output: &Path) -> Result<(), CompileError>;
}

/// Compiles charts by invoking the real toolchain binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandCompiler;

fn command_name(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Mermaid => "mmdc",
        ChartKind::Typst => "typst",
    }
}

impl ChartCompiler for CommandCompiler {
    fn compile(&self, kind: ChartKind, source: &str, output: &Path) -> Result<(), CompileError> {
        let mut input = tempfile::Builder::new()
            .prefix("deckflow-src-")
            .suffix(&format!(".{}", kind.source_extension()))
            .tempfile()?;
        input.write_all(source.as_bytes())?;
        input.write_all(b"\n")?;
        input.flush()?;

        let command = command_name(kind);
        let mut invocation = Command::new(command);
        match kind {
            ChartKind::Mermaid => {
                invocation
                    .arg("-i")
                    .arg(input.path())
                    .arg("-o")
                    .arg(output)
                    .args(["-b", "transparent"]);
            }
            ChartKind::Typst => {
                invocation
                    .arg("compile")
                    .args(["--format", "png"])
                    .arg(input.path())
                    .arg(output);
            }
        }

        log::debug!("running {command} for {} chart", kind.fence_tag());
        let status = invocation
            .status()
            .map_err(|source| CompileError::Launch { command, source })?;
        if status.success() {
            Ok(())
        } else {
            Err(CompileError::Failed { command, status })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_match_toolchain() {
        assert_eq!(command_name(ChartKind::Mermaid), "mmdc");
        assert_eq!(command_name(ChartKind::Typst), "typst");
    }

    #[test]
    fn failed_status_formats_command_name() {
        let err = CompileError::Launch {
            command: "mmdc",
            source: std::io::Error::other("not found"),
        };
        assert!(err.to_string().contains("mmdc"));
    }
}
