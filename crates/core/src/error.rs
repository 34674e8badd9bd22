use thiserror::Error;

use crate::frontmatter::FrontmatterError;

/// Errors that abort a single preprocessing pass.
///
/// Recoverable conditions (a chart that fails to compile, a malformed
/// directive) never surface here; they are replaced inline or collected as
/// [`PreprocessWarning`]s and the pass continues.
#[derive(Debug, Error)]
pub enum DeckflowError {
    /// IO error while reading the source or writing the intermediate file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The leading metadata block exists but cannot be parsed.
    #[error(transparent)]
    Frontmatter(#[from] FrontmatterError),
}

/// Non-fatal conditions surfaced during a preprocessing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreprocessWarning {
    /// A `+width:` token without a `%` or `px` suffix; `100%` was substituted.
    InvalidWidth {
        /// The rejected token as written in the source.
        token: String,
    },
    /// A `columns:` directive whose width list failed strict parsing; the
    /// line was passed through unchanged.
    MalformedWidthList {
        /// The offending directive line.
        line: String,
        /// Why the list was rejected.
        reason: String,
    },
    /// A `column:` directive that cannot be applied (no open region, or the
    /// index is out of range); the switch was ignored.
    UnusableColumnSwitch {
        /// The offending directive line.
        line: String,
        /// Why the switch was ignored.
        reason: String,
    },
}

impl std::fmt::Display for PreprocessWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessWarning::InvalidWidth { token } => {
                write!(f, "Width '{token}' should end with '%' or 'px'; using 100%")
            }
            PreprocessWarning::MalformedWidthList { line, reason } => {
                write!(f, "Ignoring column widths in '{line}': {reason}")
            }
            PreprocessWarning::UnusableColumnSwitch { line, reason } => {
                write!(f, "Ignoring '{line}': {reason}")
            }
        }
    }
}

/// Warnings collected across one preprocessing pass.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<PreprocessWarning>,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and echo it through the logger.
    pub fn warn(&mut self, warning: PreprocessWarning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Whether any warning was recorded.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Recorded warnings, in the order they were surfaced.
    pub fn warnings(&self) -> &[PreprocessWarning] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_width_message_names_token() {
        let warning = PreprocessWarning::InvalidWidth {
            token: "300".to_string(),
        };
        assert_eq!(
            warning.to_string(),
            "Width '300' should end with '%' or 'px'; using 100%"
        );
    }

    #[test]
    fn diagnostics_collect_in_order() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_warnings());
        diags.warn(PreprocessWarning::InvalidWidth {
            token: "12em".to_string(),
        });
        diags.warn(PreprocessWarning::UnusableColumnSwitch {
            line: "column: 9".to_string(),
            reason: "only 2 columns declared".to_string(),
        });
        assert_eq!(diags.warnings().len(), 2);
        assert!(matches!(
            diags.warnings()[0],
            PreprocessWarning::InvalidWidth { .. }
        ));
    }
}
