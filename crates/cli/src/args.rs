//! Command-line argument definitions for the deckflow CLI.

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for the deckflow slide preprocessor.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input markdown file
    pub input: PathBuf,

    /// Append the raw input source to this archive file
    #[arg(short, long)]
    pub archive: Option<PathBuf>,

    /// CSS file to use as the deck theme
    #[arg(short, long)]
    pub theme: Option<PathBuf>,

    /// Export a PDF instead of opening the live preview
    #[arg(long, conflicts_with = "pptx")]
    pub pdf: bool,

    /// Export a PPTX instead of opening the live preview
    #[arg(long)]
    pub pptx: bool,

    /// Disallow local file references in the renderer
    #[arg(long = "no-local")]
    pub no_local: bool,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

/// Output formats for one-shot export mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Fixed-format PDF export.
    Pdf,
    /// Fixed-format PPTX export.
    Pptx,
}

impl Args {
    /// Requested one-shot export format, if any.
    pub fn export_format(&self) -> Option<ExportFormat> {
        if self.pdf {
            Some(ExportFormat::Pdf)
        } else if self.pptx {
            Some(ExportFormat::Pptx)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_flags_are_mutually_exclusive() {
        let err = Args::try_parse_from(["deckflow", "deck.md", "--pdf", "--pptx"]);
        assert!(err.is_err());
    }

    #[test]
    fn defaults_select_live_preview() {
        let args = Args::try_parse_from(["deckflow", "deck.md"]).unwrap();
        assert_eq!(args.export_format(), None);
        assert!(!args.no_local);
        assert_eq!(args.log_level, "warn");
    }

    #[test]
    fn pdf_flag_selects_export() {
        let args = Args::try_parse_from(["deckflow", "deck.md", "--pdf"]).unwrap();
        assert_eq!(args.export_format(), Some(ExportFormat::Pdf));
    }
}
