use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "annotator")]
#[command(about = "Review and annotate medical entities in processed PDF documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Database file (default: the user config dir)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open the annotator (default)
    Open {
        /// Run to open first
        #[arg(long)]
        run: Option<String>,
    },

    /// Store a processed document as a new run
    Import {
        /// The source PDF
        pdf: PathBuf,

        /// OCR response JSON
        #[arg(long)]
        ocr: PathBuf,

        /// Medical notes response JSON
        #[arg(long)]
        notes: PathBuf,

        /// Display name (default: the PDF file name)
        #[arg(long)]
        filename: Option<String>,
    },

    /// List stored runs
    Runs,

    /// Delete a stored run
    Delete {
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_opens_ui() {
        let cli = Cli::parse_from(["annotator"]);
        assert!(cli.command.is_none());
        assert!(cli.db.is_none());
    }

    #[test]
    fn import_takes_payload_paths() {
        let cli = Cli::parse_from([
            "annotator",
            "import",
            "note.pdf",
            "--ocr",
            "ocr.json",
            "--notes",
            "notes.json",
            "--db",
            "/tmp/a.sqlite3",
        ]);
        let Some(Commands::Import {
            pdf, ocr, filename, ..
        }) = cli.command
        else {
            panic!("expected import");
        };
        assert_eq!(pdf, PathBuf::from("note.pdf"));
        assert_eq!(ocr, PathBuf::from("ocr.json"));
        assert_eq!(filename, None);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/a.sqlite3")));
    }
}
