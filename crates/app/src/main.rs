use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use annotator_application::AppContext;
use annotator_application::lookup::StaticCodeTable;
use annotator_application::pipeline::{PipelineProgress, StepStatus, run_pipeline};
use annotator_core::RunData;
use annotator_engine::Engine;
use annotator_storage::Storage;
use annotator_ui::Ui;
use anyhow::Context as _;
use clap::Parser;
use directories::ProjectDirs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod replay;

use cli::{Cli, Commands};
use replay::ReplayPipeline;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let project_dirs =
        ProjectDirs::from("dev", "annotator", "annotator").context("resolve project dirs")?;
    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir)
        .with_context(|| format!("create config dir {}", config_dir.display()))?;
    init_logging(&config_dir.join("annotator.log"))?;

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config_dir.join("annotator.db"));
    let storage = Storage::open(&db_path)?;

    match cli.command {
        None => open_ui(storage, None),
        Some(Commands::Open { run }) => open_ui(storage, run),
        Some(Commands::Import {
            pdf,
            ocr,
            notes,
            filename,
        }) => import_run(&storage, &pdf, ocr, notes, filename),
        Some(Commands::Runs) => {
            for run in storage.list_runs()? {
                println!("{}\t{}", run.id, run.filename);
            }
            Ok(())
        }
        Some(Commands::Delete { id }) => {
            if storage.delete_run(&id)? {
                info!(run = %id, "run deleted");
                println!("deleted {id}");
                Ok(())
            } else {
                anyhow::bail!("unknown run {id}")
            }
        }
    }
}

fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let filter =
        EnvFilter::try_from_env("ANNOTATOR_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("init logging: {err}"))?;
    Ok(())
}

fn open_ui(storage: Storage, first_run: Option<String>) -> anyhow::Result<()> {
    let settings = storage.load_settings()?;
    let runs = storage.list_runs()?;
    if let Some(id) = &first_run {
        anyhow::ensure!(runs.iter().any(|run| &run.id == id), "unknown run {id}");
    }
    info!(runs = runs.len(), "starting annotator");

    let ctx = AppContext::new(settings, Instant::now()).with_runs(runs);
    let mut ui = Ui::new(
        ctx,
        storage,
        Engine::new(),
        Box::new(StaticCodeTable::builtin()),
        first_run.as_deref(),
    );
    let ctx = ui.run()?;
    ui.storage().save_settings(&ctx.settings)?;
    Ok(())
}

fn import_run(
    storage: &Storage,
    pdf: &Path,
    ocr: PathBuf,
    notes: PathBuf,
    filename: Option<String>,
) -> anyhow::Result<()> {
    let filename = match filename {
        Some(name) => name,
        None => pdf
            .file_name()
            .and_then(|name| name.to_str())
            .context("PDF path has no file name")?
            .to_string(),
    };
    let pdf_path = fs::canonicalize(pdf).unwrap_or_else(|_| pdf.to_path_buf());
    match Engine::new().page_count(&pdf_path) {
        Ok(pages) => info!(pages, "source document opened"),
        Err(err) => warn!(error = %err, "source document not readable; storing anyway"),
    }

    let mut pipeline = ReplayPipeline::new(ocr, notes);
    let mut progress = PipelineProgress::default();
    let output = run_pipeline(&mut pipeline, &pdf_path, &mut progress, print_progress)?;

    let id = run_id(&filename);
    let data = RunData {
        pdf_path: pdf_path.to_string_lossy().to_string(),
        ocr: output.ocr,
        medical_notes: output.medical_notes,
    };
    storage.insert_run(&id, &filename, &data)?;
    println!("stored run {id}");
    Ok(())
}

fn print_progress(progress: &PipelineProgress) {
    let line: Vec<String> = progress
        .statuses()
        .into_iter()
        .map(|(stage, status)| {
            let mark = match status {
                StepStatus::Pending => ' ',
                StepStatus::Processing => '>',
                StepStatus::Completed => 'x',
                StepStatus::Error => '!',
            };
            format!("[{mark}] {stage}")
        })
        .collect();
    println!("{}", line.join("  "));
}

fn run_id(filename: &str) -> String {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let stem: String = filename
        .chars()
        .take_while(|ch| *ch != '.')
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .take(24)
        .collect();
    if stem.is_empty() {
        format!("run-{stamp}")
    } else {
        format!("{stem}-{stamp}")
    }
}
