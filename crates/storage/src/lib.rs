use std::path::Path;

use annotator_core::{
    AnnotatorError, LayoutMode, MedicalNotesResponse, OcrResponse, RunData, RunInfo, Settings,
};
use anyhow::Context as _;
use rusqlite::{Connection, OptionalExtension as _};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db at {}", path.as_ref().display()))?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                search_debounce_ms INTEGER NOT NULL,
                lookup_debounce_ms INTEGER NOT NULL,
                layout_settle_ms INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO settings (id, search_debounce_ms, lookup_debounce_ms, layout_settle_ms)
            VALUES (1, 300, 300, 500);

            CREATE TABLE IF NOT EXISTS runs (
                seq INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                filename TEXT NOT NULL,
                pdf_path TEXT NOT NULL,
                ocr_json TEXT NOT NULL,
                notes_json TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (unixepoch())
            );
            "#,
        )?;

        self.add_column("settings", "lookup_min_chars INTEGER NOT NULL DEFAULT 3")?;
        self.add_column("settings", "search_min_chars INTEGER NOT NULL DEFAULT 2")?;
        self.add_column("settings", "default_scale REAL NOT NULL DEFAULT 0.85")?;
        self.add_column("settings", "default_layout TEXT NOT NULL DEFAULT 'split'")?;
        Ok(())
    }

    fn add_column(&self, table: &str, column: &str) -> anyhow::Result<()> {
        match self
            .conn
            .execute(&format!("ALTER TABLE {table} ADD COLUMN {column}"), [])
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let msg = err.to_string();
                if msg.contains("duplicate column name") {
                    Ok(())
                } else {
                    Err(err).with_context(|| format!("add {table} column {column}"))
                }
            }
        }
    }

    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        let row = self
            .conn
            .query_row(
                "SELECT search_debounce_ms, lookup_debounce_ms, layout_settle_ms, lookup_min_chars, search_min_chars, default_scale, default_layout FROM settings WHERE id = 1",
                [],
                |row| {
                    let search_debounce_ms: i64 = row.get(0)?;
                    let lookup_debounce_ms: i64 = row.get(1)?;
                    let layout_settle_ms: i64 = row.get(2)?;
                    let lookup_min_chars: i64 = row.get(3)?;
                    let search_min_chars: i64 = row.get(4)?;
                    let default_scale: f64 = row.get(5)?;
                    let default_layout: String = row.get(6)?;
                    Ok((
                        search_debounce_ms,
                        lookup_debounce_ms,
                        layout_settle_ms,
                        lookup_min_chars,
                        search_min_chars,
                        default_scale,
                        default_layout,
                    ))
                },
            )
            .optional()?;

        let Some((
            search_debounce_ms,
            lookup_debounce_ms,
            layout_settle_ms,
            lookup_min_chars,
            search_min_chars,
            default_scale,
            default_layout,
        )) = row
        else {
            return Ok(Settings::default());
        };

        let defaults = Settings::default();
        let mut settings = Settings {
            search_debounce_ms: u64::try_from(search_debounce_ms)
                .unwrap_or(defaults.search_debounce_ms),
            lookup_debounce_ms: u64::try_from(lookup_debounce_ms)
                .unwrap_or(defaults.lookup_debounce_ms),
            layout_settle_ms: u64::try_from(layout_settle_ms).unwrap_or(defaults.layout_settle_ms),
            lookup_min_chars: usize::try_from(lookup_min_chars)
                .unwrap_or(defaults.lookup_min_chars),
            search_min_chars: usize::try_from(search_min_chars)
                .unwrap_or(defaults.search_min_chars),
            default_scale: default_scale as f32,
            default_layout: default_layout
                .parse::<LayoutMode>()
                .unwrap_or(defaults.default_layout),
        };
        settings.normalize();
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        let mut settings = settings.clone();
        settings.normalize();

        self.conn.execute(
            "UPDATE settings SET search_debounce_ms = ?, lookup_debounce_ms = ?, layout_settle_ms = ?, lookup_min_chars = ?, search_min_chars = ?, default_scale = ?, default_layout = ? WHERE id = 1",
            (
                settings.search_debounce_ms as i64,
                settings.lookup_debounce_ms as i64,
                settings.layout_settle_ms as i64,
                settings.lookup_min_chars as i64,
                settings.search_min_chars as i64,
                f64::from(settings.default_scale),
                settings.default_layout.as_str(),
            ),
        )?;
        Ok(())
    }

    pub fn insert_run(&self, id: &str, filename: &str, data: &RunData) -> anyhow::Result<()> {
        let ocr_json = serde_json::to_string(&data.ocr).context("serialize OCR payload")?;
        let notes_json =
            serde_json::to_string(&data.medical_notes).context("serialize medical notes")?;
        self.conn
            .execute(
                "INSERT INTO runs (id, filename, pdf_path, ocr_json, notes_json) VALUES (?, ?, ?, ?, ?)",
                (id, filename, &data.pdf_path, ocr_json, notes_json),
            )
            .with_context(|| format!("insert run {id}"))?;
        info!(run = id, filename, "run stored");
        Ok(())
    }

    pub fn list_runs(&self) -> anyhow::Result<Vec<RunInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, filename FROM runs ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok(RunInfo {
                id: row.get(0)?,
                filename: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn fetch_run(&self, id: &str) -> anyhow::Result<RunData> {
        let row = self
            .conn
            .query_row(
                "SELECT pdf_path, ocr_json, notes_json FROM runs WHERE id = ?",
                [id],
                |row| {
                    let pdf_path: String = row.get(0)?;
                    let ocr_json: String = row.get(1)?;
                    let notes_json: String = row.get(2)?;
                    Ok((pdf_path, ocr_json, notes_json))
                },
            )
            .optional()?;
        let Some((pdf_path, ocr_json, notes_json)) = row else {
            return Err(AnnotatorError::UnknownRun(id.to_string()).into());
        };

        let ocr: OcrResponse = serde_json::from_str(&ocr_json)
            .with_context(|| format!("parse OCR payload of run {id}"))?;
        let medical_notes: MedicalNotesResponse = serde_json::from_str(&notes_json)
            .with_context(|| format!("parse medical notes of run {id}"))?;
        debug!(run = id, pages = ocr.pages.len(), "run fetched");
        Ok(RunData {
            pdf_path,
            ocr,
            medical_notes,
        })
    }

    pub fn delete_run(&self, id: &str) -> anyhow::Result<bool> {
        let removed = self.conn.execute("DELETE FROM runs WHERE id = ?", [id])?;
        Ok(removed > 0)
    }
}
