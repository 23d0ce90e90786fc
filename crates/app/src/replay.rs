use std::fs;
use std::path::{Path, PathBuf};

use annotator_application::pipeline::{Payload, Pipeline};
use annotator_core::{MedicalNotesResponse, OcrResponse};
use anyhow::Context as _;
use serde_json::json;
use tracing::debug;

pub struct ReplayPipeline {
    ocr_path: PathBuf,
    notes_path: PathBuf,
    notes: Option<MedicalNotesResponse>,
}

impl ReplayPipeline {
    pub fn new(ocr_path: impl Into<PathBuf>, notes_path: impl Into<PathBuf>) -> Self {
        Self {
            ocr_path: ocr_path.into(),
            notes_path: notes_path.into(),
            notes: None,
        }
    }

    fn notes(&mut self) -> anyhow::Result<&MedicalNotesResponse> {
        if self.notes.is_none() {
            let raw = fs::read_to_string(&self.notes_path)
                .with_context(|| format!("read {}", self.notes_path.display()))?;
            let notes: MedicalNotesResponse = serde_json::from_str(&raw)
                .with_context(|| format!("parse {}", self.notes_path.display()))?;
            self.notes = Some(notes);
        }
        self.notes
            .as_ref()
            .context("medical notes not available")
    }
}

impl Pipeline for ReplayPipeline {
    fn ocr(&mut self, pdf: &Path) -> anyhow::Result<OcrResponse> {
        debug!(pdf = %pdf.display(), "replaying OCR");
        let raw = fs::read_to_string(&self.ocr_path)
            .with_context(|| format!("read {}", self.ocr_path.display()))?;
        let ocr: OcrResponse = serde_json::from_str(&raw)
            .with_context(|| format!("parse {}", self.ocr_path.display()))?;
        anyhow::ensure!(!ocr.pages.is_empty(), "OCR response has no pages");
        Ok(ocr)
    }

    fn redact_pii(&mut self, ocr: &OcrResponse) -> anyhow::Result<Payload> {
        Ok(json!({ "pages": ocr.pages.len() }))
    }

    fn extract_diseases(&mut self, _redacted: &Payload) -> anyhow::Result<Payload> {
        let entities = self.notes()?.all_entities.clone();
        Ok(json!({ "diseases": entities }))
    }

    fn get_icd_codes(&mut self, diseases: &Payload) -> anyhow::Result<Payload> {
        Ok(json!({ "codes": diseases["diseases"].clone() }))
    }

    fn fill_icd_codes(&mut self, codes: &Payload) -> anyhow::Result<Payload> {
        Ok(codes.clone())
    }

    fn map_hcc(
        &mut self,
        ocr: &OcrResponse,
        _filled: &Payload,
    ) -> anyhow::Result<MedicalNotesResponse> {
        let notes = self.notes()?.clone();
        for page in notes.page_mappings.keys() {
            anyhow::ensure!(
                ocr.pages.contains_key(page),
                "medical notes reference page {page} which has no OCR text"
            );
        }
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotator_application::pipeline::{PipelineProgress, run_pipeline};
    use annotator_test::sample_run_data;

    fn write_payloads(dir: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
        let data = sample_run_data("a.pdf");
        let ocr = dir.join("ocr.json");
        let notes = dir.join("notes.json");
        fs::write(&ocr, serde_json::to_string(&data.ocr)?)?;
        fs::write(&notes, serde_json::to_string(&data.medical_notes)?)?;
        Ok((ocr, notes))
    }

    #[test]
    fn replays_saved_payloads() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (ocr, notes) = write_payloads(dir.path())?;
        let mut pipeline = ReplayPipeline::new(ocr, notes);
        let mut progress = PipelineProgress::default();
        let output = run_pipeline(&mut pipeline, Path::new("a.pdf"), &mut progress, |_| {})?;
        let expected = sample_run_data("a.pdf");
        assert_eq!(output.ocr, expected.ocr);
        assert_eq!(output.medical_notes, expected.medical_notes);
        assert!(progress.is_finished());
        Ok(())
    }

    #[test]
    fn mappings_for_missing_pages_fail_the_last_stage() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (ocr, notes) = write_payloads(dir.path())?;
        let mut data = sample_run_data("a.pdf");
        data.ocr.pages.remove(&2);
        fs::write(&ocr, serde_json::to_string(&data.ocr)?)?;

        let mut pipeline = ReplayPipeline::new(ocr, notes);
        let mut progress = PipelineProgress::default();
        let result = run_pipeline(&mut pipeline, Path::new("a.pdf"), &mut progress, |_| {});
        assert!(result.is_err());
        assert!(progress.is_failed());
        Ok(())
    }
}
