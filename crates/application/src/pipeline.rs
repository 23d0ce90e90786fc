use std::path::Path;

use annotator_core::{MedicalNotesResponse, OcrResponse};
use anyhow::Context;
use tracing::{error, info};

pub type Payload = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Ocr,
    PiiRedaction,
    DiseaseExtraction,
    GetIcdCodes,
    FillIcdCodes,
    HccMapping,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 6] = [
        PipelineStage::Ocr,
        PipelineStage::PiiRedaction,
        PipelineStage::DiseaseExtraction,
        PipelineStage::GetIcdCodes,
        PipelineStage::FillIcdCodes,
        PipelineStage::HccMapping,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Ocr => "OCR",
            PipelineStage::PiiRedaction => "PII Redaction",
            PipelineStage::DiseaseExtraction => "Disease Extraction",
            PipelineStage::GetIcdCodes => "Get ICD Codes",
            PipelineStage::FillIcdCodes => "Fill ICD Codes",
            PipelineStage::HccMapping => "HCC Code Mapping",
        }
    }

    fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|stage| stage == self)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Processing => "processing",
            StepStatus::Completed => "completed",
            StepStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineProgress {
    current: Option<usize>,
    failed: bool,
    finished: bool,
}

impl PipelineProgress {
    pub fn start(&mut self, stage: PipelineStage) {
        info!(stage = %stage, "pipeline stage started");
        self.current = Some(stage.index());
        self.failed = false;
    }

    pub fn fail(&mut self) {
        self.failed = true;
    }

    pub fn finish(&mut self) {
        self.finished = true;
        self.failed = false;
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn status(&self, stage: PipelineStage) -> StepStatus {
        if self.finished {
            return StepStatus::Completed;
        }
        let Some(current) = self.current else {
            return StepStatus::Pending;
        };
        let index = stage.index();
        if index < current {
            StepStatus::Completed
        } else if index == current {
            if self.failed {
                StepStatus::Error
            } else {
                StepStatus::Processing
            }
        } else {
            StepStatus::Pending
        }
    }

    pub fn statuses(&self) -> Vec<(PipelineStage, StepStatus)> {
        PipelineStage::ALL
            .iter()
            .map(|stage| (*stage, self.status(*stage)))
            .collect()
    }
}

pub trait Pipeline {
    fn ocr(&mut self, pdf: &Path) -> anyhow::Result<OcrResponse>;
    fn redact_pii(&mut self, ocr: &OcrResponse) -> anyhow::Result<Payload>;
    fn extract_diseases(&mut self, redacted: &Payload) -> anyhow::Result<Payload>;
    fn get_icd_codes(&mut self, diseases: &Payload) -> anyhow::Result<Payload>;
    fn fill_icd_codes(&mut self, codes: &Payload) -> anyhow::Result<Payload>;
    fn map_hcc(
        &mut self,
        ocr: &OcrResponse,
        filled: &Payload,
    ) -> anyhow::Result<MedicalNotesResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub ocr: OcrResponse,
    pub medical_notes: MedicalNotesResponse,
}

pub fn run_pipeline<P, F>(
    pipeline: &mut P,
    pdf: &Path,
    progress: &mut PipelineProgress,
    mut report: F,
) -> anyhow::Result<PipelineOutput>
where
    P: Pipeline + ?Sized,
    F: FnMut(&PipelineProgress),
{
    let result = run_stages(pipeline, pdf, progress, &mut report);

    match &result {
        Ok(_) => progress.finish(),
        Err(err) => {
            error!(error = %err, "pipeline failed");
            progress.fail();
        }
    }
    report(progress);
    result
}

fn run_stages<P, F>(
    pipeline: &mut P,
    pdf: &Path,
    progress: &mut PipelineProgress,
    report: &mut F,
) -> anyhow::Result<PipelineOutput>
where
    P: Pipeline + ?Sized,
    F: FnMut(&PipelineProgress),
{
    let mut step = |stage: PipelineStage| {
        progress.start(stage);
        report(progress);
    };
    step(PipelineStage::Ocr);
    let ocr = pipeline.ocr(pdf).context("OCR failed")?;
    step(PipelineStage::PiiRedaction);
    let redacted = pipeline.redact_pii(&ocr).context("PII redaction failed")?;
    step(PipelineStage::DiseaseExtraction);
    let diseases = pipeline
        .extract_diseases(&redacted)
        .context("disease extraction failed")?;
    step(PipelineStage::GetIcdCodes);
    let codes = pipeline
        .get_icd_codes(&diseases)
        .context("ICD code lookup failed")?;
    step(PipelineStage::FillIcdCodes);
    let filled = pipeline
        .fill_icd_codes(&codes)
        .context("ICD code fill failed")?;
    step(PipelineStage::HccMapping);
    let medical_notes = pipeline
        .map_hcc(&ocr, &filled)
        .context("HCC mapping failed")?;
    Ok(PipelineOutput { ocr, medical_notes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotator_test::sample_run_data;
    use anyhow::bail;
    use serde_json::json;

    struct Fixed {
        fail_at: Option<PipelineStage>,
    }

    impl Fixed {
        fn check(&self, stage: PipelineStage) -> anyhow::Result<()> {
            if self.fail_at == Some(stage) {
                bail!("{stage} unavailable");
            }
            Ok(())
        }
    }

    impl Pipeline for Fixed {
        fn ocr(&mut self, _pdf: &Path) -> anyhow::Result<OcrResponse> {
            self.check(PipelineStage::Ocr)?;
            Ok(sample_run_data("a.pdf").ocr)
        }

        fn redact_pii(&mut self, _ocr: &OcrResponse) -> anyhow::Result<Payload> {
            self.check(PipelineStage::PiiRedaction)?;
            Ok(json!({}))
        }

        fn extract_diseases(&mut self, _redacted: &Payload) -> anyhow::Result<Payload> {
            self.check(PipelineStage::DiseaseExtraction)?;
            Ok(json!([]))
        }

        fn get_icd_codes(&mut self, _diseases: &Payload) -> anyhow::Result<Payload> {
            self.check(PipelineStage::GetIcdCodes)?;
            Ok(json!([]))
        }

        fn fill_icd_codes(&mut self, _codes: &Payload) -> anyhow::Result<Payload> {
            self.check(PipelineStage::FillIcdCodes)?;
            Ok(json!([]))
        }

        fn map_hcc(
            &mut self,
            _ocr: &OcrResponse,
            _filled: &Payload,
        ) -> anyhow::Result<MedicalNotesResponse> {
            self.check(PipelineStage::HccMapping)?;
            Ok(sample_run_data("a.pdf").medical_notes)
        }
    }

    #[test]
    fn fresh_progress_is_all_pending() {
        let progress = PipelineProgress::default();
        assert!(
            progress
                .statuses()
                .iter()
                .all(|(_, status)| *status == StepStatus::Pending)
        );
    }

    #[test]
    fn statuses_follow_current_stage() {
        let mut progress = PipelineProgress::default();
        progress.start(PipelineStage::GetIcdCodes);
        let statuses: Vec<StepStatus> = progress.statuses().into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Completed,
                StepStatus::Completed,
                StepStatus::Completed,
                StepStatus::Processing,
                StepStatus::Pending,
                StepStatus::Pending,
            ]
        );
        progress.fail();
        assert_eq!(progress.status(PipelineStage::GetIcdCodes), StepStatus::Error);
    }

    #[test]
    fn run_reports_every_stage() -> anyhow::Result<()> {
        let mut pipeline = Fixed { fail_at: None };
        let mut progress = PipelineProgress::default();
        let mut seen = Vec::new();
        let output = run_pipeline(&mut pipeline, Path::new("a.pdf"), &mut progress, |p| {
            seen.push(p.statuses().iter().filter(|(_, s)| *s == StepStatus::Completed).count());
        })?;
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(progress.is_finished());
        assert_eq!(output.ocr.pages.len(), 3);
        Ok(())
    }

    #[test]
    fn failure_marks_stage_as_error() {
        let mut pipeline = Fixed {
            fail_at: Some(PipelineStage::DiseaseExtraction),
        };
        let mut progress = PipelineProgress::default();
        let err = run_pipeline(&mut pipeline, Path::new("a.pdf"), &mut progress, |_| {})
            .unwrap_err();
        assert!(err.to_string().contains("disease extraction"));
        assert_eq!(
            progress.status(PipelineStage::DiseaseExtraction),
            StepStatus::Error
        );
        assert_eq!(progress.status(PipelineStage::PiiRedaction), StepStatus::Completed);
        assert_eq!(progress.status(PipelineStage::HccMapping), StepStatus::Pending);
    }
}
