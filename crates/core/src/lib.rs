use serde::{Deserialize, Serialize};

mod error;
mod model;
pub mod segment;

pub use error::AnnotatorError;
pub use model::{
    Entity, MANUAL_ID_PREFIX, MedicalNotesResponse, OcrResponse, PageMapping, PageNumber, RunData,
    RunInfo, split_type_display,
};
pub use segment::{PageHit, Segment, SegmentKind, compute_segments, find_matches, page_hits};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search_debounce_ms: u64,
    pub lookup_debounce_ms: u64,
    pub layout_settle_ms: u64,
    pub lookup_min_chars: usize,
    pub search_min_chars: usize,
    pub default_scale: f32,
    pub default_layout: LayoutMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    Split,
    Pdf,
    Annotator,
}

impl LayoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutMode::Split => "split",
            LayoutMode::Pdf => "pdf",
            LayoutMode::Annotator => "annotator",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            LayoutMode::Split => LayoutMode::Pdf,
            LayoutMode::Pdf => LayoutMode::Annotator,
            LayoutMode::Annotator => LayoutMode::Split,
        }
    }
}

impl std::fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LayoutMode {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "split" => Ok(LayoutMode::Split),
            "pdf" => Ok(LayoutMode::Pdf),
            "annotator" => Ok(LayoutMode::Annotator),
            _ => Err("unknown layout mode"),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            search_debounce_ms: 300,
            lookup_debounce_ms: 300,
            layout_settle_ms: 500,
            lookup_min_chars: 3,
            search_min_chars: 2,
            default_scale: 0.85,
            default_layout: LayoutMode::Split,
        }
    }
}

pub const MIN_SCALE: f32 = 0.6;
pub const MAX_SCALE: f32 = 1.5;

impl Settings {
    pub fn normalize(&mut self) {
        self.search_debounce_ms = self.search_debounce_ms.clamp(0, 5_000);
        self.lookup_debounce_ms = self.lookup_debounce_ms.clamp(0, 5_000);
        self.layout_settle_ms = self.layout_settle_ms.clamp(0, 5_000);
        self.lookup_min_chars = self.lookup_min_chars.clamp(1, 32);
        self.search_min_chars = self.search_min_chars.clamp(1, 32);
        self.default_scale = if self.default_scale.is_finite() {
            self.default_scale.clamp(MIN_SCALE, MAX_SCALE)
        } else {
            Settings::default().default_scale
        };
    }
}
