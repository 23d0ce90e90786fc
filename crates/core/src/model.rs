use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type PageNumber = u32;

pub const MANUAL_ID_PREFIX: &str = "manual-";

/// One annotation over a page's plain text.
///
/// `start..end` is a half-open range of character offsets into the page
/// text as it was when the entity was created. `text` is a snapshot and is
/// never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icd_code: Option<String>,
}

impl Entity {
    pub fn seeded_id(code: &str, start: usize, end: usize) -> String {
        format!("{code}-{start}-{end}")
    }

    pub fn manual_id(stamp_millis: u128) -> String {
        format!("{MANUAL_ID_PREFIX}{stamp_millis}")
    }

    pub fn from_mapping(mapping: &PageMapping) -> Self {
        let [start, end] = mapping.position;
        Self {
            id: Self::seeded_id(&mapping.icd_code, start, end),
            text: mapping.text.clone(),
            entity_type: mapping.icd_code.clone(),
            start,
            end,
            icd_code: Some(mapping.icd_code.clone()),
        }
    }

    pub fn is_manual(&self) -> bool {
        self.id.starts_with(MANUAL_ID_PREFIX)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn split_type_display(value: &str) -> (&str, Option<&str>) {
    match value.split_once(" - ") {
        Some((code, description)) => (code, Some(description)),
        None => (value, None),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMapping {
    pub icd_code: String,
    pub text: String,
    pub position: [usize; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResponse {
    #[serde(default)]
    pub file_content: String,
    pub pages: BTreeMap<PageNumber, String>,
}

impl OcrResponse {
    pub fn page_text(&self, page: PageNumber) -> &str {
        self.pages.get(&page).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalNotesResponse {
    pub page_mappings: BTreeMap<PageNumber, Vec<PageMapping>>,
    #[serde(default)]
    pub all_entities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: String,
    pub filename: String,
}

impl RunInfo {
    pub fn short_name(&self, max_len: usize) -> String {
        let len = self.filename.chars().count();
        if len <= max_len {
            return self.filename.clone();
        }
        let (stem, ext) = match self.filename.rsplit_once('.') {
            Some((stem, ext)) => (stem, ext),
            None => (self.filename.as_str(), ""),
        };
        let keep = max_len.saturating_sub(3 + ext.chars().count());
        let head: String = stem.chars().take(keep).collect();
        format!("{head}...{ext}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunData {
    pub pdf_path: String,
    pub ocr: OcrResponse,
    pub medical_notes: MedicalNotesResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_id_is_deterministic() {
        let mapping = PageMapping {
            icd_code: "D50.0".to_string(),
            text: "anemia".to_string(),
            position: [10, 16],
        };
        let a = Entity::from_mapping(&mapping);
        let b = Entity::from_mapping(&mapping);
        assert_eq!(a.id, "D50.0-10-16");
        assert_eq!(a, b);
        assert_eq!(a.icd_code.as_deref(), Some("D50.0"));
        assert!(!a.is_manual());
    }

    #[test]
    fn entity_serializes_type_field() {
        let entity = Entity {
            id: "manual-1".to_string(),
            text: "cough".to_string(),
            entity_type: "R05".to_string(),
            start: 0,
            end: 5,
            icd_code: None,
        };
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "R05");
        assert!(json.get("icd_code").is_none());
        assert!(entity.is_manual());
    }

    #[test]
    fn wire_payloads_parse_string_page_keys() {
        let ocr: OcrResponse =
            serde_json::from_str(r#"{"file_content":"x","pages":{"1":"a","2":"b"}}"#).unwrap();
        assert_eq!(ocr.page_text(2), "b");
        assert_eq!(ocr.page_text(3), "");

        let notes: MedicalNotesResponse = serde_json::from_str(
            r#"{"page_mappings":{"1":[{"icd_code":"D50.0","text":"anemia","position":[10,16]}]}}"#,
        )
        .unwrap();
        assert_eq!(notes.page_mappings[&1][0].position, [10, 16]);
        assert!(notes.all_entities.is_empty());
    }

    #[test]
    fn splits_lookup_display() {
        assert_eq!(
            split_type_display("D50.9 - Iron deficiency anemia, unspecified"),
            ("D50.9", Some("Iron deficiency anemia, unspecified"))
        );
        assert_eq!(split_type_display("Symptom"), ("Symptom", None));
    }

    #[test]
    fn short_name_keeps_extension() {
        let run = RunInfo {
            id: "r1".to_string(),
            filename: "discharge_summary_final_v2.pdf".to_string(),
        };
        let short = run.short_name(20);
        assert_eq!(short, "discharge_summ...pdf");
        assert_eq!(short.chars().count(), 20);

        let run = RunInfo {
            id: "r2".to_string(),
            filename: "short.pdf".to_string(),
        };
        assert_eq!(run.short_name(20), "short.pdf");
    }
}
