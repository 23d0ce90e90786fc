use std::collections::BTreeMap;

use annotator_core::{
    Entity, LayoutMode, MedicalNotesResponse, OcrResponse, PageMapping, RunData, Settings,
};

pub const PAGE_ONE: &str = "Patient has anemia and diabetes";
pub const PAGE_TWO: &str = "Iron deficiency anemia, unspecified. Follow up in 2 weeks.";
pub const PAGE_THREE: &str = "No acute distress.";

pub fn make_settings(search_debounce_ms: u64) -> Settings {
    Settings {
        search_debounce_ms,
        lookup_debounce_ms: 300,
        layout_settle_ms: 500,
        lookup_min_chars: 3,
        search_min_chars: 2,
        default_scale: 0.85,
        default_layout: LayoutMode::Split,
    }
}

pub fn make_entity(id: &str, entity_type: &str, start: usize, end: usize) -> Entity {
    Entity {
        id: id.to_string(),
        text: String::new(),
        entity_type: entity_type.to_string(),
        start,
        end,
        icd_code: None,
    }
}

pub fn make_mapping(code: &str, text: &str, start: usize, end: usize) -> PageMapping {
    PageMapping {
        icd_code: code.to_string(),
        text: text.to_string(),
        position: [start, end],
    }
}

pub fn sample_run_data(pdf_path: &str) -> RunData {
    let mut pages = BTreeMap::new();
    pages.insert(1, PAGE_ONE.to_string());
    pages.insert(2, PAGE_TWO.to_string());
    pages.insert(3, PAGE_THREE.to_string());

    let mut page_mappings = BTreeMap::new();
    page_mappings.insert(
        1,
        vec![
            make_mapping("D50.9", "anemia", 12, 18),
            make_mapping("E11.9", "diabetes", 23, 31),
        ],
    );
    page_mappings.insert(2, vec![make_mapping("D50.9", "Iron deficiency anemia", 0, 22)]);

    RunData {
        pdf_path: pdf_path.to_string(),
        ocr: OcrResponse {
            file_content: [PAGE_ONE, PAGE_TWO, PAGE_THREE].join("\n"),
            pages,
        },
        medical_notes: MedicalNotesResponse {
            page_mappings,
            all_entities: vec!["D50.9".to_string(), "E11.9".to_string()],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_settings() {
        let settings = make_settings(12);
        assert_eq!(settings.search_debounce_ms, 12);
    }

    #[test]
    fn sample_mappings_point_at_their_text() {
        let run = sample_run_data("/tmp/a.pdf");
        for (page, mappings) in &run.medical_notes.page_mappings {
            let text = run.ocr.page_text(*page);
            for mapping in mappings {
                let [start, end] = mapping.position;
                let slice: String = text.chars().skip(start).take(end - start).collect();
                assert_eq!(slice, mapping.text);
            }
        }
    }
}
