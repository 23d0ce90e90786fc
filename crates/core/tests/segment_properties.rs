use annotator_core::{Entity, SegmentKind, compute_segments};
use proptest::prelude::*;

fn page_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ]{0,80}",
        "[a-c ]{0,40}",
        "[a-zäöüß \n]{0,60}",
    ]
}

fn search_term() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), Just("  ".to_string()), "[a-cA-C]{1,3}", "[a-z ]{1,5}"]
}

// Sweeps left to right so the generated entities never overlap.
fn disjoint_entities(len: usize, cuts: &[(usize, usize)]) -> Vec<Entity> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for (gap, width) in cuts {
        let start = cursor + gap;
        let end = start + width + 1;
        if end > len {
            break;
        }
        out.push(Entity {
            id: format!("E{start}-{end}"),
            text: String::new(),
            entity_type: "E".to_string(),
            start,
            end,
            icd_code: None,
        });
        cursor = end;
    }
    out
}

// Arbitrary, possibly overlapping or out-of-range entities.
fn loose_entities(raw: &[(usize, usize)]) -> Vec<Entity> {
    raw.iter()
        .enumerate()
        .map(|(i, (start, width))| Entity {
            id: format!("L{i}"),
            text: String::new(),
            entity_type: "L".to_string(),
            start: *start,
            end: start + width,
            icd_code: None,
        })
        .collect()
}

proptest! {
    #[test]
    fn content_round_trips_to_text(
        text in page_text(),
        cuts in prop::collection::vec((0usize..6, 0usize..6), 0..10),
        term in search_term(),
    ) {
        let len = text.chars().count();
        let entities = disjoint_entities(len, &cuts);
        let segments = compute_segments(&text, &entities, &term);
        let joined: String = segments.iter().map(|s| s.content.as_str()).collect();
        prop_assert_eq!(joined, text);
    }

    #[test]
    fn segments_are_contiguous_and_non_empty(
        text in page_text(),
        raw in prop::collection::vec((0usize..90, 0usize..12), 0..12),
        term in search_term(),
    ) {
        let len = text.chars().count();
        let entities = loose_entities(&raw);
        let segments = compute_segments(&text, &entities, &term);

        let mut cursor = 0;
        for segment in &segments {
            prop_assert_eq!(segment.start, cursor);
            prop_assert!(segment.end > segment.start);
            prop_assert_eq!(segment.content.chars().count(), segment.end - segment.start);
            cursor = segment.end;
        }
        prop_assert_eq!(cursor, len);
    }

    #[test]
    fn disjoint_entities_survive_any_search(
        text in page_text(),
        cuts in prop::collection::vec((0usize..6, 0usize..6), 0..10),
        term in search_term(),
    ) {
        let len = text.chars().count();
        let entities = disjoint_entities(len, &cuts);
        let segments = compute_segments(&text, &entities, &term);

        for entity in &entities {
            let found = segments.iter().any(|s| {
                s.kind == SegmentKind::Entity && s.start == entity.start && s.end == entity.end
            });
            prop_assert!(found, "entity {}..{} missing", entity.start, entity.end);
        }

        let entity_segments = segments.iter().filter(|s| s.kind == SegmentKind::Entity).count();
        prop_assert_eq!(entity_segments, entities.len());
    }
}
