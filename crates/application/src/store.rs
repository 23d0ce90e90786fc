use std::collections::{BTreeMap, HashSet};

use annotator_core::{AnnotatorError, Entity, PageMapping, PageNumber};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    pages: BTreeMap<PageNumber, Vec<Entity>>,
    available_types: Vec<String>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entities(&self, page: PageNumber) -> &[Entity] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, page: PageNumber, id: &str) -> Option<&Entity> {
        self.entities(page).iter().find(|e| e.id == id)
    }

    pub fn replace_entities(&mut self, page: PageNumber, entities: Vec<Entity>) {
        self.pages.insert(page, entities);
    }

    pub fn add_entity(&mut self, page: PageNumber, entity: Entity) -> Result<(), AnnotatorError> {
        if self.find(page, &entity.id).is_some() {
            return Err(AnnotatorError::DuplicateId {
                page,
                id: entity.id,
            });
        }
        debug!(page, id = %entity.id, entity_type = %entity.entity_type, "add entity");
        let mut next = self.entities(page).to_vec();
        next.push(entity);
        self.replace_entities(page, next);
        Ok(())
    }

    pub fn delete_entity(&mut self, page: PageNumber, id: &str) -> bool {
        let current = self.entities(page);
        if !current.iter().any(|e| e.id == id) {
            return false;
        }
        let next: Vec<Entity> = current.iter().filter(|e| e.id != id).cloned().collect();
        debug!(page, id, "delete entity");
        self.replace_entities(page, next);
        true
    }

    pub fn seed_from_mappings(&mut self, mappings: &BTreeMap<PageNumber, Vec<PageMapping>>) {
        for (page, page_mappings) in mappings {
            let mut seen = HashSet::new();
            let mut entities = Vec::with_capacity(page_mappings.len());
            for mapping in page_mappings {
                let entity = Entity::from_mapping(mapping);
                if !seen.insert(entity.id.clone()) {
                    warn!(page, id = %entity.id, "pipeline repeated a mapping; keeping the first");
                    continue;
                }
                self.register_type(&mapping.icd_code);
                entities.push(entity);
            }
            self.replace_entities(*page, entities);
        }
    }

    pub fn register_type(&mut self, entity_type: &str) -> bool {
        let name = entity_type.trim();
        if name.is_empty() || self.available_types.iter().any(|t| t == name) {
            return false;
        }
        self.available_types.push(name.to_string());
        true
    }

    pub fn available_types(&self) -> &[String] {
        &self.available_types
    }

    pub fn annotated_pages(&self) -> Vec<(PageNumber, &[Entity])> {
        self.pages
            .iter()
            .filter(|(_, entities)| !entities.is_empty())
            .map(|(page, entities)| (*page, entities.as_slice()))
            .collect()
    }

    pub fn total_entities(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.available_types.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotator_test::{make_entity, make_mapping};

    #[test]
    fn missing_page_is_empty() {
        let store = AnnotationStore::new();
        assert!(store.entities(4).is_empty());
    }

    #[test]
    fn seeding_is_idempotent() {
        let mut mappings = BTreeMap::new();
        mappings.insert(1, vec![make_mapping("D50.0", "anemia", 10, 16)]);

        let mut store = AnnotationStore::new();
        store.seed_from_mappings(&mappings);
        let first: Vec<String> = store.entities(1).iter().map(|e| e.id.clone()).collect();
        store.seed_from_mappings(&mappings);
        let second: Vec<String> = store.entities(1).iter().map(|e| e.id.clone()).collect();

        assert_eq!(first, vec!["D50.0-10-16".to_string()]);
        assert_eq!(first, second);
        assert_eq!(store.available_types(), ["D50.0".to_string()]);
    }

    #[test]
    fn seeding_drops_repeated_mappings() {
        let mut mappings = BTreeMap::new();
        mappings.insert(
            2,
            vec![
                make_mapping("D50.0", "anemia", 10, 16),
                make_mapping("D50.0", "anemia", 10, 16),
                make_mapping("E11.9", "diabetes", 21, 29),
            ],
        );
        let mut store = AnnotationStore::new();
        store.seed_from_mappings(&mappings);
        assert_eq!(store.entities(2).len(), 2);
        assert_eq!(store.available_types().len(), 2);
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let mut store = AnnotationStore::new();
        store.add_entity(1, make_entity("manual-1", "R05", 0, 5)).unwrap();
        let err = store
            .add_entity(1, make_entity("manual-1", "R06", 6, 9))
            .unwrap_err();
        assert!(matches!(err, AnnotatorError::DuplicateId { page: 1, .. }));
        assert_eq!(store.entities(1).len(), 1);

        // same id on another page is fine
        store.add_entity(2, make_entity("manual-1", "R05", 0, 5)).unwrap();
    }

    #[test]
    fn add_preserves_insertion_order() {
        let mut store = AnnotationStore::new();
        store.add_entity(1, make_entity("b", "X", 10, 12)).unwrap();
        store.add_entity(1, make_entity("a", "X", 0, 2)).unwrap();
        let ids: Vec<&str> = store.entities(1).iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn delete_missing_id_is_noop() {
        let mut store = AnnotationStore::new();
        store.add_entity(1, make_entity("a", "X", 0, 2)).unwrap();
        assert!(!store.delete_entity(1, "zzz"));
        assert!(!store.delete_entity(9, "a"));
        assert!(store.delete_entity(1, "a"));
        assert!(store.entities(1).is_empty());
    }

    #[test]
    fn types_survive_entity_deletion() {
        let mut mappings = BTreeMap::new();
        mappings.insert(1, vec![make_mapping("D50.0", "anemia", 10, 16)]);
        let mut store = AnnotationStore::new();
        store.seed_from_mappings(&mappings);
        store.delete_entity(1, "D50.0-10-16");
        assert_eq!(store.available_types(), ["D50.0".to_string()]);
        assert!(!store.register_type("D50.0"));
        assert!(!store.register_type("   "));
        assert!(store.register_type("Symptom"));
    }

    #[test]
    fn annotated_pages_skip_empty_lists() {
        let mut store = AnnotationStore::new();
        store.replace_entities(3, vec![make_entity("c", "X", 0, 1)]);
        store.replace_entities(1, vec![make_entity("a", "X", 0, 1), make_entity("b", "X", 1, 2)]);
        store.replace_entities(2, Vec::new());
        let pages: Vec<PageNumber> = store.annotated_pages().iter().map(|(p, _)| *p).collect();
        assert_eq!(pages, vec![1, 3]);
        assert_eq!(store.total_entities(), 3);
    }
}
