use thiserror::Error;

use crate::PageNumber;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotatorError {
    #[error("Page out of range (1..={num_pages})")]
    PageOutOfRange { page: PageNumber, num_pages: u32 },

    #[error("Document not loaded")]
    DocumentNotLoaded,

    #[error("duplicate entity id {id} on page {page}")]
    DuplicateId { page: PageNumber, id: String },

    #[error("unknown run {0}")]
    UnknownRun(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_error_names_bounds() {
        let err = AnnotatorError::PageOutOfRange {
            page: 6,
            num_pages: 5,
        };
        assert_eq!(err.to_string(), "Page out of range (1..=5)");
    }

    #[test]
    fn duplicate_id_mentions_page() {
        let err = AnnotatorError::DuplicateId {
            page: 2,
            id: "D50.0-10-16".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("D50.0-10-16"));
        assert!(msg.contains("page 2"));
    }
}
