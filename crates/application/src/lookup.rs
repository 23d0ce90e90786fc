use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::debounce::{Debouncer, LatestOnly, Ticket};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChoice {
    pub code: String,
    pub description: String,
}

impl CodeChoice {
    pub fn display(&self) -> String {
        format!("{} - {}", self.code, self.description)
    }
}

pub trait CodeLookup {
    fn search(&self, query: &str) -> anyhow::Result<Vec<CodeChoice>>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCodeTable {
    codes: BTreeMap<String, String>,
}

impl StaticCodeTable {
    pub fn new(codes: BTreeMap<String, String>) -> Self {
        Self { codes }
    }

    pub fn builtin() -> Self {
        let codes = [
            ("D50.0", "Iron deficiency anemia secondary to blood loss (chronic)"),
            ("D50.1", "Sideropenic dysphagia"),
            ("D50.8", "Other iron deficiency anemias"),
            ("D50.9", "Iron deficiency anemia, unspecified"),
            ("D51.0", "Vitamin B12 deficiency anemia due to intrinsic factor deficiency"),
            (
                "D51.1",
                "Vitamin B12 deficiency anemia due to selective vitamin B12 malabsorption with proteinuria",
            ),
            ("D51.2", "Transcobalamin II deficiency"),
            ("D51.3", "Other dietary vitamin B12 deficiency anemia"),
            ("D51.8", "Other vitamin B12 deficiency anemias"),
            ("D51.9", "Vitamin B12 deficiency anemia, unspecified"),
        ];
        Self::new(
            codes
                .into_iter()
                .map(|(code, description)| (code.to_string(), description.to_string()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl CodeLookup for StaticCodeTable {
    fn search(&self, query: &str) -> anyhow::Result<Vec<CodeChoice>> {
        let needle = query.trim().to_lowercase();
        Ok(self
            .codes
            .iter()
            .filter(|(code, description)| {
                code.to_lowercase().starts_with(&needle)
                    || description.to_lowercase().contains(&needle)
            })
            .map(|(code, description)| CodeChoice {
                code: code.clone(),
                description: description.clone(),
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub ticket: Ticket,
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct LookupState {
    min_chars: usize,
    query: String,
    debouncer: Debouncer<String>,
    tickets: LatestOnly,
    results: Vec<CodeChoice>,
    selected: usize,
    error: Option<String>,
}

impl LookupState {
    pub fn new(delay: Duration, min_chars: usize) -> Self {
        Self {
            min_chars,
            query: String::new(),
            debouncer: Debouncer::new(delay),
            tickets: LatestOnly::default(),
            results: Vec::new(),
            selected: 0,
            error: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &[CodeChoice] {
        &self.results
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn set_query(&mut self, query: impl Into<String>, now: Instant) {
        self.query = query.into();
        self.error = None;
        self.tickets.invalidate();
        let trimmed = self.query.trim();
        if trimmed.chars().count() < self.min_chars {
            self.debouncer.cancel();
            self.results.clear();
            self.selected = 0;
            return;
        }
        self.debouncer.schedule(trimmed.to_string(), now);
    }

    pub fn poll(&mut self, now: Instant) -> Option<LookupRequest> {
        let query = self.debouncer.poll(now)?;
        let ticket = self.tickets.issue();
        debug!(%query, "code lookup");
        Some(LookupRequest { ticket, query })
    }

    pub fn apply(&mut self, ticket: Ticket, result: anyhow::Result<Vec<CodeChoice>>) -> bool {
        if !self.tickets.is_current(ticket) {
            debug!("discarding stale code lookup result");
            return false;
        }
        self.selected = 0;
        match result {
            Ok(results) if results.is_empty() => {
                self.results.clear();
                self.error = Some("No results found".to_string());
            }
            Ok(results) => {
                self.results = results;
                self.error = None;
            }
            Err(err) => {
                warn!(error = %err, "code lookup failed");
                self.results.clear();
                self.error = Some("Failed to search ICD codes".to_string());
            }
        }
        true
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.results.is_empty() {
            return;
        }
        let last = self.results.len() - 1;
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }

    pub fn choose(&mut self) -> Option<CodeChoice> {
        let choice = self.results.get(self.selected).cloned()?;
        self.reset();
        Some(choice)
    }

    pub fn reset(&mut self) {
        self.query.clear();
        self.debouncer.cancel();
        self.tickets.invalidate();
        self.results.clear();
        self.selected = 0;
        self.error = None;
    }
}
