use std::time::{Duration, Instant};

use annotator_core::{
    AnnotatorError, Entity, LayoutMode, PageHit, PageNumber, RunData, RunInfo, Segment, Settings,
    compute_segments, page_hits,
};
use tracing::{debug, error, info};

pub mod colors;
pub mod debounce;
pub mod layout;
pub mod lookup;
pub mod pipeline;
pub mod selection;
pub mod session;
pub mod store;

use colors::{ColorRegistry, EntityColor};
use debounce::Debouncer;
use layout::LayoutState;
use lookup::{CodeLookup, LookupState};
use selection::TextSelection;
use session::PageSession;
use store::AnnotationStore;

#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: Settings,
    runs: Vec<RunInfo>,
    current_run: Option<String>,
    run_data: Option<RunData>,
    store: AnnotationStore,
    session: PageSession,
    layout: LayoutState,
    colors: ColorRegistry,
    lookup: LookupState,
    scale: f32,
    selected_type: Option<String>,
    search_input: String,
    search_term: String,
    search: Debouncer<String>,
    last_manual_stamp: u128,
}

impl AppContext {
    pub fn new(mut settings: Settings, now: Instant) -> Self {
        settings.normalize();
        Self {
            runs: Vec::new(),
            current_run: None,
            run_data: None,
            store: AnnotationStore::new(),
            session: PageSession::new(now),
            layout: LayoutState::new(
                settings.default_layout,
                Duration::from_millis(settings.layout_settle_ms),
            ),
            colors: ColorRegistry::new(),
            lookup: LookupState::new(
                Duration::from_millis(settings.lookup_debounce_ms),
                settings.lookup_min_chars,
            ),
            scale: layout::clamp_scale(settings.default_scale),
            selected_type: None,
            search_input: String::new(),
            search_term: String::new(),
            search: Debouncer::new(Duration::from_millis(settings.search_debounce_ms)),
            last_manual_stamp: 0,
            settings,
        }
    }

    pub fn with_runs(mut self, runs: Vec<RunInfo>) -> Self {
        self.runs = runs;
        self
    }

    pub fn runs(&self) -> &[RunInfo] {
        &self.runs
    }

    pub fn current_run(&self) -> Option<&RunInfo> {
        let id = self.current_run.as_deref()?;
        self.runs.iter().find(|run| run.id == id)
    }

    pub fn current_run_id(&self) -> Option<&str> {
        self.current_run.as_deref()
    }

    pub fn run_data(&self) -> Option<&RunData> {
        self.run_data.as_ref()
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn session(&self) -> &PageSession {
        &self.session
    }

    pub fn layout(&self) -> &LayoutState {
        &self.layout
    }

    pub fn lookup(&self) -> &LookupState {
        &self.lookup
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn selected_type(&self) -> Option<&str> {
        self.selected_type.as_deref()
    }

    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn needs_load(&self, run_id: &str) -> bool {
        self.current_run.as_deref() != Some(run_id)
    }

    pub fn apply_run(&mut self, run_id: &str, data: RunData, now: Instant) {
        self.session.reset_for_new_run(now);
        self.store.clear();
        self.colors.clear();
        self.search.cancel();
        self.search_input.clear();
        self.search_term.clear();
        self.lookup.reset();

        self.store.seed_from_mappings(&data.medical_notes.page_mappings);
        self.reconcile_selected_type();
        info!(
            run = run_id,
            pages = data.ocr.pages.len(),
            entities = self.store.total_entities(),
            "run applied"
        );
        self.current_run = Some(run_id.to_string());
        self.run_data = Some(data);
    }

    pub fn neighbour_run(&self, delta: isize) -> Option<&RunInfo> {
        let current = self.current_run.as_deref()?;
        let index = self.runs.iter().position(|run| run.id == current)?;
        let target = index.checked_add_signed(delta)?;
        self.runs.get(target)
    }

    pub fn document_loaded(&mut self, num_pages: u32) {
        self.session.document_loaded(num_pages);
    }

    pub fn current_page(&self) -> PageNumber {
        self.session.current_page()
    }

    pub fn page_text(&self) -> &str {
        self.run_data
            .as_ref()
            .map(|data| data.ocr.page_text(self.session.current_page()))
            .unwrap_or("")
    }

    pub fn page_entities(&self) -> &[Entity] {
        self.store.entities(self.session.current_page())
    }

    pub fn segments(&self) -> Vec<Segment> {
        compute_segments(self.page_text(), self.page_entities(), &self.search_term)
    }

    pub fn change_page(&mut self, page: PageNumber, now: Instant) -> Result<(), AnnotatorError> {
        self.session.change_page(page, now).inspect_err(|err| {
            debug!(page, error = %err, "page change rejected");
        })
    }

    /// Turns a selection on the current page into an entity and stores it.
    /// Ids are stamped with `now_millis`, bumped if needed so two
    /// selections never share a stamp.
    pub fn annotate_selection(
        &mut self,
        selection: &TextSelection,
        chunks: Option<&[&str]>,
        now_millis: u128,
    ) -> Option<Entity> {
        let selected_type = self.selected_type.clone()?;
        let stamp = now_millis.max(self.last_manual_stamp + 1);
        let entity = selection::resolve_selection(
            selection,
            chunks,
            self.page_text(),
            &selected_type,
            stamp,
        )?;
        let page = self.session.current_page();
        match self.store.add_entity(page, entity.clone()) {
            Ok(()) => {
                self.last_manual_stamp = stamp;
                self.colors.color_for(&entity.entity_type);
                Some(entity)
            }
            Err(err) => {
                error!(error = %err, "manual entity rejected");
                debug_assert!(
                    !matches!(err, AnnotatorError::DuplicateId { .. }),
                    "manual ids must be unique: {err}"
                );
                None
            }
        }
    }

    pub fn delete_entity(&mut self, page: PageNumber, id: &str) -> bool {
        self.store.delete_entity(page, id)
    }

    pub fn register_type(&mut self, entity_type: &str) {
        let name = entity_type.trim();
        if name.is_empty() {
            return;
        }
        self.store.register_type(name);
        self.selected_type = Some(name.to_string());
    }

    pub fn select_type(&mut self, entity_type: &str) -> bool {
        if !self.store.available_types().iter().any(|t| t == entity_type) {
            return false;
        }
        self.selected_type = Some(entity_type.to_string());
        true
    }

    pub fn cycle_type(&mut self, delta: isize) {
        let types = self.store.available_types();
        if types.is_empty() {
            self.selected_type = None;
            return;
        }
        let current = self
            .selected_type
            .as_deref()
            .and_then(|selected| types.iter().position(|t| t == selected))
            .unwrap_or(0);
        let len = types.len() as isize;
        let next = (current as isize + delta).rem_euclid(len) as usize;
        self.selected_type = Some(types[next].clone());
    }

    pub fn reconcile_selected_type(&mut self) {
        let types = self.store.available_types();
        let known = self
            .selected_type
            .as_deref()
            .is_some_and(|selected| types.iter().any(|t| t == selected));
        if !known {
            self.selected_type = types.first().cloned();
        }
    }

    pub fn color_for(&mut self, entity_type: &str) -> EntityColor {
        self.colors.color_for(entity_type)
    }

    pub fn colors(&self) -> &ColorRegistry {
        &self.colors
    }

    pub fn set_search_input(&mut self, input: impl Into<String>, now: Instant) {
        self.search_input = input.into();
        self.search.schedule(self.search_input.clone(), now);
    }

    pub fn poll_search(&mut self, now: Instant) -> bool {
        let Some(input) = self.search.poll(now) else {
            return false;
        };
        let trimmed = input.trim();
        let term = if trimmed.chars().count() >= self.settings.search_min_chars {
            trimmed.to_string()
        } else {
            String::new()
        };
        if term == self.search_term {
            return false;
        }
        debug!(term = %term, "search term applied");
        self.search_term = term;
        true
    }

    pub fn search_hits(&self) -> Vec<PageHit> {
        let Some(data) = &self.run_data else {
            return Vec::new();
        };
        page_hits(
            &data.ocr.pages,
            &self.search_term,
            self.settings.search_min_chars,
        )
    }

    pub fn set_lookup_query(&mut self, query: impl Into<String>, now: Instant) {
        self.lookup.set_query(query, now);
    }

    pub fn move_lookup_selection(&mut self, delta: isize) {
        self.lookup.move_selection(delta);
    }

    pub fn poll_lookup(&mut self, now: Instant, codes: &dyn CodeLookup) -> bool {
        let Some(request) = self.lookup.poll(now) else {
            return false;
        };
        let result = codes.search(&request.query);
        self.lookup.apply(request.ticket, result)
    }

    pub fn choose_lookup(&mut self) -> Option<String> {
        let choice = self.lookup.choose()?;
        let display = choice.display();
        self.register_type(&display);
        Some(display)
    }

    pub fn cancel_lookup(&mut self) {
        self.lookup.reset();
    }

    pub fn request_layout(&mut self, mode: LayoutMode, now: Instant) -> bool {
        self.layout.request(mode, now)
    }

    pub fn zoom_in(&mut self) {
        self.scale = layout::zoom_in(self.scale);
    }

    pub fn zoom_out(&mut self) {
        self.scale = layout::zoom_out(self.scale);
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = layout::clamp_scale(scale);
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        self.session.advance(now);
        self.layout.settle(now);
        self.poll_search(now)
    }

    pub fn set_visible(&mut self, visible: bool, now: Instant) {
        self.session.set_visible(visible, now);
    }
}
