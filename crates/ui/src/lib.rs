use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use annotator_application::AppContext;
use annotator_application::colors::EntityColor;
use annotator_application::lookup::CodeLookup;
use annotator_application::session::format_duration;
use annotator_core::segment::char_len;
use annotator_core::{Entity, LayoutMode, PageNumber, Segment, SegmentKind};
use annotator_engine::{Engine, PageSize};
use annotator_storage::Storage;
use anyhow::Context as _;
use crossterm::event::{
    DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{event, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, HighlightSpacing, List, ListItem, ListState, Paragraph, Wrap,
};
use tracing::{info, warn};

mod text_view;

use text_view::{TextView, build_selection, wrap_rows};

const RUN_NAME_WIDTH: usize = 20;
const ENTITY_LIST_WIDTH: u16 = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiExit {
    Quit,
}

pub struct Ui {
    ctx: AppContext,
    storage: Storage,
    engine: Engine,
    codes: Box<dyn CodeLookup>,
    view: TextView,
    text_area: (usize, usize),
    page_size: Option<PageSize>,
    goto_panel: GotoPanel,
    search_panel: SearchPanel,
    lookup_panel: LookupPanel,
    label_panel: LabelPanel,
    entity_panel: EntityPanel,
    global_panel: GlobalPanel,
    runs_panel: RunsPanel,
    notice: Option<String>,
    error: Option<String>,
}

impl Ui {
    pub fn new(
        ctx: AppContext,
        storage: Storage,
        engine: Engine,
        codes: Box<dyn CodeLookup>,
        first_run: Option<&str>,
    ) -> Self {
        let mut ui = Self {
            ctx,
            storage,
            engine,
            codes,
            view: TextView::default(),
            text_area: (80, 20),
            page_size: None,
            goto_panel: GotoPanel::default(),
            search_panel: SearchPanel::default(),
            lookup_panel: LookupPanel::default(),
            label_panel: LabelPanel::default(),
            entity_panel: EntityPanel::default(),
            global_panel: GlobalPanel::default(),
            runs_panel: RunsPanel::default(),
            notice: None,
            error: None,
        };
        ui.open_first_run(first_run);
        ui
    }

    pub fn run(&mut self) -> anyhow::Result<AppContext> {
        let mut terminal = setup_terminal()?;
        terminal.clear().ok();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_loop(&mut terminal)
        }));
        let restore_result = restore_terminal(&mut terminal);

        match (result, restore_result) {
            (Ok(Ok(())), Ok(())) => Ok(self.ctx.clone()),
            (Ok(Ok(())), Err(err)) => Err(err),
            (Ok(Err(err)), Ok(())) => Err(err),
            (Ok(Err(_)), Err(err)) => Err(err),
            (Err(panic), Ok(())) => Err(anyhow::anyhow!(panic_to_string(panic))),
            (Err(panic), Err(err)) => Err(anyhow::anyhow!(
                "{}\n(additionally failed to restore terminal: {err})",
                panic_to_string(panic)
            )),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn open_first_run(&mut self, requested: Option<&str>) {
        match initial_run_id(&self.ctx, requested) {
            Some(id) => self.load_run(&id),
            None => {
                self.notice = Some("No runs yet. Import one with `annotator import`.".to_string());
            }
        }
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> anyhow::Result<()> {
        let tick_rate = Duration::from_millis(250);
        let mut needs_redraw = true;
        let mut shown_times = (0, 0);

        loop {
            if needs_redraw {
                terminal.draw(|frame| self.draw(frame.area(), frame))?;
                needs_redraw = false;
            }

            let now = Instant::now();
            if self.ctx.tick(now) {
                self.search_panel.selected = 0;
                needs_redraw = true;
            }
            if self.ctx.poll_lookup(now, self.codes.as_ref()) {
                needs_redraw = true;
            }
            let times = (
                self.ctx.session().current_page_time(),
                self.ctx.session().total_time(),
            );
            if times != shown_times {
                shown_times = times;
                needs_redraw = true;
            }

            if !event::poll(tick_rate)? {
                continue;
            }

            match event::read()? {
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                Event::FocusGained => {
                    self.ctx.set_visible(true, Instant::now());
                }
                Event::FocusLost => {
                    self.ctx.set_visible(false, Instant::now());
                }
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }
                    needs_redraw = true;
                    if let Some(UiExit::Quit) = self.handle_key(key)? {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(Some(UiExit::Quit));
        }
        if self.goto_panel.open {
            self.handle_goto_panel_key(key)
        } else if self.search_panel.open {
            self.handle_search_panel_key(key)
        } else if self.lookup_panel.open {
            self.handle_lookup_panel_key(key)
        } else if self.label_panel.open {
            self.handle_label_panel_key(key)
        } else if self.global_panel.open {
            self.handle_global_panel_key(key)
        } else if self.runs_panel.open {
            self.handle_runs_panel_key(key)
        } else if self.entity_panel.focused {
            self.handle_entity_panel_key(key)
        } else {
            self.handle_main_key(key)
        }
    }

    fn handle_main_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let now = Instant::now();
        self.error = None;
        let len = char_len(self.ctx.page_text());
        match key.code {
            KeyCode::Char('q') => return Ok(Some(UiExit::Quit)),
            KeyCode::Char('1') => {
                self.ctx.request_layout(LayoutMode::Split, now);
            }
            KeyCode::Char('2') => {
                self.ctx.request_layout(LayoutMode::Pdf, now);
            }
            KeyCode::Char('3') => {
                self.ctx.request_layout(LayoutMode::Annotator, now);
            }
            KeyCode::Tab => {
                let next = self.ctx.layout().mode().next();
                self.ctx.request_layout(next, now);
            }
            KeyCode::Char('n') | KeyCode::PageDown => self.step_page(1),
            KeyCode::Char('p') | KeyCode::PageUp => self.step_page(-1),
            KeyCode::Char('g') => {
                self.goto_panel.open = true;
                self.goto_panel.input.clear();
                self.goto_panel.error = None;
            }
            KeyCode::Char('/') => {
                self.search_panel.open = true;
                self.search_panel.selected = 0;
            }
            KeyCode::Char('c') => {
                self.lookup_panel.open = true;
            }
            KeyCode::Char('N') => {
                self.label_panel.open = true;
                self.label_panel.input.clear();
            }
            KeyCode::Char('t') => self.ctx.cycle_type(1),
            KeyCode::Char('T') => self.ctx.cycle_type(-1),
            KeyCode::Char('e') => {
                self.entity_panel.focused = true;
                self.entity_panel.selected = 0;
            }
            KeyCode::Char('a') => {
                self.global_panel.open = true;
                self.global_panel.selected = 0;
            }
            KeyCode::Char('r') => {
                self.runs_panel.open = true;
                self.runs_panel.selected = self
                    .ctx
                    .current_run_id()
                    .and_then(|id| self.ctx.runs().iter().position(|run| run.id == id))
                    .unwrap_or(0);
            }
            KeyCode::Char('[') => self.step_run(-1),
            KeyCode::Char(']') => self.step_run(1),
            KeyCode::Char('+') | KeyCode::Char('=') => self.ctx.zoom_in(),
            KeyCode::Char('-') => self.ctx.zoom_out(),
            KeyCode::Left | KeyCode::Char('h') => self.view.move_by(-1, len),
            KeyCode::Right | KeyCode::Char('l') => self.view.move_by(1, len),
            KeyCode::Up | KeyCode::Char('k') => self.move_rows(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_rows(1),
            KeyCode::Home => self.view.cursor = 0,
            KeyCode::End => self.view.move_by(isize::MAX, len),
            KeyCode::Char('v') => self.view.toggle_anchor(),
            KeyCode::Enter => self.annotate_selection(),
            KeyCode::Esc => {
                self.view.anchor = None;
                self.notice = None;
            }
            _ => {}
        }
        Ok(None)
    }

    fn handle_goto_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        match key.code {
            KeyCode::Esc => {
                self.goto_panel.open = false;
                self.goto_panel.input.clear();
                self.goto_panel.error = None;
            }
            KeyCode::Enter => {
                let input = self.goto_panel.input.trim();
                if input.is_empty() {
                    self.goto_panel.error = Some("Enter a page number".to_string());
                    return Ok(None);
                }
                let Ok(page) = input.parse::<u32>() else {
                    self.goto_panel.error = Some("Invalid page number".to_string());
                    return Ok(None);
                };
                match self.change_page(page) {
                    Ok(()) => {
                        self.goto_panel.open = false;
                        self.goto_panel.error = None;
                        self.goto_panel.input.clear();
                    }
                    Err(err) => self.goto_panel.error = Some(err),
                }
            }
            KeyCode::Backspace => {
                self.goto_panel.input.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.goto_panel.input.clear();
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() => {
                self.goto_panel.input.push(ch);
            }
            _ => {}
        }
        Ok(None)
    }

    fn handle_search_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let now = Instant::now();
        match key.code {
            KeyCode::Esc => {
                self.search_panel.open = false;
                self.ctx.set_search_input("", now);
            }
            KeyCode::Enter => {
                let hits = self.ctx.search_hits();
                if let Some(hit) = hits.get(self.search_panel.selected) {
                    let page = hit.page;
                    if let Err(err) = self.change_page(page) {
                        self.error = Some(err);
                    }
                }
                self.search_panel.open = false;
            }
            KeyCode::Up => {
                self.search_panel.selected = self.search_panel.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                let last = self.ctx.search_hits().len().saturating_sub(1);
                self.search_panel.selected = (self.search_panel.selected + 1).min(last);
            }
            KeyCode::Backspace => {
                let mut input = self.ctx.search_input().to_string();
                input.pop();
                self.ctx.set_search_input(input, now);
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.ctx.set_search_input("", now);
            }
            KeyCode::Char(ch) => {
                let mut input = self.ctx.search_input().to_string();
                input.push(ch);
                self.ctx.set_search_input(input, now);
            }
            _ => {}
        }
        Ok(None)
    }

    fn handle_lookup_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let now = Instant::now();
        match key.code {
            KeyCode::Esc => {
                self.ctx.cancel_lookup();
                self.lookup_panel.open = false;
            }
            KeyCode::Enter => {
                if let Some(chosen) = self.ctx.choose_lookup() {
                    info!(entity_type = %chosen, "type chosen from lookup");
                    self.notice = Some(format!("Type: {chosen}"));
                    self.lookup_panel.open = false;
                }
            }
            KeyCode::Up => self.ctx.move_lookup_selection(-1),
            KeyCode::Down => self.ctx.move_lookup_selection(1),
            KeyCode::Backspace => {
                let mut query = self.ctx.lookup().query().to_string();
                query.pop();
                self.ctx.set_lookup_query(query, now);
            }
            KeyCode::Char(ch) => {
                let mut query = self.ctx.lookup().query().to_string();
                query.push(ch);
                self.ctx.set_lookup_query(query, now);
            }
            _ => {}
        }
        Ok(None)
    }

    fn handle_label_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        match key.code {
            KeyCode::Esc => {
                self.label_panel.open = false;
                self.label_panel.input.clear();
            }
            KeyCode::Enter => {
                let label = self.label_panel.input.trim().to_string();
                if !label.is_empty() {
                    self.ctx.register_type(&label);
                    self.notice = Some(format!("Type: {label}"));
                }
                self.label_panel.open = false;
                self.label_panel.input.clear();
            }
            KeyCode::Backspace => {
                self.label_panel.input.pop();
            }
            KeyCode::Char(ch) => self.label_panel.input.push(ch),
            _ => {}
        }
        Ok(None)
    }

    fn handle_entity_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let entities = self.ctx.page_entities().to_vec();
        let last = entities.len().saturating_sub(1);
        match key.code {
            KeyCode::Esc | KeyCode::Char('e') => self.entity_panel.focused = false,
            KeyCode::Up | KeyCode::Char('k') => {
                self.entity_panel.selected = self.entity_panel.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.entity_panel.selected = (self.entity_panel.selected + 1).min(last);
            }
            KeyCode::Enter => {
                if let Some(entity) = entities.get(self.entity_panel.selected) {
                    self.jump_to_entity(entity);
                    self.entity_panel.focused = false;
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                if let Some(entity) = entities.get(self.entity_panel.selected) {
                    let page = self.ctx.current_page();
                    if self.ctx.delete_entity(page, &entity.id) {
                        self.notice = Some(format!("Deleted \"{}\"", entity.text));
                    }
                    self.entity_panel.selected = self
                        .entity_panel
                        .selected
                        .min(entities.len().saturating_sub(2));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn handle_global_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let items = self.global_items();
        let last = items.len().saturating_sub(1);
        match key.code {
            KeyCode::Esc | KeyCode::Char('a') => self.global_panel.open = false,
            KeyCode::Up | KeyCode::Char('k') => {
                self.global_panel.selected = self.global_panel.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.global_panel.selected = (self.global_panel.selected + 1).min(last);
            }
            KeyCode::Enter => {
                if let Some((page, entity)) = items.get(self.global_panel.selected) {
                    match self.change_page(*page) {
                        Ok(()) => {
                            self.jump_to_entity(entity);
                            self.global_panel.open = false;
                        }
                        Err(err) => self.error = Some(err),
                    }
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                if let Some((page, entity)) = items.get(self.global_panel.selected) {
                    self.ctx.delete_entity(*page, &entity.id);
                    self.global_panel.selected =
                        self.global_panel.selected.min(items.len().saturating_sub(2));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn handle_runs_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let last = self.ctx.runs().len().saturating_sub(1);
        match key.code {
            KeyCode::Esc | KeyCode::Char('r') => self.runs_panel.open = false,
            KeyCode::Up | KeyCode::Char('k') => {
                self.runs_panel.selected = self.runs_panel.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.runs_panel.selected = (self.runs_panel.selected + 1).min(last);
            }
            KeyCode::Enter => {
                if let Some(id) = self
                    .ctx
                    .runs()
                    .get(self.runs_panel.selected)
                    .map(|run| run.id.clone())
                {
                    self.load_run(&id);
                }
                self.runs_panel.open = false;
            }
            _ => {}
        }
        Ok(None)
    }

    fn global_items(&self) -> Vec<(PageNumber, Entity)> {
        self.ctx
            .store()
            .annotated_pages()
            .into_iter()
            .flat_map(|(page, entities)| entities.iter().map(move |e| (page, e.clone())))
            .collect()
    }

    fn load_run(&mut self, id: &str) {
        if !self.ctx.needs_load(id) {
            return;
        }
        let data = match self.storage.fetch_run(id) {
            Ok(data) => data,
            Err(err) => {
                warn!(run = id, error = %err, "failed to load run");
                self.error = Some(format!("Failed to load run: {err}"));
                return;
            }
        };
        let pdf_path = data.pdf_path.clone();
        self.ctx.apply_run(id, data, Instant::now());
        self.view.reset();
        self.entity_panel = EntityPanel::default();
        self.page_size = None;
        self.error = None;
        self.notice = self.ctx.current_run().map(|run| format!("Opened {}", run.filename));

        match self.engine.page_count(&pdf_path) {
            Ok(pages) => {
                self.ctx.document_loaded(pages);
                self.refresh_page_size();
            }
            Err(err) => {
                warn!(path = %pdf_path, error = %err, "document not loaded");
                self.error = Some(format!("PDF not loaded: {err}"));
            }
        }
    }

    fn step_run(&mut self, delta: isize) {
        let Some(id) = self.ctx.neighbour_run(delta).map(|run| run.id.clone()) else {
            return;
        };
        self.load_run(&id);
    }

    fn change_page(&mut self, page: PageNumber) -> Result<(), String> {
        if page == self.ctx.current_page() {
            return Ok(());
        }
        self.ctx
            .change_page(page, Instant::now())
            .map_err(|err| err.to_string())?;
        self.view.reset();
        self.entity_panel.selected = 0;
        self.refresh_page_size();
        Ok(())
    }

    fn step_page(&mut self, delta: i32) {
        let target = add_signed_u32(self.ctx.current_page(), delta);
        if let Err(err) = self.change_page(target) {
            self.error = Some(err);
        }
    }

    fn refresh_page_size(&mut self) {
        let Some(data) = self.ctx.run_data() else {
            self.page_size = None;
            return;
        };
        self.page_size = self
            .engine
            .page_size(&data.pdf_path, self.ctx.current_page())
            .ok();
    }

    fn move_rows(&mut self, delta: isize) {
        let rows = wrap_rows(self.ctx.page_text(), self.text_area.0);
        self.view.move_rows(delta, &rows);
    }

    fn jump_to_entity(&mut self, entity: &Entity) {
        self.view.anchor = None;
        self.view.cursor = entity.start;
        self.view.clamp(char_len(self.ctx.page_text()));
    }

    fn annotate_selection(&mut self) {
        let Some(range) = self.view.selection_range() else {
            self.notice = Some("Press v to start a selection".to_string());
            return;
        };
        if self.ctx.selected_type().is_none() {
            self.error = Some("Select an entity type first (t, c or N)".to_string());
            return;
        }
        let segments = self.ctx.segments();
        let chunks: Vec<&str> = segments.iter().map(|s| s.content.as_str()).collect();
        let Some(selection) = build_selection(&chunks, self.ctx.page_text(), range) else {
            return;
        };
        match self
            .ctx
            .annotate_selection(&selection, Some(chunks.as_slice()), unix_now_millis())
        {
            Some(entity) => {
                self.notice = Some(format!("Added \"{}\" as {}", entity.text, entity.entity_type));
                self.view.anchor = None;
            }
            None => {
                self.notice = Some("Nothing to annotate in that selection".to_string());
            }
        }
    }

    fn draw(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        frame.render_widget(Clear, area);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(2),
            ])
            .split(area);

        frame.render_widget(
            Paragraph::new(self.header_line()).alignment(Alignment::Left),
            layout[0],
        );

        let (shows_pdf, shows_annotator) = (
            self.ctx.layout().shows_pdf(),
            self.ctx.layout().shows_annotator(),
        );
        if shows_pdf && shows_annotator {
            let body = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
                .split(layout[1]);
            self.draw_pdf_pane(body[0], frame);
            self.draw_annotator_pane(body[1], frame);
        } else if shows_pdf {
            self.draw_pdf_pane(layout[1], frame);
        } else {
            self.draw_annotator_pane(layout[1], frame);
        }

        let footer = Paragraph::new(Text::from(self.footer_lines()))
            .block(Block::default().borders(Borders::TOP));
        frame.render_widget(footer, layout[2]);

        if self.goto_panel.open {
            self.draw_goto_panel(area, frame);
        }
        if self.search_panel.open {
            self.draw_search_panel(area, frame);
        }
        if self.lookup_panel.open {
            self.draw_lookup_panel(area, frame);
        }
        if self.label_panel.open {
            self.draw_label_panel(area, frame);
        }
        if self.global_panel.open {
            self.draw_global_panel(area, frame);
        }
        if self.runs_panel.open {
            self.draw_runs_panel(area, frame);
        }
    }

    fn header_line(&self) -> Line<'static> {
        let run = self
            .ctx
            .current_run()
            .map(|run| run.short_name(RUN_NAME_WIDTH))
            .unwrap_or_else(|| "no run".to_string());
        let pages = self
            .ctx
            .session()
            .num_pages()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        Line::from(vec![
            Span::styled(" annotator ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("| {run} ")),
            Span::raw(format!("| page {}/{pages} ", self.ctx.current_page())),
            Span::raw(format!("| {} ", self.ctx.layout().mode())),
            Span::raw(format!("| zoom {:.0}%", self.ctx.scale() * 100.0)),
        ])
    }

    fn footer_lines(&self) -> Vec<Line<'static>> {
        let message = if let Some(err) = &self.error {
            Line::from(Span::styled(
                err.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ))
        } else if let Some(notice) = &self.notice {
            Line::raw(notice.clone())
        } else {
            Line::raw("")
        };
        vec![
            message,
            Line::from(Span::styled(
                "q quit  1/2/3 layout  n/p page  g goto  / search  v select  Enter annotate  t/T type  c code  N label  e entities  a all  r runs  [ ] run  +/- zoom",
                Style::default().fg(Color::DarkGray),
            )),
        ]
    }

    fn draw_pdf_pane(&self, area: Rect, frame: &mut ratatui::Frame) {
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "PDF",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let session = self.ctx.session();
        let label = Style::default().add_modifier(Modifier::BOLD);

        let mut lines = Vec::new();
        match (self.ctx.current_run(), self.ctx.run_data()) {
            (Some(run), Some(data)) => {
                lines.push(Line::from(vec![
                    Span::styled("File: ", label),
                    Span::raw(run.filename.clone()),
                ]));
                lines.push(Line::from(vec![
                    Span::styled("Path: ", label),
                    Span::raw(data.pdf_path.clone()),
                ]));
            }
            _ => lines.push(Line::raw("No document loaded")),
        }
        let page_label = match session.num_pages() {
            Some(total) => format!("{} of {total}", session.current_page()),
            None => "Document not loaded".to_string(),
        };
        lines.push(Line::from(vec![
            Span::styled("Page: ", label),
            Span::raw(page_label),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Zoom: ", label),
            Span::raw(format!("{:.0}%", self.ctx.scale() * 100.0)),
        ]));
        if let Some(size) = self.page_size {
            let scaled = size.scaled(self.ctx.scale());
            lines.push(Line::from(vec![
                Span::styled("Size: ", label),
                Span::raw(format!(
                    "{:.0} x {:.0} pt ({:.0} x {:.0} at zoom)",
                    size.width, size.height, scaled.width, scaled.height
                )),
            ]));
        }
        lines.push(Line::raw(""));
        lines.push(Line::from(vec![
            Span::styled("Time on page: ", label),
            Span::raw(format_duration(session.current_page_time())),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Total time: ", label),
            Span::raw(format_duration(session.total_time())),
        ]));
        let visited: Vec<String> = session.visited().iter().map(|p| p.to_string()).collect();
        lines.push(Line::from(vec![
            Span::styled("Visited: ", label),
            Span::raw(visited.join(", ")),
        ]));
        if !session.is_visible() {
            lines.push(Line::from(Span::styled(
                "timer paused",
                Style::default().fg(Color::DarkGray),
            )));
        }

        let paragraph = Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn draw_annotator_pane(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Annotator",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(inner);
        frame.render_widget(Paragraph::new(self.annotator_status_line()), sections[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(ENTITY_LIST_WIDTH)])
            .split(sections[1]);
        self.draw_page_text(body[0], frame);
        self.draw_entity_list(body[1], frame);
    }

    fn annotator_status_line(&mut self) -> Line<'static> {
        let mut spans = vec![Span::styled(
            "Type: ",
            Style::default().add_modifier(Modifier::BOLD),
        )];
        match self.ctx.selected_type().map(str::to_string) {
            Some(entity_type) => {
                let color = entity_color(self.ctx.color_for(&entity_type));
                spans.push(Span::styled(
                    entity_type,
                    Style::default().fg(Color::Black).bg(color),
                ));
            }
            None => spans.push(Span::styled("none", Style::default().fg(Color::DarkGray))),
        }
        let term = self.ctx.search_term();
        if !term.is_empty() {
            let total: usize = self.ctx.search_hits().iter().map(|hit| hit.count).sum();
            spans.push(Span::raw(format!("  Search: \"{term}\" ({total} hits)")));
        }
        if let Some((start, end)) = self.view.selection_range() {
            spans.push(Span::raw(format!("  Selecting {start}..{end}")));
        }
        Line::from(spans)
    }

    fn draw_page_text(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let width = usize::from(area.width).max(1);
        let height = usize::from(area.height).max(1);
        self.text_area = (width, height);

        let page_text = self.ctx.page_text().to_string();
        if page_text.is_empty() {
            let paragraph = Paragraph::new(Line::from(Span::styled(
                "No text for this page",
                Style::default().fg(Color::DarkGray),
            )));
            frame.render_widget(paragraph, area);
            return;
        }

        let segments = self.ctx.segments();
        let styles = self.segment_styles(&segments);
        let chars: Vec<char> = page_text.chars().collect();
        let rows = wrap_rows(&page_text, width);
        self.view.clamp(chars.len());
        self.view.ensure_visible(&rows, height);

        let lines: Vec<Line> = rows
            .iter()
            .skip(self.view.scroll)
            .take(height)
            .map(|row| {
                let mut spans = Vec::new();
                let mut run = String::new();
                let mut run_style = Style::default();
                for offset in row.start..row.end {
                    let ch = chars[offset];
                    let mut style = styles.get(offset).copied().unwrap_or_default();
                    if self.view.is_selected(offset) {
                        style = style.bg(Color::DarkGray).fg(Color::White);
                    }
                    if offset == self.view.cursor {
                        style = style.add_modifier(Modifier::REVERSED);
                    }
                    let shown = if ch == '\n' { ' ' } else { ch };
                    if style != run_style && !run.is_empty() {
                        spans.push(Span::styled(std::mem::take(&mut run), run_style));
                    }
                    run_style = style;
                    run.push(shown);
                }
                if !run.is_empty() {
                    spans.push(Span::styled(run, run_style));
                }
                Line::from(spans)
            })
            .collect();
        frame.render_widget(Paragraph::new(Text::from(lines)), area);
    }

    fn segment_styles(&mut self, segments: &[Segment]) -> Vec<Style> {
        let mut styles = Vec::new();
        for segment in segments {
            let style = match segment.kind {
                SegmentKind::Plain => Style::default(),
                SegmentKind::Search => search_style(),
                SegmentKind::Entity => {
                    let entity_type = segment.entity_type.as_deref().unwrap_or_default();
                    Style::default()
                        .fg(Color::Black)
                        .bg(entity_color(self.ctx.color_for(entity_type)))
                }
            };
            styles.extend(std::iter::repeat_n(style, segment.len()));
        }
        styles
    }

    fn draw_entity_list(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let entities = self.ctx.page_entities().to_vec();
        let focus = self.entity_panel.focused;
        let items: Vec<ListItem> = if entities.is_empty() {
            vec![ListItem::new(Line::raw("(none)"))]
        } else {
            entities
                .iter()
                .map(|entity| {
                    let color = entity_color(self.ctx.color_for(&entity.entity_type));
                    ListItem::new(Line::from(vec![
                        Span::styled("■ ", Style::default().fg(color)),
                        Span::raw(entity.text.clone()),
                        Span::styled(
                            format!(" [{}]", entity.entity_type),
                            Style::default().fg(Color::DarkGray),
                        ),
                    ]))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::LEFT)
                    .border_style(if focus {
                        Style::default().fg(Color::Yellow)
                    } else {
                        Style::default()
                    })
                    .title(format!("Entities ({})", entities.len())),
            )
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        if focus && !entities.is_empty() {
            state.select(Some(self.entity_panel.selected.min(entities.len() - 1)));
        }
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_goto_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(48, 28, area);
        frame.render_widget(Clear, popup_area);

        let title = match self.ctx.session().num_pages() {
            Some(total) => format!("Go to page (1..={total})"),
            None => "Go to page".to_string(),
        };
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(block.clone(), popup_area);

        let inner = block.inner(popup_area);
        let mut lines = vec![
            Line::from(vec![
                Span::styled("Page: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.goto_panel.input.clone()),
            ]),
            Line::raw(""),
            Line::raw("Enter jumps, Esc cancels, Ctrl+u clears."),
        ];
        if let Some(err) = &self.goto_panel.error {
            lines.push(Line::raw(""));
            lines.push(Line::from(Span::styled(
                err.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )));
        }
        let paragraph = Paragraph::new(Text::from(lines))
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Left);
        frame.render_widget(paragraph, inner);
    }

    fn draw_search_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(50, 50, area);
        frame.render_widget(Clear, popup_area);
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Search document",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Min(0)])
            .split(inner);

        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled("Find: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.ctx.search_input().to_string()),
            ])),
            sections[0],
        );

        let hits = self.ctx.search_hits();
        let items: Vec<ListItem> = if hits.is_empty() {
            let hint = if self.ctx.search_input().trim().chars().count()
                < self.ctx.settings.search_min_chars
            {
                format!(
                    "Type at least {} characters",
                    self.ctx.settings.search_min_chars
                )
            } else {
                "No matches".to_string()
            };
            vec![ListItem::new(Line::raw(hint))]
        } else {
            hits.iter()
                .map(|hit| {
                    let noun = if hit.count == 1 { "match" } else { "matches" };
                    ListItem::new(Line::raw(format!(
                        "Page {}: {} {noun}",
                        hit.page, hit.count
                    )))
                })
                .collect()
        };
        let list = List::new(items)
            .highlight_style(search_style())
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        if !hits.is_empty() {
            state.select(Some(self.search_panel.selected.min(hits.len() - 1)));
        }
        frame.render_stateful_widget(list, sections[1], &mut state);
    }

    fn draw_lookup_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(70, 60, area);
        frame.render_widget(Clear, popup_area);
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Search ICD codes",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Min(0)])
            .split(inner);

        let lookup = self.ctx.lookup();
        let mut header = vec![
            Span::styled("Code: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(lookup.query().to_string()),
        ];
        if lookup.is_pending() {
            header.push(Span::styled(
                "  searching...",
                Style::default().fg(Color::DarkGray),
            ));
        }
        frame.render_widget(Paragraph::new(Line::from(header)), sections[0]);

        let items: Vec<ListItem> = if let Some(err) = lookup.error() {
            vec![ListItem::new(Line::from(Span::styled(
                err.to_string(),
                Style::default().fg(Color::Red),
            )))]
        } else if lookup.results().is_empty() {
            vec![ListItem::new(Line::raw(format!(
                "Type at least {} characters",
                self.ctx.settings.lookup_min_chars
            )))]
        } else {
            lookup
                .results()
                .iter()
                .map(|choice| {
                    ListItem::new(Line::from(vec![
                        Span::styled(
                            choice.code.clone(),
                            Style::default().add_modifier(Modifier::BOLD),
                        ),
                        Span::raw(format!("  {}", choice.description)),
                    ]))
                })
                .collect()
        };
        let list = List::new(items)
            .highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan))
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        if lookup.error().is_none() && !lookup.results().is_empty() {
            state.select(Some(lookup.selected()));
        }
        frame.render_stateful_widget(list, sections[1], &mut state);
    }

    fn draw_label_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(48, 24, area);
        frame.render_widget(Clear, popup_area);
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "New entity type",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(block.clone(), popup_area);
        let lines = vec![
            Line::from(vec![
                Span::styled("Label: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.label_panel.input.clone()),
            ]),
            Line::raw(""),
            Line::raw("Enter adds and selects, Esc cancels."),
        ];
        frame.render_widget(
            Paragraph::new(Text::from(lines)).wrap(Wrap { trim: true }),
            block.inner(popup_area),
        );
    }

    fn draw_global_panel(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(70, 70, area);
        frame.render_widget(Clear, popup_area);
        let items = self.global_items();
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            format!("All annotations ({})", items.len()),
            Style::default().add_modifier(Modifier::BOLD),
        ));

        let list_items: Vec<ListItem> = if items.is_empty() {
            vec![ListItem::new(Line::raw("No annotations yet"))]
        } else {
            items
                .iter()
                .map(|(page, entity)| {
                    let color = entity_color(self.ctx.color_for(&entity.entity_type));
                    ListItem::new(Line::from(vec![
                        Span::raw(format!("p{page:<4}")),
                        Span::styled("■ ", Style::default().fg(color)),
                        Span::raw(entity.text.clone()),
                        Span::styled(
                            format!(" [{}]", entity.entity_type),
                            Style::default().fg(Color::DarkGray),
                        ),
                    ]))
                })
                .collect()
        };
        let list = List::new(list_items)
            .block(block)
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        if !items.is_empty() {
            state.select(Some(self.global_panel.selected.min(items.len() - 1)));
        }
        frame.render_stateful_widget(list, popup_area, &mut state);
    }

    fn draw_runs_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(50, 50, area);
        frame.render_widget(Clear, popup_area);
        let current = self.ctx.current_run_id();
        let runs = self.ctx.runs();
        let items: Vec<ListItem> = if runs.is_empty() {
            vec![ListItem::new(Line::raw("(none)"))]
        } else {
            runs.iter()
                .map(|run| {
                    let prefix = if Some(run.id.as_str()) == current {
                        "●"
                    } else {
                        " "
                    };
                    ListItem::new(Line::raw(format!(
                        "{prefix} {}",
                        run.short_name(RUN_NAME_WIDTH)
                    )))
                })
                .collect()
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(Span::styled(
                "Runs",
                Style::default().add_modifier(Modifier::BOLD),
            )))
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        if !runs.is_empty() {
            state.select(Some(self.runs_panel.selected.min(runs.len() - 1)));
        }
        frame.render_stateful_widget(list, popup_area, &mut state);
    }
}

#[derive(Debug, Clone, Default)]
struct GotoPanel {
    open: bool,
    input: String,
    error: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct SearchPanel {
    open: bool,
    selected: usize,
}

#[derive(Debug, Clone, Default)]
struct LookupPanel {
    open: bool,
}

#[derive(Debug, Clone, Default)]
struct LabelPanel {
    open: bool,
    input: String,
}

#[derive(Debug, Clone, Default)]
struct EntityPanel {
    focused: bool,
    selected: usize,
}

#[derive(Debug, Clone, Default)]
struct GlobalPanel {
    open: bool,
    selected: usize,
}

#[derive(Debug, Clone, Default)]
struct RunsPanel {
    open: bool,
    selected: usize,
}

fn initial_run_id(ctx: &AppContext, requested: Option<&str>) -> Option<String> {
    if let Some(id) = ctx.current_run_id() {
        return Some(id.to_string());
    }
    requested
        .map(str::to_string)
        .or_else(|| ctx.runs().first().map(|run| run.id.clone()))
}

fn entity_color(color: EntityColor) -> Color {
    match color {
        EntityColor::Red => Color::Red,
        EntityColor::Blue => Color::LightBlue,
        EntityColor::Green => Color::Green,
        EntityColor::Yellow => Color::Yellow,
        EntityColor::Purple => Color::Magenta,
        EntityColor::Pink => Color::LightMagenta,
        EntityColor::Indigo => Color::Indexed(62),
        EntityColor::Cyan => Color::Cyan,
        EntityColor::Rose => Color::LightRed,
    }
}

fn search_style() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(Color::LightYellow)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
}

fn add_signed_u32(value: u32, delta: i32) -> u32 {
    if delta >= 0 {
        value.saturating_add(delta as u32)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen, EnableFocusChange)
        .context("enter alt screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    crossterm::execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)
        .context("leave alt screen")?;
    Ok(())
}

fn panic_to_string(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (unknown payload)".to_string()
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn unix_now_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
