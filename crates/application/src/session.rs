use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use annotator_core::{AnnotatorError, PageNumber};
use tracing::{debug, info};

/// Converts wall-clock time into whole elapsed seconds.
///
/// Sub-second remainders carry over between polls. Pausing keeps the
/// remainder, restarting drops it.
#[derive(Debug, Clone)]
pub struct DwellClock {
    running_since: Option<Instant>,
    carry: Duration,
}

impl DwellClock {
    pub fn new(now: Instant) -> Self {
        Self {
            running_since: Some(now),
            carry: Duration::ZERO,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn poll(&mut self, now: Instant) -> u64 {
        let Some(since) = self.running_since else {
            return 0;
        };
        let elapsed = self.carry + now.saturating_duration_since(since);
        let whole = elapsed.as_secs();
        self.carry = elapsed - Duration::from_secs(whole);
        self.running_since = Some(now);
        whole
    }

    pub fn pause(&mut self, now: Instant) -> u64 {
        let whole = self.poll(now);
        self.running_since = None;
        whole
    }

    pub fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn restart(&mut self, now: Instant) {
        self.carry = Duration::ZERO;
        if self.running_since.is_some() {
            self.running_since = Some(now);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageSession {
    current_page: PageNumber,
    num_pages: Option<u32>,
    visited: BTreeSet<PageNumber>,
    page_times: BTreeMap<PageNumber, u64>,
    current_page_time: u64,
    visible: bool,
    clock: DwellClock,
}

impl PageSession {
    pub fn new(now: Instant) -> Self {
        Self {
            current_page: 1,
            num_pages: None,
            visited: BTreeSet::from([1]),
            page_times: BTreeMap::new(),
            current_page_time: 0,
            visible: true,
            clock: DwellClock::new(now),
        }
    }

    pub fn current_page(&self) -> PageNumber {
        self.current_page
    }

    pub fn num_pages(&self) -> Option<u32> {
        self.num_pages
    }

    pub fn visited(&self) -> &BTreeSet<PageNumber> {
        &self.visited
    }

    pub fn page_times(&self) -> &BTreeMap<PageNumber, u64> {
        &self.page_times
    }

    pub fn current_page_time(&self) -> u64 {
        self.current_page_time
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn total_time(&self) -> u64 {
        self.page_times.values().sum()
    }

    pub fn document_loaded(&mut self, num_pages: u32) {
        info!(num_pages, "document loaded");
        self.num_pages = Some(num_pages);
    }

    /// Moves to `page` if it is within `1..=num_pages`.
    ///
    /// Time elapsed so far is credited to the page being left. Revisited
    /// pages resume from their recorded time.
    pub fn change_page(&mut self, page: PageNumber, now: Instant) -> Result<(), AnnotatorError> {
        let num_pages = self.num_pages.ok_or(AnnotatorError::DocumentNotLoaded)?;
        if page < 1 || page > num_pages {
            return Err(AnnotatorError::PageOutOfRange { page, num_pages });
        }
        self.advance(now);
        self.current_page = page;
        self.visited.insert(page);
        self.current_page_time = self.page_times.get(&page).copied().unwrap_or(0);
        self.clock.restart(now);
        debug!(page, resumed_at = self.current_page_time, "page changed");
        Ok(())
    }

    pub fn tick(&mut self) {
        self.credit(1);
    }

    pub fn advance(&mut self, now: Instant) {
        let seconds = self.clock.poll(now);
        self.credit(seconds);
    }

    pub fn set_visible(&mut self, visible: bool, now: Instant) {
        if visible == self.visible {
            return;
        }
        if visible {
            self.clock.resume(now);
        } else {
            let seconds = self.clock.pause(now);
            self.credit(seconds);
        }
        self.visible = visible;
        debug!(visible, "visibility changed");
    }

    pub fn reset_for_new_run(&mut self, now: Instant) {
        self.current_page = 1;
        self.num_pages = None;
        self.visited = BTreeSet::from([1]);
        self.page_times.clear();
        self.current_page_time = 0;
        self.clock.restart(now);
    }

    fn credit(&mut self, seconds: u64) {
        if seconds == 0 || !self.visible {
            return;
        }
        *self.page_times.entry(self.current_page).or_insert(0) += seconds;
        self.current_page_time += seconds;
    }
}

pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(num_pages: u32) -> (PageSession, Instant) {
        let now = Instant::now();
        let mut session = PageSession::new(now);
        session.document_loaded(num_pages);
        (session, now)
    }

    #[test]
    fn change_page_enforces_bounds() {
        let (mut session, now) = loaded(5);
        assert_eq!(
            session.change_page(0, now),
            Err(AnnotatorError::PageOutOfRange {
                page: 0,
                num_pages: 5
            })
        );
        assert_eq!(session.current_page(), 1);
        assert!(session.change_page(6, now).is_err());
        assert_eq!(session.current_page(), 1);
        session.change_page(5, now).unwrap();
        assert_eq!(session.current_page(), 5);
        assert!(session.visited().contains(&5));
    }

    #[test]
    fn change_page_requires_document() {
        let mut session = PageSession::new(Instant::now());
        assert_eq!(
            session.change_page(2, Instant::now()),
            Err(AnnotatorError::DocumentNotLoaded)
        );
        assert_eq!(session.current_page(), 1);
    }

    #[test]
    fn revisited_page_resumes_time() {
        let (mut session, now) = loaded(5);
        session.change_page(2, now).unwrap();
        session.tick();
        session.tick();
        session.tick();
        session.change_page(3, now).unwrap();
        assert_eq!(session.current_page_time(), 0);
        session.change_page(2, now).unwrap();
        assert_eq!(session.current_page_time(), 3);
    }

    #[test]
    fn reset_clears_previous_run() {
        let (mut session, now) = loaded(5);
        for page in [2, 3] {
            session.change_page(page, now).unwrap();
            session.tick();
        }
        session.reset_for_new_run(now);
        assert_eq!(session.visited(), &BTreeSet::from([1]));
        assert!(session.page_times().is_empty());
        assert_eq!(session.current_page(), 1);
        assert_eq!(session.current_page_time(), 0);
        assert_eq!(session.num_pages(), None);
    }

    #[test]
    fn clock_credits_whole_seconds_and_carries_remainder() {
        let (mut session, start) = loaded(3);
        session.advance(start + Duration::from_millis(1_500));
        assert_eq!(session.current_page_time(), 1);
        session.advance(start + Duration::from_millis(2_100));
        assert_eq!(session.current_page_time(), 2);
        assert_eq!(session.page_times()[&1], 2);
    }

    #[test]
    fn hidden_session_does_not_accumulate() {
        let (mut session, start) = loaded(3);
        session.set_visible(false, start + Duration::from_secs(2));
        assert_eq!(session.current_page_time(), 2);
        session.advance(start + Duration::from_secs(30));
        assert_eq!(session.current_page_time(), 2);
        session.tick();
        assert_eq!(session.current_page_time(), 2);

        session.set_visible(true, start + Duration::from_secs(30));
        session.advance(start + Duration::from_secs(31));
        assert_eq!(session.current_page_time(), 3);
    }

    #[test]
    fn leaving_a_page_credits_elapsed_time() {
        let (mut session, start) = loaded(3);
        session
            .change_page(2, start + Duration::from_secs(4))
            .unwrap();
        assert_eq!(session.page_times()[&1], 4);
        assert_eq!(session.current_page_time(), 0);
        assert_eq!(session.total_time(), 4);
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(600), "10:00");
    }
}
