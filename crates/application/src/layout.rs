use std::time::{Duration, Instant};

use annotator_core::{LayoutMode, MAX_SCALE, MIN_SCALE};
use tracing::info;

#[derive(Debug, Clone)]
pub struct LayoutState {
    mode: LayoutMode,
    settle: Duration,
    transitioning_until: Option<Instant>,
}

impl LayoutState {
    pub fn new(mode: LayoutMode, settle: Duration) -> Self {
        Self {
            mode,
            settle,
            transitioning_until: None,
        }
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    pub fn request(&mut self, mode: LayoutMode, now: Instant) -> bool {
        if self.is_transitioning(now) || mode == self.mode {
            return false;
        }
        info!(from = %self.mode, to = %mode, "layout change");
        self.mode = mode;
        self.transitioning_until = Some(now + self.settle);
        true
    }

    pub fn is_transitioning(&self, now: Instant) -> bool {
        self.transitioning_until.is_some_and(|until| now < until)
    }

    pub fn settle(&mut self, now: Instant) {
        if !self.is_transitioning(now) {
            self.transitioning_until = None;
        }
    }

    pub fn shows_pdf(&self) -> bool {
        self.mode != LayoutMode::Annotator
    }

    pub fn shows_annotator(&self) -> bool {
        self.mode != LayoutMode::Pdf
    }
}

pub const SCALE_STEP: f32 = 0.1;

pub fn clamp_scale(scale: f32) -> f32 {
    if !scale.is_finite() {
        return 1.0;
    }
    let clamped = scale.clamp(MIN_SCALE, MAX_SCALE);
    if (0.8..=1.0).contains(&clamped) {
        (clamped * 20.0).round() / 20.0
    } else {
        (clamped * 10.0).round() / 10.0
    }
}

pub fn zoom_in(scale: f32) -> f32 {
    clamp_scale(scale + SCALE_STEP)
}

pub fn zoom_out(scale: f32) -> f32 {
    clamp_scale(scale - SCALE_STEP)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn starts_in_requested_mode() {
        let layout = LayoutState::new(LayoutMode::Split, Duration::from_millis(500));
        assert_eq!(layout.mode(), LayoutMode::Split);
        assert!(layout.shows_pdf());
        assert!(layout.shows_annotator());
    }

    #[test]
    fn transitions_are_gated_until_settled() {
        let now = Instant::now();
        let mut layout = LayoutState::new(LayoutMode::Split, Duration::from_millis(500));
        assert!(layout.request(LayoutMode::Pdf, now));
        assert!(layout.is_transitioning(now));
        assert!(!layout.shows_annotator());

        assert!(!layout.request(LayoutMode::Annotator, now + Duration::from_millis(100)));
        assert_eq!(layout.mode(), LayoutMode::Pdf);

        let later = now + Duration::from_millis(500);
        layout.settle(later);
        assert!(!layout.is_transitioning(later));
        assert!(layout.request(LayoutMode::Annotator, later));
        assert!(!layout.shows_pdf());
    }

    #[test]
    fn same_mode_is_ignored() {
        let now = Instant::now();
        let mut layout = LayoutState::new(LayoutMode::Annotator, Duration::from_millis(500));
        assert!(!layout.request(LayoutMode::Annotator, now));
        assert!(!layout.is_transitioning(now));
    }

    #[test]
    fn scale_is_clamped_and_snapped() {
        assert!(close(clamp_scale(0.2), 0.6));
        assert!(close(clamp_scale(4.0), 1.5));
        assert!(close(clamp_scale(0.87), 0.85));
        assert!(close(clamp_scale(0.93), 0.95));
        assert!(close(clamp_scale(1.23), 1.2));
        assert!(close(clamp_scale(0.74), 0.7));
        assert!(close(clamp_scale(f32::NAN), 1.0));
    }

    #[test]
    fn zoom_steps_stay_in_range() {
        assert!(close(zoom_in(0.85), 0.95));
        assert!(close(zoom_in(1.5), 1.5));
        assert!(close(zoom_out(0.6), 0.6));
        assert!(close(zoom_out(1.0), 0.9));
    }
}
