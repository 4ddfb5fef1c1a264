/// Progress reporting for capture runs.
///
/// Reporters only observe; a capture behaves the same with `NoopProgress`.

use log::{info, warn};

/// Progress milestones the pipeline reports.
pub const PHASE_PREPARE: (&str, f32) = ("preparing messages", 0.05);
pub const PHASE_RENDER: (&str, f32) = ("rendering", 0.3);
pub const PHASE_ENCODE: (&str, f32) = ("generating image data", 0.8);
pub const PHASE_DONE: (&str, f32) = ("capture complete", 1.0);

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub phase: String,
    pub ratio: f32,
}

impl ProgressEvent {
    /// Build an event; `ratio` is clamped into [0, 1].
    pub fn new(phase: impl Into<String>, ratio: f32) -> Self {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        Self {
            phase: phase.into(),
            ratio,
        }
    }

    pub fn percent(&self) -> u32 {
        (self.ratio * 100.0).round() as u32
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
    fn settle(&self, success: bool);
}

/// Reporter that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: &ProgressEvent) {}
    fn settle(&self, _success: bool) {}
}

/// Reporter that writes progress through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, event: &ProgressEvent) {
        info!("[{:>3}%] {}", event.percent(), event.phase);
    }

    fn settle(&self, success: bool) {
        if success {
            info!("capture finished");
        } else {
            warn!("capture failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_clamped() {
        assert_eq!(ProgressEvent::new("x", 1.7).ratio, 1.0);
        assert_eq!(ProgressEvent::new("x", -0.2).ratio, 0.0);
        assert_eq!(ProgressEvent::new("x", f32::NAN).ratio, 0.0);
        assert_eq!(ProgressEvent::new("x", 0.3).percent(), 30);
    }

    #[test]
    fn milestones_are_increasing() {
        let ratios = [PHASE_PREPARE.1, PHASE_RENDER.1, PHASE_ENCODE.1, PHASE_DONE.1];
        assert!(ratios.windows(2).all(|w| w[0] < w[1]));
    }
}
