use std::time::Duration;
use tokio::time::Instant;

/// Playback clock for elements without a real decoder behind them.
#[derive(Debug, Default)]
pub(crate) struct Timer {
    started: Option<Instant>,
    offset: Duration,
}

impl Timer {
    pub(crate) fn reset(&mut self) {
        self.started = None;
        self.offset = Duration::ZERO;
    }

    pub(crate) fn resume(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    pub(crate) fn halt(&mut self) {
        if let Some(started) = self.started.take() {
            self.offset += started.elapsed();
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub(crate) fn position(&self) -> Duration {
        self.offset + self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    pub(crate) fn seek(&mut self, position: Duration) {
        self.offset = position;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}
