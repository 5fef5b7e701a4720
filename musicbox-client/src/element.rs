use crate::{Error, Result, timer::Timer};
use std::time::Duration;
use tracing::info;
use url::Url;

/// The local audio output the sync controller drives.
///
/// Mirrors the surface of a browser media element: a source, play/pause,
/// a linear volume and a seekable position in seconds.
pub trait MediaElement {
    fn source(&self) -> Option<&Url>;

    /// Loads a new source. The element is paused at position zero afterwards.
    fn set_source(&mut self, source: Url);

    /// May be refused, for example by an autoplay policy.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    fn volume(&self) -> f32;

    /// `0.0..=1.0`
    fn set_volume(&mut self, volume: f32);

    fn position(&self) -> f64;

    fn set_position(&mut self, seconds: f64);

    /// `None` until the media length is known.
    fn duration(&self) -> Option<f64>;

    /// Playback reached the end of the media.
    fn has_ended(&self) -> bool;
}

/// Element without audio output. Tracks position with a clock and logs what it
/// would play.
#[derive(Debug)]
pub struct HeadlessElement {
    source: Option<Url>,
    timer: Timer,
    volume: f32,
    duration: Option<f64>,
}

impl HeadlessElement {
    pub fn new() -> Self {
        Self {
            source: None,
            timer: Timer::default(),
            volume: 1.0,
            duration: None,
        }
    }

    pub fn set_duration(&mut self, duration: Option<f64>) {
        self.duration = duration;
    }
}

impl Default for HeadlessElement {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaElement for HeadlessElement {
    fn source(&self) -> Option<&Url> {
        self.source.as_ref()
    }

    fn set_source(&mut self, source: Url) {
        info!(%source, "loading");
        self.timer.reset();
        self.duration = None;
        self.source = Some(source);
    }

    fn play(&mut self) -> Result<()> {
        let Some(source) = &self.source else {
            return Err(Error::PlaybackRejected {
                message: "no source loaded".to_string(),
            });
        };

        if !self.timer.is_running() {
            info!(%source, "playing");
            self.timer.resume();
        }

        Ok(())
    }

    fn pause(&mut self) {
        if self.timer.is_running() {
            info!("paused");
            self.timer.halt();
        }
    }

    fn is_paused(&self) -> bool {
        !self.timer.is_running()
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        if volume != self.volume {
            info!(volume, "volume");
            self.volume = volume;
        }
    }

    fn position(&self) -> f64 {
        let position = self.timer.position().as_secs_f64();
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn set_position(&mut self, seconds: f64) {
        self.timer.seek(Duration::from_secs_f64(seconds.max(0.0)));
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn has_ended(&self) -> bool {
        self.source.is_some()
            && self
                .duration
                .is_some_and(|duration| self.timer.position().as_secs_f64() >= duration)
    }
}
