//! Keeps a local [`MediaElement`] aligned with the server's playback state.
//!
//! The server is the authority: every snapshot received on the state stream is
//! reconciled onto the element, and local controls only send commands. The one
//! exception is volume, which follows the user's hand while a slider is being
//! dragged and for a short grace period after release.

use crate::{Client, Error, Result, client::resolve_locator, element::MediaElement};
use futures::{StreamExt, stream::BoxStream};
use musicbox_models::{Command, PlaybackState, Song, SongId, Volume};
use std::{collections::HashMap, future::Future, time::Duration};
use tokio::{
    select,
    sync::{mpsc, watch},
    time::{Instant, Interval, MissedTickBehavior, interval, sleep},
};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// How long incoming volume updates stay suppressed after a slider release.
pub const ADJUSTMENT_GRACE: Duration = Duration::from_millis(300);
const SEEK_STEP: f64 = 10.0;
/// How often the element is checked for the end of its media.
pub const END_CHECK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
}

/// Something the local user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    TogglePlay,
    Next,
    Previous,
    Shuffle,
    Repeat,
    Mute,
    SeekForward,
    DragVolume(Volume),
    ReleaseVolume(Volume),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjustment {
    Idle,
    Dragging,
    Settling { until: Instant },
}

/// Source of the song catalog and of playback snapshots.
pub trait StateSource {
    fn songs(&self) -> impl Future<Output = Result<Vec<Song>>> + Send;

    fn open(
        &self,
    ) -> impl Future<Output = Result<BoxStream<'static, Result<PlaybackState>>>> + Send;
}

impl StateSource for Client {
    async fn songs(&self) -> Result<Vec<Song>> {
        Client::songs(self).await
    }

    async fn open(&self) -> Result<BoxStream<'static, Result<PlaybackState>>> {
        self.state_stream().await
    }
}

/// Queue of commands waiting to be posted. Sending never blocks.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    pub fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!(%command, "command dispatcher is gone, dropping command");
        }
    }
}

pub fn command_channel() -> (CommandSender, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, rx)
}

/// Posts queued commands in order. Failures are logged and not retried.
pub async fn dispatch_commands(client: Client, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        match client.send_command(command).await {
            Ok(_) => debug!(%command, "command sent"),
            Err(err) => warn!(%command, error = %err, "failed to send command"),
        }
    }
}

pub struct PlayerSync<E> {
    element: E,
    catalog: HashMap<SongId, Song>,
    base_url: Url,
    last_applied: Option<PlaybackState>,
    displayed_volume: Volume,
    adjustment: Adjustment,
    end_reported: bool,
    commands: CommandSender,
    connection: watch::Sender<ConnectionState>,
}

impl<E: MediaElement> PlayerSync<E> {
    pub fn new(element: E, base_url: Url, commands: CommandSender) -> Self {
        Self {
            element,
            catalog: HashMap::new(),
            base_url,
            last_applied: None,
            displayed_volume: Volume::default(),
            adjustment: Adjustment::Idle,
            end_reported: false,
            commands,
            connection: watch::Sender::new(ConnectionState::Disconnected),
        }
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut E {
        &mut self.element
    }

    pub fn displayed_volume(&self) -> Volume {
        self.displayed_volume
    }

    /// The last snapshot received from the server.
    pub fn state(&self) -> Option<&PlaybackState> {
        self.last_applied.as_ref()
    }

    pub fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn set_catalog(&mut self, songs: Vec<Song>) {
        self.catalog = songs.into_iter().map(|song| (song.id, song)).collect();
    }

    /// Failure leaves the lookup as it was; songs missing from it are not loaded.
    pub async fn load_catalog<S: StateSource>(&mut self, source: &S) {
        match source.songs().await {
            Ok(songs) => {
                info!(count = songs.len(), "catalog loaded");
                self.set_catalog(songs);
            }
            Err(err) => warn!(error = %err, "unable to load catalog"),
        }
    }

    /// Follows the state stream forever, reconnecting after a fixed delay
    /// whenever it cannot be opened, fails or ends.
    pub async fn run<S: StateSource>(
        &mut self,
        source: &S,
        mut intents: mpsc::UnboundedReceiver<Intent>,
    ) {
        let mut end_check = interval(END_CHECK_INTERVAL);
        end_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.catalog.is_empty() {
                self.load_catalog(source).await;
            }

            self.connection.send_replace(ConnectionState::Connecting);
            match source.open().await {
                Ok(stream) => {
                    self.connection.send_replace(ConnectionState::Streaming);
                    info!("following playback state");
                    self.follow(stream, &mut intents, &mut end_check).await;
                }
                Err(err) => warn!(error = %err, "unable to open state stream"),
            }
            self.connection.send_replace(ConnectionState::Disconnected);

            info!("reconnecting in {}s", RECONNECT_DELAY.as_secs());
            let reconnect = sleep(RECONNECT_DELAY);
            tokio::pin!(reconnect);

            loop {
                select! {
                    _ = &mut reconnect => break,
                    Some(intent) = intents.recv() => self.handle_intent(intent, Instant::now()),
                    _ = end_check.tick() => self.check_ended(),
                }
            }
        }
    }

    async fn follow(
        &mut self,
        mut stream: BoxStream<'static, Result<PlaybackState>>,
        intents: &mut mpsc::UnboundedReceiver<Intent>,
        end_check: &mut Interval,
    ) {
        loop {
            select! {
                item = stream.next() => match item {
                    Some(Ok(snapshot)) => self.reconcile(snapshot, Instant::now()),
                    Some(Err(Error::DeserializeJSON { message })) => {
                        warn!(%message, "skipping malformed snapshot");
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "state stream failed");
                        return;
                    }
                    None => {
                        info!("state stream closed");
                        return;
                    }
                },
                Some(intent) = intents.recv() => self.handle_intent(intent, Instant::now()),
                _ = end_check.tick() => self.check_ended(),
            }
        }
    }

    /// Applies a server snapshot to the element.
    ///
    /// A snapshot equal to the previous one only re-applies volume, so a
    /// re-delivered `SEEK_FORWARD` does not seek twice.
    #[instrument(skip_all, fields(song = ?snapshot.current_song_id, playing = snapshot.is_playing))]
    pub fn reconcile(&mut self, snapshot: PlaybackState, now: Instant) {
        let repeated = self.last_applied.as_ref() == Some(&snapshot);

        if !repeated {
            self.apply_source(&snapshot);
            self.apply_playing(snapshot.is_playing);
        }

        if self.is_adjusting(now) {
            debug!(volume = %snapshot.volume, "volume update suppressed while adjusting");
        } else {
            self.apply_volume(snapshot.volume, snapshot.is_muted);
        }

        if !repeated && snapshot.last_command == Some(Command::SeekForward) {
            self.seek_forward();
        }

        self.last_applied = Some(snapshot);
    }

    pub fn handle_intent(&mut self, intent: Intent, now: Instant) {
        match intent {
            Intent::TogglePlay if self.element.is_paused() => {
                if self.last_applied.as_ref().is_some_and(|state| state.is_muted) {
                    self.commands.send(Command::Mute);
                }
                self.commands.send(Command::Play);
            }
            Intent::TogglePlay => self.commands.send(Command::Pause),
            Intent::Next => self.commands.send(Command::Next),
            Intent::Previous => self.commands.send(Command::Prev),
            Intent::Shuffle => self.commands.send(Command::Shuffle),
            Intent::Repeat => self.commands.send(Command::Repeat),
            Intent::Mute => self.commands.send(Command::Mute),
            Intent::SeekForward => self.commands.send(Command::SeekForward),
            Intent::DragVolume(volume) => {
                self.adjustment = Adjustment::Dragging;
                self.set_local_volume(volume);
                self.commands.send(Command::Volume(volume));
            }
            Intent::ReleaseVolume(volume) => {
                self.set_local_volume(volume);
                self.commands.send(Command::Volume(volume));
                self.adjustment = Adjustment::Settling {
                    until: now + ADJUSTMENT_GRACE,
                };
            }
        }
    }

    /// Asks the server for the next song once per source that plays to its end.
    fn check_ended(&mut self) {
        if !self.element.has_ended() {
            self.end_reported = false;
            return;
        }
        if self.end_reported {
            return;
        }

        info!("song ended, advancing");
        self.end_reported = true;
        self.commands.send(Command::Next);
    }

    fn apply_source(&mut self, snapshot: &PlaybackState) {
        let Some(id) = snapshot.current_song_id else {
            return;
        };
        let Some(song) = self.catalog.get(&id) else {
            debug!(id, "song is not in the local catalog");
            return;
        };

        let source = match resolve_locator(&self.base_url, &song.src_url) {
            Ok(source) => source,
            Err(err) => {
                warn!(id, locator = %song.src_url, error = %err, "unusable media locator");
                return;
            }
        };

        if self.element.source() == Some(&source) {
            return;
        }

        info!(title = %song.title, artist = %song.artist, "switching song");
        let was_playing = !self.element.is_paused();
        self.element.set_source(source);
        self.end_reported = false;

        if snapshot.is_playing || was_playing {
            self.request_play();
        }
    }

    fn apply_playing(&mut self, playing: bool) {
        if playing && self.element.is_paused() {
            self.request_play();
        } else if !playing && !self.element.is_paused() {
            self.element.pause();
        }
    }

    fn apply_volume(&mut self, volume: Volume, muted: bool) {
        self.displayed_volume = volume;
        self.element
            .set_volume(if muted { 0.0 } else { volume.gain() });
    }

    fn seek_forward(&mut self) {
        let mut target = self.element.position() + SEEK_STEP;
        if let Some(duration) = self.element.duration() {
            target = target.min(duration);
        }
        self.element.set_position(target);
    }

    fn request_play(&mut self) {
        if let Err(err) = self.element.play() {
            warn!(error = %err, "play request rejected, waiting for user interaction");
        }
    }

    fn set_local_volume(&mut self, volume: Volume) {
        self.displayed_volume = volume;
        self.element.set_volume(volume.gain());
    }

    fn is_adjusting(&mut self, now: Instant) -> bool {
        match self.adjustment {
            Adjustment::Idle => false,
            Adjustment::Dragging => true,
            Adjustment::Settling { until } if now < until => true,
            Adjustment::Settling { .. } => {
                self.adjustment = Adjustment::Idle;
                false
            }
        }
    }
}
