use musicbox_database::Database;
use musicbox_models::{Command, PlaybackState, SongId, Volume};
use rand::Rng;
use std::{sync::Arc, time::Duration};
use tokio::{
    select,
    sync::{mpsc, watch},
    time::MissedTickBehavior,
};
use tracing::{debug, error, instrument, warn};

use crate::{
    Result, StateReceiver,
    broadcast::Broadcast,
    catalog::Catalog,
    controls::{ControlCommand, Controls},
};

const SEEK_STEP_SECONDS: f64 = 10.0;
const CATALOG_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Owns the shared playback state. Every change goes through `player_loop`.
pub struct Player {
    state: PlaybackState,
    queue: Vec<SongId>,
    queue_index: Option<usize>,
    volume_before_mute: Volume,
    playing_before_mute: bool,
    catalog: Arc<Catalog>,
    database: Database,
    state_tx: watch::Sender<PlaybackState>,
    broadcast: Arc<Broadcast<PlaybackState>>,
    controls: Controls,
    controls_rx: mpsc::UnboundedReceiver<ControlCommand>,
}

impl Player {
    pub async fn new(database: Database, catalog: Arc<Catalog>) -> Result<Self> {
        let (tx, controls_rx) = mpsc::unbounded_channel();

        let songs = catalog.songs().await?;
        let mut state = PlaybackState::default();
        state.set_song(songs.first());

        let (state_tx, _) = watch::channel(state.clone());

        Ok(Self {
            volume_before_mute: state.volume,
            state,
            queue: Vec::new(),
            queue_index: None,
            playing_before_mute: false,
            catalog,
            database,
            state_tx,
            broadcast: Arc::new(Broadcast::new()),
            controls: Controls::new(tx),
            controls_rx,
        })
    }

    pub fn controls(&self) -> Controls {
        self.controls.clone()
    }

    /// Latest snapshot, for readers that only care about the current value.
    pub fn state(&self) -> StateReceiver {
        self.state_tx.subscribe()
    }

    /// Every published snapshot, in order.
    pub fn broadcast(&self) -> Arc<Broadcast<PlaybackState>> {
        self.broadcast.clone()
    }

    pub async fn player_loop(&mut self) {
        let mut interval = tokio::time::interval(CATALOG_REFRESH_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = interval.tick() => {
                    self.refresh_catalog().await;
                }

                message = self.controls_rx.recv() => match message {
                    Some(ControlCommand::Apply { command, user_id }) => {
                        self.apply(command, user_id).await;
                    }
                    Some(ControlCommand::SetQueue { song_ids, user_id }) => {
                        self.set_queue(song_ids, user_id).await;
                    }
                    Some(ControlCommand::Quit) | None => break,
                }
            }
        }

        debug!("player loop stopped");
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
        self.broadcast.send(self.state.clone());
    }

    #[instrument(skip(self))]
    async fn apply(&mut self, command: Command, user_id: Option<String>) {
        match command {
            Command::Play => self.state.is_playing = true,
            Command::Pause => self.state.is_playing = false,
            Command::PlayPause => self.state.is_playing = !self.state.is_playing,
            Command::Next => self.next().await,
            Command::Prev => self.previous().await,
            Command::Shuffle => self.state.shuffle = !self.state.shuffle,
            Command::Repeat => self.state.repeat = !self.state.repeat,
            Command::Mute => self.toggle_mute(),
            Command::SeekForward => self.state.position += SEEK_STEP_SECONDS,
            Command::Volume(volume) => self.set_volume(volume).await,
        }

        self.state.last_command = Some(command);

        if let Err(err) = self
            .database
            .log_command(command, self.state.current_song_id, user_id.as_deref())
            .await
        {
            error!(%err, "unable to log command");
        }

        self.publish();
    }

    #[instrument(skip(self))]
    async fn set_queue(&mut self, song_ids: Option<Vec<SongId>>, user_id: Option<String>) {
        let songs = match self.catalog.songs().await {
            Ok(songs) => songs,
            Err(err) => {
                error!(%err, "unable to load catalog");
                return;
            }
        };

        let queue: Vec<SongId> = song_ids
            .unwrap_or_default()
            .into_iter()
            .filter(|id| songs.iter().any(|song| song.id == *id))
            .collect();

        let first = queue
            .first()
            .and_then(|id| songs.iter().find(|song| song.id == *id));

        match first {
            Some(song) => {
                self.state.set_song(Some(song));
                self.state.is_playing = true;
                self.state.position = 0.0;
                self.state.last_command = Some(Command::Play);
                self.queue = queue;
                self.queue_index = Some(0);

                if let Err(err) = self
                    .database
                    .log_command(Command::Play, self.state.current_song_id, user_id.as_deref())
                    .await
                {
                    error!(%err, "unable to log command");
                }
            }
            None => {
                self.queue.clear();
                self.queue_index = None;
            }
        }

        self.publish();
    }

    /// Song ids to navigate, and where the current song sits among them.
    async fn playback_order(&self) -> Option<(Vec<SongId>, Option<usize>)> {
        if let Some(index) = self.queue_index
            && !self.queue.is_empty()
        {
            return Some((self.queue.clone(), Some(index)));
        }

        let songs = match self.catalog.songs().await {
            Ok(songs) => songs,
            Err(err) => {
                error!(%err, "unable to load catalog");
                return None;
            }
        };

        if songs.is_empty() {
            return None;
        }

        let current = self
            .state
            .current_song_id
            .and_then(|id| songs.iter().position(|song| song.id == id));

        Some((songs.into_iter().map(|song| song.id).collect(), current))
    }

    async fn next(&mut self) {
        self.state.position = 0.0;

        let Some((ids, current)) = self.playback_order().await else {
            return;
        };

        // A queue repeats its current entry, the catalog only while not shuffling.
        if self.state.repeat && (self.queue_index.is_some() || !self.state.shuffle) {
            return;
        }

        let index = if self.state.shuffle && ids.len() > 1 {
            random_other(ids.len(), current)
        } else {
            current.map_or(0, |current| (current + 1) % ids.len())
        };

        self.jump_to(&ids, index).await;
    }

    async fn previous(&mut self) {
        self.state.position = 0.0;

        let Some((ids, current)) = self.playback_order().await else {
            return;
        };

        let len = ids.len();
        let index = current.map_or(len - 1, |current| (current + len - 1) % len);

        self.jump_to(&ids, index).await;
    }

    async fn jump_to(&mut self, ids: &[SongId], index: usize) {
        let Some(&id) = ids.get(index) else {
            return;
        };

        if self.queue_index.is_some() {
            self.queue_index = Some(index);
        }

        match self.catalog.song(id).await {
            Ok(Some(song)) => self.state.set_song(Some(&song)),
            Ok(None) => warn!(song_id = id, "queued song is no longer in the catalog"),
            Err(err) => error!(%err, "unable to load catalog"),
        }
    }

    fn toggle_mute(&mut self) {
        if self.state.is_muted {
            self.state.volume = self.volume_before_mute;
            self.state.is_muted = false;
            self.state.is_playing = self.playing_before_mute;
        } else {
            self.volume_before_mute = self.state.volume;
            self.playing_before_mute = self.state.is_playing;
            self.state.volume = Volume::MUTED;
            self.state.is_muted = true;
            self.state.is_playing = false;
        }
    }

    async fn set_volume(&mut self, volume: Volume) {
        self.state.volume = volume;
        self.state.is_muted = volume.is_zero();

        if let Err(err) = self.database.log_volume(volume).await {
            error!(%err, "unable to log volume");
        }
    }

    /// Keeps the current song pointing at something that still exists.
    async fn refresh_catalog(&mut self) {
        let songs = match self.catalog.songs().await {
            Ok(songs) => songs,
            Err(err) => {
                warn!(%err, "unable to refresh catalog");
                return;
            }
        };

        let current = self
            .state
            .current_song_id
            .and_then(|id| songs.iter().find(|song| song.id == id))
            .or(songs.first());

        let mut state = self.state.clone();
        state.set_song(current);

        if state != self.state {
            debug!(song_id = ?state.current_song_id, "current song re-resolved");
            self.state = state;
            self.publish();
        }
    }
}

fn random_other(len: usize, current: Option<usize>) -> usize {
    let mut rng = rand::thread_rng();

    match current {
        Some(current) => {
            let pick = rng.gen_range(0..len - 1);
            if pick >= current { pick + 1 } else { pick }
        }
        None => rng.gen_range(0..len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use musicbox_database::RECENTLY_PLAYED_LIMIT;
    use musicbox_models::{NewSong, Song};

    async fn player_with(count: usize) -> (Player, Database, Vec<Song>) {
        let database = Database::in_memory().await.unwrap();
        let mut songs = vec![];
        for i in 1..=count {
            let song = database
                .add_song(&NewSong {
                    title: format!("Track {i}"),
                    artist: "Band".to_string(),
                    src_url: format!("/audio/{i}.mp3"),
                    cover_url: None,
                    category: None,
                })
                .await
                .unwrap();
            songs.push(song);
        }

        let catalog = Arc::new(Catalog::new(database.clone()));
        let player = Player::new(database.clone(), catalog).await.unwrap();

        (player, database, songs)
    }

    #[tokio::test]
    async fn starts_on_first_song() {
        let (player, _, songs) = player_with(3).await;

        assert_eq!(player.state.current_song_id, Some(songs[0].id));
        assert_eq!(player.state.title.as_deref(), Some("Track 1"));
        assert!(!player.state.is_playing);
        assert_eq!(player.state.volume, Volume::default());
        assert_eq!(player.state.last_command, None);
    }

    #[tokio::test]
    async fn next_and_previous_wrap() {
        let (mut player, _, songs) = player_with(3).await;

        player.apply(Command::SeekForward, None).await;
        assert_eq!(player.state.position, 10.0);

        player.apply(Command::Next, None).await;
        assert_eq!(player.state.current_song_id, Some(songs[1].id));
        assert_eq!(player.state.position, 0.0);

        player.apply(Command::Next, None).await;
        player.apply(Command::Next, None).await;
        assert_eq!(player.state.current_song_id, Some(songs[0].id));

        player.apply(Command::Prev, None).await;
        assert_eq!(player.state.current_song_id, Some(songs[2].id));
        assert_eq!(player.state.last_command, Some(Command::Prev));
    }

    #[tokio::test]
    async fn repeat_pins_the_current_song() {
        let (mut player, _, songs) = player_with(3).await;

        player.apply(Command::Repeat, None).await;
        player.apply(Command::SeekForward, None).await;
        player.apply(Command::Next, None).await;

        assert!(player.state.repeat);
        assert_eq!(player.state.current_song_id, Some(songs[0].id));
        assert_eq!(player.state.position, 0.0);
    }

    #[tokio::test]
    async fn shuffle_overrides_repeat_in_catalog_mode() {
        let (mut player, _, songs) = player_with(3).await;

        player.apply(Command::Shuffle, None).await;
        player.apply(Command::Repeat, None).await;
        player.apply(Command::Next, None).await;

        assert!(player.state.repeat);
        assert_ne!(player.state.current_song_id, Some(songs[0].id));
    }

    #[tokio::test]
    async fn shuffle_never_picks_the_current_song() {
        let (mut player, _, _) = player_with(4).await;

        player.apply(Command::Shuffle, None).await;

        for _ in 0..30 {
            let before = player.state.current_song_id;
            player.apply(Command::Next, None).await;
            assert_ne!(player.state.current_song_id, before);
        }
    }

    #[tokio::test]
    async fn shuffle_with_one_song_stays_put() {
        let (mut player, _, songs) = player_with(1).await;

        player.apply(Command::Shuffle, None).await;
        player.apply(Command::Next, None).await;

        assert_eq!(player.state.current_song_id, Some(songs[0].id));
    }

    #[tokio::test]
    async fn mute_remembers_volume_and_playing() {
        let (mut player, _, _) = player_with(2).await;

        player.apply(Command::Volume(Volume::new(70)), None).await;
        player.apply(Command::Play, None).await;

        player.apply(Command::Mute, None).await;
        assert!(player.state.is_muted);
        assert!(!player.state.is_playing);
        assert_eq!(player.state.volume, Volume::MUTED);

        player.apply(Command::Mute, None).await;
        assert!(!player.state.is_muted);
        assert!(player.state.is_playing);
        assert_eq!(player.state.volume.get(), 70);
    }

    #[tokio::test]
    async fn volume_zero_counts_as_muted() {
        let (mut player, _, _) = player_with(1).await;

        let command: Command = "VOLUME:250".parse().unwrap();
        player.apply(command, None).await;
        assert_eq!(player.state.volume, Volume::MAX);
        assert!(!player.state.is_muted);

        player.apply(Command::Volume(Volume::new(0)), None).await;
        assert!(player.state.is_muted);
        assert_eq!(player.state.last_command, Some(Command::Volume(Volume::MUTED)));
    }

    #[tokio::test]
    async fn play_pause_toggles() {
        let (mut player, _, _) = player_with(1).await;

        player.apply(Command::PlayPause, None).await;
        assert!(player.state.is_playing);
        player.apply(Command::PlayPause, None).await;
        assert!(!player.state.is_playing);
        player.apply(Command::Play, None).await;
        player.apply(Command::Play, None).await;
        assert!(player.state.is_playing);
        player.apply(Command::Pause, None).await;
        assert!(!player.state.is_playing);
    }

    #[tokio::test]
    async fn commands_are_logged_with_the_song_after_applying() {
        let (mut player, database, songs) = player_with(3).await;

        player.apply(Command::Play, Some("ana".to_string())).await;
        player.apply(Command::Next, Some("ana".to_string())).await;
        player.apply(Command::Next, None).await;

        let recent = database
            .recently_played("ana", RECENTLY_PLAYED_LIMIT)
            .await
            .unwrap();
        let ids: Vec<_> = recent.iter().map(|song| song.id).collect();
        assert_eq!(ids, vec![songs[1].id, songs[0].id]);
    }

    #[tokio::test]
    async fn queue_replaces_catalog_navigation() {
        let (mut player, database, songs) = player_with(4).await;

        player
            .set_queue(
                Some(vec![songs[3].id, 999, songs[1].id]),
                Some("ana".to_string()),
            )
            .await;
        assert_eq!(player.state.current_song_id, Some(songs[3].id));
        assert!(player.state.is_playing);
        assert_eq!(player.state.last_command, Some(Command::Play));
        assert_eq!(player.queue, vec![songs[3].id, songs[1].id]);

        player.apply(Command::Next, None).await;
        assert_eq!(player.state.current_song_id, Some(songs[1].id));
        player.apply(Command::Next, None).await;
        assert_eq!(player.state.current_song_id, Some(songs[3].id));
        player.apply(Command::Prev, None).await;
        assert_eq!(player.state.current_song_id, Some(songs[1].id));

        let recent = database
            .recently_played("ana", RECENTLY_PLAYED_LIMIT)
            .await
            .unwrap();
        assert_eq!(recent[0].id, songs[3].id);

        player.set_queue(None, None).await;
        assert_eq!(player.queue_index, None);
        player.apply(Command::Next, None).await;
        assert_eq!(player.state.current_song_id, Some(songs[2].id));
    }

    #[tokio::test]
    async fn repeat_pins_queue_entry_even_when_shuffling() {
        let (mut player, _, songs) = player_with(3).await;

        player
            .set_queue(Some(vec![songs[2].id, songs[0].id]), None)
            .await;
        player.apply(Command::Shuffle, None).await;
        player.apply(Command::Repeat, None).await;
        player.apply(Command::Next, None).await;

        assert_eq!(player.state.current_song_id, Some(songs[2].id));
        assert_eq!(player.queue_index, Some(0));
    }

    #[tokio::test]
    async fn queue_of_unknown_songs_clears() {
        let (mut player, _, songs) = player_with(2).await;

        player.set_queue(Some(vec![songs[1].id]), None).await;
        player.set_queue(Some(vec![404, 405]), None).await;

        assert!(player.queue.is_empty());
        assert_eq!(player.queue_index, None);
        assert_eq!(player.state.current_song_id, Some(songs[1].id));
    }

    #[tokio::test]
    async fn refresh_resolves_song_once_catalog_fills() {
        let (mut player, database, _) = player_with(0).await;
        assert_eq!(player.state.current_song_id, None);

        let mut state = player.state();
        let song = database
            .add_song(&NewSong {
                title: "Late Arrival".to_string(),
                artist: "Band".to_string(),
                src_url: "/audio/late.mp3".to_string(),
                cover_url: None,
                category: None,
            })
            .await
            .unwrap();

        player.catalog.invalidate().await;
        player.refresh_catalog().await;

        assert!(state.has_changed().unwrap());
        assert_eq!(state.borrow_and_update().current_song_id, Some(song.id));
    }

    #[tokio::test]
    async fn loop_broadcasts_every_applied_command() {
        let (mut player, _, songs) = player_with(2).await;

        let controls = player.controls();
        let mut receiver = player.broadcast().subscribe();
        let state = player.state();

        let handle = tokio::spawn(async move { player.player_loop().await });

        controls.send(Command::PlayPause, None).unwrap();
        controls.send(Command::Next, None).unwrap();

        let first = receiver.recv().await.unwrap();
        assert!(first.is_playing);
        assert_eq!(first.last_command, Some(Command::PlayPause));

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.current_song_id, Some(songs[1].id));
        assert_eq!(*state.borrow(), second);

        controls.quit().unwrap();
        handle.await.unwrap();
        assert!(controls.send(Command::Play, None).is_err());
    }
}
