use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand};
use dialoguer::{Input, Password};
use musicbox_client::{
    Client,
    element::HeadlessElement,
    favorites::FavoritesStore,
    playlists::PlaylistStore,
    sync::{self, Intent, PlayerSync},
};
use musicbox_controls::{catalog::Catalog, player::Player};
use musicbox_database::{Database, hash_secret};
use musicbox_models::{Command, NewSong, PlaylistId, SongId, Volume};
use musicbox_web::AppState;
use snafu::prelude::*;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long)]
    /// Log level. Falls back to RUST_LOG, then info.
    verbosity: Option<tracing::Level>,

    #[clap(long, env = "DATABASE_URL")]
    /// Path of the sqlite database.
    database_url: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the player server.
    Serve {
        #[clap(long, default_value = "0.0.0.0:9888")]
        /// Interface and port for the web server to listen on.
        interface: String,

        #[clap(long)]
        /// Secret used for api auth. (overrides any database value)
        web_secret: Option<String>,

        #[clap(long)]
        /// Serial device of the remote control. (overrides any database value)
        remote_device: Option<PathBuf>,

        #[clap(long, default_value_t = false)]
        /// Disable the remote control listener.
        disable_remote: bool,
    },
    /// Follow a server's playback without audio output. Reads controls from stdin.
    Follow {
        #[clap(flatten)]
        server: ServerArgs,
    },
    /// Send one command, e.g. NEXT or VOLUME:40.
    Send {
        command: Command,

        #[clap(flatten)]
        server: ServerArgs,
    },
    /// Manage the song catalog.
    Songs {
        #[clap(subcommand)]
        command: SongCommands,
    },
    /// Manage your playlists on a server.
    Playlists {
        #[clap(subcommand)]
        command: PlaylistCommands,

        #[clap(flatten)]
        server: ServerArgs,
    },
    /// Add or remove a song from your favorites.
    Favorite {
        song_id: SongId,

        #[clap(flatten)]
        server: ServerArgs,
    },
    /// Set configuration options
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum SongCommands {
    /// Add a song to the catalog.
    Add {
        #[clap(long)]
        title: String,
        #[clap(long)]
        artist: String,
        #[clap(long)]
        /// Media locator, absolute or relative to the server.
        src: String,
        #[clap(long)]
        cover: Option<String>,
        #[clap(long)]
        category: Option<String>,
    },
    /// List the catalog.
    List,
}

#[derive(Subcommand)]
pub enum PlaylistCommands {
    List,
    Create { name: String },
    Delete { id: PlaylistId },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set the api secret.
    #[clap(value_parser)]
    WebSecret {},
    /// Set the serial device of the remote control.
    #[clap(value_parser)]
    RemoteDevice { device: Option<String> },
}

#[derive(Args)]
struct ServerArgs {
    #[clap(long, env = "MUSICBOX_SERVER", default_value = "http://127.0.0.1:9888")]
    /// Base url of the server.
    server: String,

    #[clap(long, env = "MUSICBOX_USER")]
    /// User id sent to the server.
    user: Option<String>,

    #[clap(long, env = "MUSICBOX_SECRET")]
    /// Api secret, if the server requires one.
    secret: Option<String>,
}

impl ServerArgs {
    fn client(self) -> Result<Client, Error> {
        let mut client = Client::new(&self.server)?;

        if let Some(user) = self.user {
            client = client.with_user(user);
        }
        if let Some(secret) = self.secret {
            client = client.with_secret(secret);
        }

        Ok(client)
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{error}"))]
    DatabaseError { error: String },
    #[snafu(display("{error}"))]
    PlayerError { error: String },
    #[snafu(display("{error}"))]
    WebError { error: String },
    #[snafu(display("{error}"))]
    ClientError { error: String },
    #[snafu(display("Song {id} not found"))]
    SongNotFound { id: SongId },
}

impl From<musicbox_database::Error> for Error {
    fn from(error: musicbox_database::Error) -> Self {
        Error::DatabaseError {
            error: error.to_string(),
        }
    }
}

impl From<musicbox_controls::Error> for Error {
    fn from(error: musicbox_controls::Error) -> Self {
        Error::PlayerError {
            error: error.to_string(),
        }
    }
}

impl From<musicbox_web::Error> for Error {
    fn from(error: musicbox_web::Error) -> Self {
        Error::WebError {
            error: error.to_string(),
        }
    }
}

impl From<musicbox_client::Error> for Error {
    fn from(error: musicbox_client::Error) -> Self {
        Error::ClientError {
            error: error.to_string(),
        }
    }
}

pub async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    let filter = match cli.verbosity {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Commands::Serve {
            interface,
            web_secret,
            remote_device,
            disable_remote,
        } => {
            let database = Database::new(cli.database_url).await?;
            let configuration = database.get_configuration().await?;

            let web_secret = web_secret
                .map(|secret| hash_secret(&secret))
                .or(configuration.web_secret);
            let remote_device = remote_device.or(configuration.remote_device.map(PathBuf::from));

            let catalog = Arc::new(Catalog::new(database.clone()));
            let mut player = Player::new(database.clone(), catalog.clone()).await?;

            let state = Arc::new(AppState::new(
                player.controls(),
                player.state(),
                player.broadcast(),
                catalog,
                database,
                web_secret,
            ));

            if !disable_remote {
                match remote_device {
                    Some(device) => {
                        let controls = player.controls();
                        tokio::spawn(async move {
                            musicbox_remote::init(&device, controls).await;
                        });
                    }
                    None => info!("No remote device configured"),
                }
            }

            tokio::select! {
                result = musicbox_web::init(state, &interface) => result?,
                _ = player.player_loop() => {},
                _ = tokio::signal::ctrl_c() => info!("Shutting down"),
            }

            Ok(())
        }
        Commands::Follow { server } => {
            let client = server.client()?;

            let (commands, commands_rx) = sync::command_channel();
            tokio::spawn(sync::dispatch_commands(client.clone(), commands_rx));

            let (intents_tx, intents) = mpsc::unbounded_channel();
            tokio::spawn(read_intents(intents_tx));

            let mut follower =
                PlayerSync::new(HeadlessElement::new(), client.base_url().clone(), commands);

            let mut connection = follower.connection();
            tokio::spawn(async move {
                while connection.changed().await.is_ok() {
                    let state = *connection.borrow_and_update();
                    info!(?state, "connection");
                }
            });

            follower.run(&client, intents).await;
            Ok(())
        }
        Commands::Send { command, server } => {
            let ack = server.client()?.send_command(command).await?;
            match ack.message {
                Some(message) => println!("{command}: {message}"),
                None => println!("{command}: accepted"),
            }
            Ok(())
        }
        Commands::Songs { command } => {
            let database = Database::new(cli.database_url).await?;

            match command {
                SongCommands::Add {
                    title,
                    artist,
                    src,
                    cover,
                    category,
                } => {
                    let song = database
                        .add_song(&NewSong {
                            title,
                            artist,
                            src_url: src,
                            cover_url: cover,
                            category,
                        })
                        .await?;
                    println!("Added song {}.", song.id);
                }
                SongCommands::List => {
                    for song in database.songs().await? {
                        println!(
                            "{}\t{} - {}\t{}",
                            song.id, song.artist, song.title, song.src_url
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Playlists { command, server } => {
            let mut store = PlaylistStore::new(server.client()?);

            match command {
                PlaylistCommands::List => store.refresh().await?,
                PlaylistCommands::Create { name } => {
                    store.create(&name).await?;
                }
                PlaylistCommands::Delete { id } => store.delete(id).await?,
            }

            for playlist in store.playlists() {
                println!(
                    "{}\t{}\t{} songs",
                    playlist.id, playlist.name, playlist.song_count
                );
            }
            Ok(())
        }
        Commands::Favorite { song_id, server } => {
            let client = server.client()?;
            let song = client
                .songs()
                .await?
                .into_iter()
                .find(|song| song.id == song_id)
                .context(SongNotFoundSnafu { id: song_id })?;

            let mut store = FavoritesStore::new(client);
            store.refresh().await?;

            if store.toggle(&song).await? {
                println!("Added {} to favorites.", song.title);
            } else {
                println!("Removed {} from favorites.", song.title);
            }
            Ok(())
        }
        Commands::Config { command } => {
            let database = Database::new(cli.database_url).await?;

            match command {
                ConfigCommands::WebSecret {} => {
                    if let Ok(secret) = Password::new()
                        .with_prompt("Enter the api secret (hidden)")
                        .interact()
                    {
                        database.set_web_secret(secret).await?;

                        println!("Secret saved.");
                    }
                }
                ConfigCommands::RemoteDevice { device } => {
                    let device = match device {
                        Some(device) => Some(device),
                        None => Input::new()
                            .with_prompt("Enter the remote device path")
                            .interact_text()
                            .ok(),
                    };

                    if let Some(device) = device {
                        database.set_remote_device(device).await?;

                        println!("Remote device saved.");
                    }
                }
            }
            Ok(())
        }
    }
}

async fn read_intents(intents: mpsc::UnboundedSender<Intent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        match parse_intent(&line) {
            Some(intent) => {
                if intents.send(intent).is_err() {
                    break;
                }
            }
            None => warn!(%line, "unknown control, try p n b s r m f or v <0-100>"),
        }
    }
}

fn parse_intent(line: &str) -> Option<Intent> {
    let mut parts = line.split_whitespace();

    let intent = match parts.next()? {
        "p" | "play" => Intent::TogglePlay,
        "n" | "next" => Intent::Next,
        "b" | "prev" => Intent::Previous,
        "s" | "shuffle" => Intent::Shuffle,
        "r" | "repeat" => Intent::Repeat,
        "m" | "mute" => Intent::Mute,
        "f" | "forward" => Intent::SeekForward,
        "v" | "volume" => Intent::ReleaseVolume(Volume::new(parts.next()?.parse().ok()?)),
        _ => return None,
    };

    Some(intent)
}
