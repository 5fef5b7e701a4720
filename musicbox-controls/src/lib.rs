use musicbox_models::PlaybackState;

pub mod broadcast;
pub mod catalog;
pub mod controls;
pub mod error;
pub mod player;
mod simple_cache;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type StateReceiver = tokio::sync::watch::Receiver<PlaybackState>;
