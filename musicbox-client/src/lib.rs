pub mod client;
pub mod element;
pub mod favorites;
pub mod playlists;
pub mod sse;
pub mod sync;

mod error;
mod timer;

pub use client::Client;
pub use error::{Error, Result};
