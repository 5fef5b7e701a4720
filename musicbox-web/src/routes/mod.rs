pub(crate) mod auth;
pub(crate) mod favorites;
pub(crate) mod player;
pub(crate) mod playlists;
