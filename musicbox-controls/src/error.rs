use snafu::prelude::*;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Database error: {source}"))]
    Database { source: musicbox_database::Error },
    #[snafu(display("Player loop is not running"))]
    PlayerStopped,
}

impl From<musicbox_database::Error> for Error {
    fn from(source: musicbox_database::Error) -> Self {
        Self::Database { source }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::PlayerStopped
    }
}
