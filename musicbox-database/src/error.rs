use snafu::prelude::*;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Unable to find database location"))]
    DatabaseLocation,
    #[snafu(display("Database error: {source}"))]
    Database { source: sqlx::Error },
    #[snafu(display("Unable to migrate database to latest version: {source}"))]
    Migration { source: sqlx::migrate::MigrateError },
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Self::Database { source }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(source: sqlx::migrate::MigrateError) -> Self {
        Self::Migration { source }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
