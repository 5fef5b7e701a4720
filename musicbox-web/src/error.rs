use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use musicbox_models::{Ack, ParseCommandError};
use snafu::prelude::*;
use tracing::error;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Missing user identity"))]
    Unauthenticated,
    #[snafu(display("Bad credentials"))]
    BadCredentials,
    #[snafu(display("{what} not found"))]
    NotFound { what: String },
    #[snafu(display("{what} belongs to another user"))]
    Forbidden { what: String },
    #[snafu(display("{message}"))]
    BadRequest { message: String },
    #[snafu(display("{source}"))]
    InvalidCommand { source: ParseCommandError },
    #[snafu(display("Database error: {source}"))]
    Database { source: musicbox_database::Error },
    #[snafu(display("Player error: {source}"))]
    Player { source: musicbox_controls::Error },
    #[snafu(display("Unable to listen on {interface}: {source}"))]
    Bind {
        interface: String,
        source: std::io::Error,
    },
    #[snafu(display("Server stopped: {source}"))]
    Serve { source: std::io::Error },
}

impl From<musicbox_database::Error> for Error {
    fn from(source: musicbox_database::Error) -> Self {
        Self::Database { source }
    }
}

impl From<musicbox_controls::Error> for Error {
    fn from(source: musicbox_controls::Error) -> Self {
        Self::Player { source }
    }
}

impl From<ParseCommandError> for Error {
    fn from(source: ParseCommandError) -> Self {
        Self::InvalidCommand { source }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Unauthenticated | Error::BadCredentials => StatusCode::UNAUTHORIZED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } | Error::InvalidCommand { .. } => StatusCode::BAD_REQUEST,
            Error::Player { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database { .. } | Error::Bind { .. } | Error::Serve { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        (status, Json(Ack::failed(self.to_string()))).into_response()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
