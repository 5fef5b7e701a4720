use snafu::prelude::*;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Invalid server url: {source}"))]
    Url { source: url::ParseError },
    #[snafu(display("Request failed: {source}"))]
    Request { source: reqwest::Error },
    #[snafu(display("Bad credentials"))]
    Unauthorized,
    #[snafu(display("{status}: {message}"))]
    Api { status: u16, message: String },
    #[snafu(display("Unable to deserialize json: {message}"))]
    DeserializeJSON { message: String },
    #[snafu(display("Playback was rejected: {message}"))]
    PlaybackRejected { message: String },
}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        Error::Request { source }
    }
}

impl From<url::ParseError> for Error {
    fn from(source: url::ParseError) -> Self {
        Error::Url { source }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::DeserializeJSON {
            message: error.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
