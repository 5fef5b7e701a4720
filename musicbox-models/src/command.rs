use serde::Deserialize;
use snafu::prelude::*;
use std::{fmt::Display, str::FromStr};

use crate::Volume;

/// Playback command tokens accepted by the gateway, e.g. `NEXT` or `VOLUME:40`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum Command {
    Play,
    Pause,
    PlayPause,
    Next,
    Prev,
    Shuffle,
    Repeat,
    Mute,
    SeekForward,
    Volume(Volume),
}

#[derive(Snafu, Debug, Clone, PartialEq, Eq)]
pub enum ParseCommandError {
    #[snafu(display("unknown command: {token}"))]
    Unknown { token: String },
    #[snafu(display("invalid volume in command: {token}"))]
    InvalidVolume { token: String },
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();

        if let Some(value) = token.strip_prefix("VOLUME:") {
            let Ok(value) = value.trim().parse::<i64>() else {
                return InvalidVolumeSnafu { token }.fail();
            };
            return Ok(Command::Volume(Volume::new(value)));
        }

        let command = match token {
            "PLAY" => Command::Play,
            "PAUSE" => Command::Pause,
            "PLAY_PAUSE" => Command::PlayPause,
            "NEXT" => Command::Next,
            "PREV" => Command::Prev,
            "SHUFFLE" => Command::Shuffle,
            "REPEAT" => Command::Repeat,
            "MUTE" => Command::Mute,
            "SEEK_FORWARD" => Command::SeekForward,
            _ => return UnknownSnafu { token }.fail(),
        };

        Ok(command)
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Command::Play => "PLAY",
            Command::Pause => "PAUSE",
            Command::PlayPause => "PLAY_PAUSE",
            Command::Next => "NEXT",
            Command::Prev => "PREV",
            Command::Shuffle => "SHUFFLE",
            Command::Repeat => "REPEAT",
            Command::Mute => "MUTE",
            Command::SeekForward => "SEEK_FORWARD",
            Command::Volume(volume) => return write!(f, "VOLUME:{volume}"),
        };

        f.write_str(token)
    }
}

impl TryFrom<String> for Command {
    type Error = ParseCommandError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Command> for String {
    fn from(value: Command) -> Self {
        value.to_string()
    }
}

/// Tokens this side does not know (such as `NONE`) read as no command.
pub(crate) fn lenient<'de, D>(deserializer: D) -> Result<Option<Command>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let token = Option::<String>::deserialize(deserializer)?;
    Ok(token.and_then(|token| token.parse().ok()))
}
