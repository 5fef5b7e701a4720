use musicbox_controls::controls::Controls;
use musicbox_models::{Command, ParseCommandError, Volume};
use snafu::prelude::*;
use std::path::Path;
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
};
use tracing::{debug, error, info, warn};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Malformed remote message: {source}"))]
    Json { source: serde_json::Error },
    #[snafu(display("Unsupported remote command: {source}"))]
    Command { source: ParseCommandError },
}

#[derive(serde::Deserialize)]
struct RemoteMessage {
    command: Option<String>,
    value: Option<i64>,
}

/// Reads commands from the remote control's serial device until it closes.
///
/// An unavailable device is logged and ignored so the server keeps running without it.
pub async fn init(device: &Path, controls: Controls) {
    let file = match File::open(device).await {
        Ok(file) => file,
        Err(err) => {
            warn!(%err, "Could not open remote device {}", device.display());
            return;
        }
    };

    info!("Listening for remote control on {}", device.display());

    listen(BufReader::new(file), controls).await;
}

pub async fn listen<R>(mut reader: R, controls: Controls)
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer = Vec::new();

    loop {
        buffer.clear();

        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => {
                info!("Remote device closed");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);

                match parse_line(&line) {
                    Ok(Some(command)) => {
                        info!(%command, "Remote command");
                        if controls.send(command, None).is_err() {
                            break;
                        }
                    }
                    Ok(None) => debug!(line = %line.trim(), "Ignored remote line"),
                    Err(err) => warn!(%err, line = %line.trim(), "Skipped malformed line"),
                }
            }
            Err(err) => {
                error!(%err, "Error while reading remote device");
                break;
            }
        }
    }
}

/// `Ok(None)` for noise that is not meant as a command.
pub fn parse_line(line: &str) -> Result<Option<Command>, Error> {
    let line = line.trim();

    if !line.starts_with('{') || !line.ends_with('}') {
        return Ok(None);
    }

    let message: RemoteMessage = serde_json::from_str(line).context(JsonSnafu)?;

    let Some(command) = message.command else {
        return Ok(None);
    };

    if command.eq_ignore_ascii_case("VOLUME") {
        return Ok(message
            .value
            .filter(|value| *value >= 0)
            .map(|value| Command::Volume(Volume::new(value))));
    }

    command.parse().map(Some).context(CommandSnafu)
}
