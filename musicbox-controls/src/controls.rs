use musicbox_models::{Command, SongId};

use crate::Result;

#[derive(Debug)]
pub enum ControlCommand {
    Apply {
        command: Command,
        user_id: Option<String>,
    },
    SetQueue {
        song_ids: Option<Vec<SongId>>,
        user_id: Option<String>,
    },
    Quit,
}

/// Cloneable handle feeding the player loop.
#[derive(Debug, Clone)]
pub struct Controls {
    tx: tokio::sync::mpsc::UnboundedSender<ControlCommand>,
}

impl Controls {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<ControlCommand>) -> Self {
        Self { tx }
    }

    pub fn send(&self, command: Command, user_id: Option<String>) -> Result<()> {
        self.tx.send(ControlCommand::Apply { command, user_id })?;
        Ok(())
    }

    /// `None` or an empty list drops back to navigating the whole catalog.
    pub fn set_queue(&self, song_ids: Option<Vec<SongId>>, user_id: Option<String>) -> Result<()> {
        self.tx.send(ControlCommand::SetQueue { song_ids, user_id })?;
        Ok(())
    }

    pub fn quit(&self) -> Result<()> {
        self.tx.send(ControlCommand::Quit)?;
        Ok(())
    }
}
