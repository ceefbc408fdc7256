//! Seam between the sync adapter and an external playback backend.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::state::PlaybackState;

pub mod mpris;

/// Bounded command queue; a full queue drops the command.
pub const COMMAND_BUFFER: usize = 8;

/// Transport and seek commands. Fire-and-forget: delivery is never
/// confirmed and in-flight seeks are not serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    TogglePlay,
    NextTrack,
    PreviousTrack,
    SeekTo { position_ms: u64 },
}

/// Registration identity presented to the backend on connect.
#[derive(Debug, Clone, Default)]
pub struct DeviceIdentity {
    pub name: String,
    pub access_token: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("D-Bus error: {0}")]
    DBus(#[from] dbus::Error),
    #[error("no connection to D-Bus")]
    NoConnection,
}

/// A live backend session. Owns the notification listener task; dropping
/// the session aborts it so nothing is delivered into a torn-down view.
pub struct Session {
    device_id: String,
    pushes: watch::Receiver<Option<PlaybackState>>,
    commands: mpsc::Sender<Command>,
    listener: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(
        device_id: impl Into<String>,
        pushes: watch::Receiver<Option<PlaybackState>>,
        commands: mpsc::Sender<Command>,
        listener: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            pushes,
            commands,
            listener,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// State pushes, latest-wins: a slow consumer only ever sees the most
    /// recent snapshot.
    pub fn pushes(&self) -> watch::Receiver<Option<PlaybackState>> {
        self.pushes.clone()
    }

    pub fn send(&self, command: Command) {
        if let Err(err) = self.commands.try_send(command) {
            debug!(%err, "dropping playback command");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// A playback backend the adapter can register with.
pub trait PlaybackBackend {
    /// Register the device identity with the backend and start its
    /// notification stream.
    async fn connect(&mut self, identity: &DeviceIdentity) -> Result<Session, BackendError>;
}
