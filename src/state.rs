//! Snapshot data model for externally pushed playback state.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Track metadata carried inside a playback snapshot. Opaque to the sync
/// logic; the backend track id is only needed to issue absolute seeks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub art_url: Option<String>,
    pub track_id: Option<String>,
}

/// Full playback state as pushed by the backend. Replaced wholesale on every
/// notification; never merged with a prior snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Elapsed milliseconds into the current track at push time.
    pub position_ms: u64,
    /// Total track length in milliseconds, constant per track.
    pub duration_ms: u64,
    pub paused: bool,
    pub track: TrackMetadata,
}

impl PlaybackState {
    /// Elapsed position at render time: the pushed position plus wall-clock
    /// time since the push arrived, while playing. Paused snapshots hold
    /// still until the next push.
    pub fn estimate_position(&self, received_at: Instant) -> u64 {
        if self.paused {
            self.position_ms
        } else {
            self.position_ms + received_at.elapsed().as_millis() as u64
        }
    }
}

/// Observable transport display states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDisplay {
    /// No active session; prompt the user to link a player.
    Disconnected,
    /// Active session, transport controls enabled.
    Connected,
}

impl TransportDisplay {
    /// A non-empty snapshot means connected; an absent one means
    /// disconnected. Absence of new pushes never transitions by itself.
    pub fn for_snapshot(snapshot: Option<&PlaybackState>) -> Self {
        match snapshot {
            Some(_) => Self::Connected,
            None => Self::Disconnected,
        }
    }
}
