//! Core synchronization between externally pushed playback state and the
//! locally rendered transport surface.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::backend::{BackendError, Command, DeviceIdentity, PlaybackBackend, Session};
use crate::state::{PlaybackState, TransportDisplay};
use crate::store::{Action, SharedStore};

/// Pushes whose position lands inside this band (inclusive) are treated as
/// near-boundary jitter from the backend and are not forwarded.
const JITTER_BAND_MS: (u64, u64) = (5, 500);

/// Slider bounds; the minimum clamps to 1, never 0.
pub const SLIDER_MIN: f64 = 1.0;
pub const SLIDER_MAX: f64 = 100.0;

/// Zero-padded `mm:ss`. The hour component is folded out by the modulo and
/// deliberately never rendered, so a 62-minute position shows as `02:05`.
pub fn format_elapsed(ms: u64) -> String {
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1_000) % 60;
    format!("{:02}:{:02}", minutes, seconds)
}

/// Absolute seek target for a slider percentage, in milliseconds.
/// Multiplies before dividing so whole-percent drags stay exact.
pub fn seek_target_ms(duration_ms: u64, percentage: f64) -> f64 {
    duration_ms as f64 * percentage / 100.0
}

fn in_jitter_band(position_ms: u64) -> bool {
    (JITTER_BAND_MS.0..=JITTER_BAND_MS.1).contains(&position_ms)
}

/// Keeps the seek slider and elapsed-time display consistent with pushed
/// playback state, and mirrors local gestures back to the backend.
pub struct PlaybackSyncAdapter<B: PlaybackBackend> {
    backend: B,
    store: SharedStore,
    identity: DeviceIdentity,
    session: Option<Session>,
    registered: bool,
    slider_percentage: f64,
    selected_scene: Option<String>,
    include_position: bool,
}

impl<B: PlaybackBackend> PlaybackSyncAdapter<B> {
    pub fn new(backend: B, store: SharedStore, identity: DeviceIdentity) -> Self {
        Self {
            backend,
            store,
            identity,
            session: None,
            registered: false,
            slider_percentage: 0.0,
            selected_scene: None,
            include_position: true,
        }
    }

    /// Establish the backend session. Registration happens at most once per
    /// adapter; re-attaching is a no-op regardless of render count.
    pub async fn attach(&mut self) -> Result<(), BackendError> {
        if self.registered {
            debug!("already registered, skipping attach");
            return Ok(());
        }
        if self.store.player_state().is_some() {
            // A session already produced state upstream; nothing to establish.
            return Ok(());
        }
        let session = self.backend.connect(&self.identity).await?;
        info!(device_id = session.device_id(), "registered playback device");
        self.registered = true;
        self.session = Some(session);
        Ok(())
    }

    /// Release the backend session so no further pushes are delivered. The
    /// registration latch stays set.
    pub fn detach(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(device_id = session.device_id(), "releasing backend session");
        }
    }

    pub fn pushes(&self) -> Option<watch::Receiver<Option<PlaybackState>>> {
        self.session.as_ref().map(Session::pushes)
    }

    /// Accept a full snapshot (or `None` for "no active session") and
    /// replace the cached state wholesale. Positions inside the jitter band
    /// are suppressed; the derived slider reflects the accepted snapshot
    /// before the next render pass.
    pub fn on_external_state_change(&mut self, push: Option<PlaybackState>) {
        if let Some(state) = &push {
            if in_jitter_band(state.position_ms) {
                debug!(position_ms = state.position_ms, "suppressing boundary push");
                return;
            }
        }
        let previous = self.store.player_state();
        match (&previous, &push) {
            (None, Some(_)) => info!("playback session connected"),
            (Some(_), None) => info!("playback session ended"),
            _ => {}
        }
        if let Some(state) = &push {
            let position_changed =
                previous.as_ref().map(|p| p.position_ms) != Some(state.position_ms);
            if position_changed && state.duration_ms > 0 {
                self.slider_percentage =
                    state.position_ms as f64 / state.duration_ms as f64 * 100.0;
            }
        }
        self.store.dispatch(Action::UpdatePlayerState(push));
    }

    /// Translate a slider drag into an absolute seek. Fire-and-forget: no
    /// retry and no confirmation; the next push reconciles the display.
    pub fn on_slider_drag(&mut self, percentage: f64) {
        if !percentage.is_finite() {
            debug!(percentage, "ignoring non-finite slider value");
            return;
        }
        let percentage = percentage.clamp(SLIDER_MIN, SLIDER_MAX);
        let Some(state) = self.store.player_state() else {
            debug!("slider drag with no active session");
            return;
        };
        self.slider_percentage = percentage;
        let target = seek_target_ms(state.duration_ms, percentage);
        self.send(Command::SeekTo {
            position_ms: target.round() as u64,
        });
    }

    pub fn toggle_play(&self) {
        self.send(Command::TogglePlay);
    }

    pub fn next_track(&self) {
        self.send(Command::NextTrack);
    }

    pub fn previous_track(&self) {
        self.send(Command::PreviousTrack);
    }

    /// Record a selection from the store's scene list; unknown ids are
    /// ignored.
    pub fn select_scene(&mut self, id: &str) {
        if self.store.scenes().iter().any(|s| s.id == id) {
            self.selected_scene = Some(id.to_string());
        } else {
            debug!(id, "ignoring unknown scene");
        }
    }

    pub fn display(&self) -> TransportDisplay {
        TransportDisplay::for_snapshot(self.store.player_state().as_ref())
    }

    pub fn slider_percentage(&self) -> f64 {
        self.slider_percentage
    }

    pub fn selected_scene(&self) -> Option<&str> {
        self.selected_scene.as_deref()
    }

    pub fn include_position(&self) -> bool {
        self.include_position
    }

    pub fn toggle_include_position(&mut self) {
        self.include_position = !self.include_position;
    }

    fn send(&self, command: Command) {
        match &self.session {
            Some(session) => session.send(command),
            None => debug!(?command, "no backend session, dropping command"),
        }
    }
}
