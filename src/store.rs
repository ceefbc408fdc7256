//! Shared store: read selectors plus a single dispatch entry point.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::scenes::SceneEntry;
use crate::state::PlaybackState;

/// Actions accepted by [`SharedStore::dispatch`].
#[derive(Debug)]
pub enum Action {
    /// Replace the cached playback snapshot wholesale. `None` means the
    /// session has ended.
    UpdatePlayerState(Option<PlaybackState>),
}

#[derive(Debug, Default)]
struct StoreState {
    player_state: Option<PlaybackState>,
    received_at: Option<Instant>,
    access_token: Option<String>,
    scenes: Vec<SceneEntry>,
}

/// Process-wide state container. Reads go through selectors, writes only
/// through [`dispatch`](Self::dispatch).
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<StoreState>>,
}

impl SharedStore {
    pub fn new(access_token: Option<String>, scenes: Vec<SceneEntry>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreState {
                access_token,
                scenes,
                ..StoreState::default()
            })),
        }
    }

    pub fn player_state(&self) -> Option<PlaybackState> {
        self.inner.lock().unwrap().player_state.clone()
    }

    /// When the current snapshot arrived, for position estimation.
    pub fn received_at(&self) -> Option<Instant> {
        self.inner.lock().unwrap().received_at
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.lock().unwrap().access_token.clone()
    }

    pub fn scenes(&self) -> Vec<SceneEntry> {
        self.inner.lock().unwrap().scenes.clone()
    }

    pub fn dispatch(&self, action: Action) {
        match action {
            Action::UpdatePlayerState(next) => {
                let mut state = self.inner.lock().unwrap();
                state.received_at = next.as_ref().map(|_| Instant::now());
                state.player_state = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TrackMetadata;

    fn snapshot(position_ms: u64) -> PlaybackState {
        PlaybackState {
            position_ms,
            duration_ms: 200_000,
            paused: false,
            track: TrackMetadata {
                title: "One".into(),
                ..TrackMetadata::default()
            },
        }
    }

    #[test]
    fn dispatch_replaces_snapshot_wholesale() {
        let store = SharedStore::new(None, Vec::new());
        store.dispatch(Action::UpdatePlayerState(Some(snapshot(1_000))));
        store.dispatch(Action::UpdatePlayerState(Some(snapshot(2_000))));
        let state = store.player_state().unwrap();
        assert_eq!(state.position_ms, 2_000);
        assert!(store.received_at().is_some());
    }

    #[test]
    fn empty_update_clears_snapshot_and_clock() {
        let store = SharedStore::new(None, Vec::new());
        store.dispatch(Action::UpdatePlayerState(Some(snapshot(1_000))));
        store.dispatch(Action::UpdatePlayerState(None));
        assert!(store.player_state().is_none());
        assert!(store.received_at().is_none());
    }

    #[test]
    fn selectors_expose_token_and_scenes() {
        let scenes = vec![SceneEntry {
            id: "s1".into(),
            name: "Scene".into(),
        }];
        let store = SharedStore::new(Some("tok".into()), scenes.clone());
        assert_eq!(store.access_token().as_deref(), Some("tok"));
        assert_eq!(store.scenes(), scenes);
    }
}
