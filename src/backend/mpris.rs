//! MPRIS playback backend over D-Bus.
//!
//! Watches the first non-blocked player advertised by playerctld, turns its
//! `PropertiesChanged`/`Seeked` signals into full [`PlaybackState`]
//! snapshots, and executes transport commands as MPRIS method calls.

use std::sync::Arc;
use std::time::Duration;

use dbus::arg::PropMap;
use dbus::channel::MatchingReceiver;
use dbus::message::MatchRule;
use dbus::nonblock::stdintf::org_freedesktop_dbus::Properties;
use dbus::nonblock::{Proxy, SyncConnection};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::backend::{
    BackendError, COMMAND_BUFFER, Command, DeviceIdentity, PlaybackBackend, Session,
};
use crate::state::{PlaybackState, TrackMetadata};

const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
const MPRIS_PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";
const DBUS_PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
const PLAYERCTLD_SERVICE: &str = "org.mpris.MediaPlayer2.playerctld";
const PLAYERCTLD_INTERFACE: &str = "com.github.altdesktop.playerctld";
const TIMEOUT: Duration = Duration::from_millis(5000);

pub struct MprisBackend {
    blocked: Vec<String>,
}

impl MprisBackend {
    /// `blocked` holds lowercase substrings of player bus names to skip.
    pub fn new(blocked: Vec<String>) -> Self {
        Self { blocked }
    }
}

impl PlaybackBackend for MprisBackend {
    async fn connect(&mut self, identity: &DeviceIdentity) -> Result<Session, BackendError> {
        let (resource, conn) =
            dbus_tokio::connection::new_session_sync().map_err(|_| BackendError::NoConnection)?;
        tokio::spawn(async move { resource.await });

        if identity.access_token.is_some() {
            debug!("access token supplied; MPRIS does not require one");
        }

        let (push_tx, push_rx) = watch::channel(None);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (msg_tx, msg_rx) = mpsc::channel::<dbus::message::Message>(8);

        add_match_rule(
            &conn,
            MatchRule::new_signal(DBUS_PROPERTIES_INTERFACE, "PropertiesChanged").static_clone(),
            msg_tx.clone(),
        )
        .await?;
        add_match_rule(
            &conn,
            MatchRule::new_signal(MPRIS_PLAYER_INTERFACE, "Seeked").static_clone(),
            msg_tx,
        )
        .await?;

        let mut watcher = PlayerWatcher {
            conn,
            blocked: self.blocked.clone(),
            current_service: String::new(),
            push_tx,
            msg_rx,
            cmd_rx,
        };
        watcher.discover_initial().await;
        let listener = tokio::spawn(async move { watcher.run().await });

        Ok(Session::new(
            identity.name.clone(),
            push_rx,
            cmd_tx,
            Some(listener),
        ))
    }
}

async fn add_match_rule(
    conn: &Arc<SyncConnection>,
    rule: MatchRule<'static>,
    tx: mpsc::Sender<dbus::message::Message>,
) -> Result<(), BackendError> {
    conn.add_match(rule.clone()).await?;
    conn.start_receive(
        rule,
        Box::new(move |msg, _| {
            let _ = tx.try_send(msg);
            true
        }),
    );
    Ok(())
}

struct PlayerWatcher {
    conn: Arc<SyncConnection>,
    blocked: Vec<String>,
    current_service: String,
    push_tx: watch::Sender<Option<PlaybackState>>,
    msg_rx: mpsc::Receiver<dbus::message::Message>,
    cmd_rx: mpsc::Receiver<Command>,
}

impl PlayerWatcher {
    async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.msg_rx.recv() => {
                    let Some(msg) = msg else { break };
                    if let Err(err) = self.handle_message(msg).await {
                        warn!(%err, "ignoring D-Bus notification");
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.execute(cmd).await;
                }
            }
        }
    }

    async fn discover_initial(&mut self) {
        match self.active_player_names().await {
            Ok(names) => {
                if let PlayerSelection::Adopt(service) =
                    select_player(&names, &self.blocked, &self.current_service)
                {
                    if let Err(err) = self.adopt_player(&service).await {
                        warn!(%err, service, "could not read initial player state");
                    }
                }
            }
            Err(err) => warn!(%err, "player discovery failed"),
        }
    }

    async fn active_player_names(&self) -> Result<Vec<String>, dbus::Error> {
        let proxy = Proxy::new(PLAYERCTLD_SERVICE, MPRIS_PATH, TIMEOUT, self.conn.clone());
        Properties::get(&proxy, PLAYERCTLD_INTERFACE, "PlayerNames").await
    }

    /// Switch to `service` and publish its full snapshot.
    async fn adopt_player(&mut self, service: &str) -> Result<(), dbus::Error> {
        let snapshot = self.query_snapshot(service).await?;
        self.current_service = service.to_string();
        let _ = self.push_tx.send(Some(snapshot));
        Ok(())
    }

    async fn query_snapshot(&self, service: &str) -> Result<PlaybackState, dbus::Error> {
        let proxy = self.player_proxy(service);
        let metadata: PropMap = Properties::get(&proxy, MPRIS_PLAYER_INTERFACE, "Metadata").await?;
        let track = extract_metadata(&metadata);
        let duration_ms = metadata
            .get("mpris:length")
            .and_then(|v| v.0.as_u64())
            .map(|us| us / 1_000)
            .unwrap_or(0);
        let position_us: i64 = Properties::get(&proxy, MPRIS_PLAYER_INTERFACE, "Position")
            .await
            .unwrap_or(0);
        let status: String = Properties::get(&proxy, MPRIS_PLAYER_INTERFACE, "PlaybackStatus")
            .await
            .unwrap_or_else(|_| "Stopped".to_string());
        Ok(PlaybackState {
            position_ms: position_us.max(0) as u64 / 1_000,
            duration_ms,
            paused: status != "Playing",
            track,
        })
    }

    async fn handle_message(&mut self, msg: dbus::message::Message) -> Result<(), dbus::Error> {
        match (msg.interface().as_deref(), msg.member().as_deref()) {
            (Some(MPRIS_PLAYER_INTERFACE), Some("Seeked")) => self.handle_seeked().await,
            (Some(DBUS_PROPERTIES_INTERFACE), Some("PropertiesChanged")) => {
                self.handle_properties_changed(msg).await
            }
            _ => Ok(()),
        }
    }

    async fn handle_seeked(&mut self) -> Result<(), dbus::Error> {
        if self.current_service.is_empty() {
            return Ok(());
        }
        let service = self.current_service.clone();
        let snapshot = self.query_snapshot(&service).await?;
        let _ = self.push_tx.send(Some(snapshot));
        Ok(())
    }

    async fn handle_properties_changed(
        &mut self,
        msg: dbus::message::Message,
    ) -> Result<(), dbus::Error> {
        let Ok(interface_name) = msg.read1::<&str>() else {
            return Ok(());
        };
        match interface_name {
            PLAYERCTLD_INTERFACE | "org.mpris.MediaPlayer2" => {
                self.handle_player_list_changed(msg).await
            }
            MPRIS_PLAYER_INTERFACE => self.refresh_current(msg).await,
            _ => Ok(()),
        }
    }

    async fn handle_player_list_changed(
        &mut self,
        msg: dbus::message::Message,
    ) -> Result<(), dbus::Error> {
        let changed: Option<PropMap> = msg.read2().ok().map(|(_, c): (String, PropMap)| c);
        let Some(changed) = changed else {
            return Ok(());
        };
        if !changed.contains_key("PlayerNames") {
            return Ok(());
        }
        // A failed query is not an empty player list; leave the session as
        // it is rather than synthesize a disconnect.
        let names = match self.active_player_names().await {
            Ok(names) => names,
            Err(err) => {
                warn!(%err, "player discovery failed, keeping current session");
                return Ok(());
            }
        };
        match select_player(&names, &self.blocked, &self.current_service) {
            PlayerSelection::Adopt(service) => self.adopt_player(&service).await?,
            PlayerSelection::Keep => {}
            PlayerSelection::Ended => {
                // Last eligible player vanished; the session is over.
                self.current_service.clear();
                let _ = self.push_tx.send(None);
            }
        }
        Ok(())
    }

    async fn refresh_current(&mut self, msg: dbus::message::Message) -> Result<(), dbus::Error> {
        if self.current_service.is_empty() {
            return Ok(());
        }
        let changed: Option<PropMap> = msg.read2().ok().map(|(_, c): (String, PropMap)| c);
        let Some(changed) = changed else {
            return Ok(());
        };
        if changed.contains_key("Metadata") || changed.contains_key("PlaybackStatus") {
            let service = self.current_service.clone();
            let snapshot = self.query_snapshot(&service).await?;
            let _ = self.push_tx.send(Some(snapshot));
        } else if let Some(pos) = changed.get("Position").and_then(|v| v.0.as_i64()) {
            let current = self.push_tx.borrow().clone();
            if let Some(mut snapshot) = current {
                snapshot.position_ms = pos.max(0) as u64 / 1_000;
                let _ = self.push_tx.send(Some(snapshot));
            }
        }
        Ok(())
    }

    async fn execute(&mut self, cmd: Command) {
        if self.current_service.is_empty() {
            debug!(?cmd, "no active player for command");
            return;
        }
        let service = self.current_service.clone();
        let proxy = self.player_proxy(&service);
        let result: Result<(), dbus::Error> = match cmd {
            Command::TogglePlay => proxy
                .method_call(MPRIS_PLAYER_INTERFACE, "PlayPause", ())
                .await,
            Command::NextTrack => proxy.method_call(MPRIS_PLAYER_INTERFACE, "Next", ()).await,
            Command::PreviousTrack => {
                proxy
                    .method_call(MPRIS_PLAYER_INTERFACE, "Previous", ())
                    .await
            }
            Command::SeekTo { position_ms } => self.seek_to(&proxy, position_ms).await,
        };
        if let Err(err) = result {
            // Commands have no error channel; the next push reconciles.
            warn!(%err, "playback command failed");
        }
    }

    async fn seek_to(
        &self,
        proxy: &Proxy<'_, Arc<SyncConnection>>,
        position_ms: u64,
    ) -> Result<(), dbus::Error> {
        let current = self.push_tx.borrow().clone();
        let Some(track_id) = current.and_then(|s| s.track.track_id) else {
            debug!("seek dropped: no track id for the active player");
            return Ok(());
        };
        let Ok(path) = dbus::Path::new(track_id) else {
            debug!("seek dropped: track id is not a valid object path");
            return Ok(());
        };
        proxy
            .method_call(
                MPRIS_PLAYER_INTERFACE,
                "SetPosition",
                (path, (position_ms * 1_000) as i64),
            )
            .await
    }

    fn player_proxy<'a>(&self, service: &'a str) -> Proxy<'a, Arc<SyncConnection>> {
        Proxy::new(service, MPRIS_PATH, TIMEOUT, self.conn.clone())
    }
}

fn is_blocked(service: &str, block_list: &[String]) -> bool {
    block_list.iter().any(|b| service.to_lowercase().contains(b))
}

#[derive(Debug, PartialEq, Eq)]
enum PlayerSelection {
    /// Switch to this service and publish its snapshot.
    Adopt(String),
    /// The current service is still the first eligible one.
    Keep,
    /// No eligible player remains; the session is over.
    Ended,
}

/// Decide what a changed player list means for the current session.
fn select_player(names: &[String], blocked: &[String], current: &str) -> PlayerSelection {
    match names.iter().find(|s| !is_blocked(s, blocked)) {
        Some(service) if service.as_str() != current => PlayerSelection::Adopt(service.clone()),
        Some(_) => PlayerSelection::Keep,
        None => PlayerSelection::Ended,
    }
}

/// Helper to extract a string that might be a single value or the first in
/// an array. The MPRIS spec says artist/album are arrays of strings, but
/// some players send a single string.
fn first_string(
    variant: &dbus::arg::Variant<Box<dyn dbus::arg::RefArg + 'static>>,
) -> Option<String> {
    use dbus::arg::ArgType;
    match variant.0.arg_type() {
        ArgType::Array => variant
            .0
            .as_iter()
            .and_then(|mut iter| iter.next().and_then(|v| v.as_str()).map(str::to_string)),
        ArgType::String => variant.0.as_str().map(str::to_string),
        _ => None,
    }
}

/// Extract track metadata from a D-Bus property map.
fn extract_metadata(map: &PropMap) -> TrackMetadata {
    let title = map
        .get("xesam:title")
        .and_then(|v| v.0.as_str())
        .map(str::to_string)
        .unwrap_or_default();
    let artist = map.get("xesam:artist").and_then(first_string).unwrap_or_default();
    let album = map.get("xesam:album").and_then(first_string).unwrap_or_default();
    let art_url = map
        .get("mpris:artUrl")
        .and_then(|v| v.0.as_str())
        .map(str::to_string);
    let track_id = map
        .get("mpris:trackid")
        .and_then(|v| v.0.as_str())
        .map(str::to_string);
    TrackMetadata {
        title,
        artist,
        album,
        art_url,
        track_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbus::arg::{RefArg, Variant};

    fn prop(value: impl RefArg + 'static) -> Variant<Box<dyn RefArg>> {
        Variant(Box::new(value))
    }

    #[test]
    fn extracts_artist_from_array_or_plain_string() {
        let mut map = PropMap::new();
        map.insert("xesam:title".into(), prop("Song".to_string()));
        map.insert(
            "xesam:artist".into(),
            prop(vec!["First".to_string(), "Second".to_string()]),
        );
        let track = extract_metadata(&map);
        assert_eq!(track.title, "Song");
        assert_eq!(track.artist, "First");

        let mut map = PropMap::new();
        map.insert("xesam:artist".into(), prop("Solo".to_string()));
        assert_eq!(extract_metadata(&map).artist, "Solo");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let track = extract_metadata(&PropMap::new());
        assert_eq!(track.title, "");
        assert!(track.track_id.is_none());
        assert!(track.art_url.is_none());
    }

    #[test]
    fn block_list_matches_case_insensitive_substrings() {
        let blocked = vec!["spotify".to_string()];
        assert!(is_blocked("org.mpris.MediaPlayer2.Spotify", &blocked));
        assert!(!is_blocked("org.mpris.MediaPlayer2.vlc", &blocked));
    }

    #[test]
    fn session_ends_only_when_no_eligible_player_remains() {
        let vlc = "org.mpris.MediaPlayer2.vlc".to_string();
        let spotify = "org.mpris.MediaPlayer2.Spotify".to_string();
        let blocked = vec!["spotify".to_string()];

        // Player list actually empty, or reduced to blocked players: over.
        assert_eq!(select_player(&[], &blocked, &vlc), PlayerSelection::Ended);
        assert_eq!(
            select_player(&[spotify.clone()], &blocked, &vlc),
            PlayerSelection::Ended
        );

        // First eligible player unchanged: nothing to publish.
        assert_eq!(
            select_player(&[vlc.clone()], &blocked, &vlc),
            PlayerSelection::Keep
        );

        // A different eligible player takes over.
        let mpv = "org.mpris.MediaPlayer2.mpv".to_string();
        assert_eq!(
            select_player(&[mpv.clone(), vlc.clone()], &blocked, &vlc),
            PlayerSelection::Adopt(mpv)
        );
    }
}
