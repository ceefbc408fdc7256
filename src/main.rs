mod adapter;
mod backend;
mod config;
mod render;
mod scenes;
mod state;
mod store;

use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use adapter::PlaybackSyncAdapter;
use backend::mpris::MprisBackend;
use backend::{DeviceIdentity, PlaybackBackend};
use config::Config;
use render::StatusLine;
use store::SharedStore;

/// Emit the status line for the current snapshot, only if it changed.
fn render_status<B: PlaybackBackend>(
    config: &Config,
    store: &SharedStore,
    adapter: &PlaybackSyncAdapter<B>,
    status: &mut StatusLine,
) {
    let snapshot = store.player_state();
    let elapsed = snapshot
        .as_ref()
        .zip(store.received_at())
        .map(|(state, at)| state.estimate_position(at));
    let line = render::status_json(
        &config.format,
        snapshot.as_ref(),
        elapsed,
        adapter.include_position() && !config.no_position,
    );
    if status.update(&line) {
        println!("{line}");
    }
}

/// Apply one line of transport input. Returns false when the loop should end.
fn handle_command<B: PlaybackBackend>(line: &str, adapter: &mut PlaybackSyncAdapter<B>) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("toggle") => adapter.toggle_play(),
        Some("next") => adapter.next_track(),
        Some("prev") => adapter.previous_track(),
        Some("seek") => match parts.next().and_then(|v| v.parse::<f64>().ok()) {
            Some(percentage) => adapter.on_slider_drag(percentage),
            None => warn!("usage: seek <percent>"),
        },
        Some("scene") => match parts.next() {
            Some(id) => adapter.select_scene(id),
            None => warn!("usage: scene <id>"),
        },
        Some("pos") => adapter.toggle_include_position(),
        Some("quit") => return false,
        Some(other) => warn!(command = other, "unknown command"),
        None => {}
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let scene_list = match &config.scenes {
        Some(path) => scenes::load_scenes(path)?,
        None => Vec::new(),
    };
    let store = SharedStore::new(config.access_token.clone(), scene_list);

    let backend = MprisBackend::new(config.blocked.clone());
    let identity = DeviceIdentity {
        name: config.device_name.clone(),
        access_token: store.access_token(),
    };
    let mut adapter = PlaybackSyncAdapter::new(backend, store.clone(), identity);
    adapter.attach().await?;
    let Some(mut pushes) = adapter.pushes() else {
        anyhow::bail!("backend session was not established");
    };

    let mut status = StatusLine::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    // Once per second so the estimated position ticks between pushes.
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    render_status(&config, &store, &adapter, &mut status);
    loop {
        tokio::select! {
            changed = pushes.changed() => {
                if changed.is_err() {
                    break;
                }
                let push = pushes.borrow_and_update().clone();
                adapter.on_external_state_change(push);
            }
            line = stdin.next_line() => {
                let Ok(Some(line)) = line else { break };
                if !handle_command(line.trim(), &mut adapter) {
                    break;
                }
            }
            _ = ticker.tick() => {}
        }
        render_status(&config, &store, &adapter, &mut status);
    }

    adapter.detach();
    Ok(())
}
