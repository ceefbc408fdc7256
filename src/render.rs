//! Change-gated JSON status line output.

use crate::adapter::format_elapsed;
use crate::state::{PlaybackState, TrackMetadata};

const DISCONNECTED_TEXT: &str = "no player linked - start a media player to sync";

/// Suppresses duplicate status emissions.
#[derive(Debug, Default)]
pub struct StatusLine {
    last: String,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `line` differs from the previous emission.
    pub fn update(&mut self, line: &str) -> bool {
        if line == self.last {
            return false;
        }
        self.last = line.to_string();
        true
    }
}

fn format_metadata(format: &str, track: &TrackMetadata) -> String {
    format
        .replace("{title}", track.title.trim())
        .replace("{artist}", track.artist.trim())
        .replace("{album}", track.album.trim())
        .trim()
        .to_string()
}

/// Build the `{"text", "class"}` payload for the current snapshot.
pub fn status_json(
    format: &str,
    snapshot: Option<&PlaybackState>,
    elapsed_ms: Option<u64>,
    show_position: bool,
) -> String {
    let Some(state) = snapshot else {
        return serde_json::json!({
            "text": DISCONNECTED_TEXT,
            "class": "disconnected",
        })
        .to_string();
    };
    let mut text = format_metadata(format, &state.track);
    if show_position {
        let elapsed = elapsed_ms.unwrap_or(state.position_ms);
        text = format!(
            "{} {}/{}",
            text,
            format_elapsed(elapsed),
            format_elapsed(state.duration_ms)
        );
    }
    serde_json::json!({
        "text": text.trim(),
        "class": "connected",
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PlaybackState {
        PlaybackState {
            position_ms: 65_000,
            duration_ms: 245_000,
            paused: true,
            track: TrackMetadata {
                title: "Aurora".into(),
                artist: "Nova".into(),
                album: "Skyline".into(),
                ..TrackMetadata::default()
            },
        }
    }

    #[test]
    fn disconnected_line_prompts_to_link() {
        let line = status_json("{title} - {artist}", None, None, true);
        assert!(line.contains("\"class\":\"disconnected\""));
        assert!(line.contains(DISCONNECTED_TEXT));
    }

    #[test]
    fn connected_line_carries_metadata_and_position() {
        let state = snapshot();
        let line = status_json("{title} - {artist}", Some(&state), Some(65_000), true);
        assert!(line.contains("Aurora - Nova 01:05/04:05"));
        assert!(line.contains("\"class\":\"connected\""));
    }

    #[test]
    fn position_can_be_hidden() {
        let state = snapshot();
        let line = status_json("{title}", Some(&state), Some(65_000), false);
        assert!(line.contains("\"text\":\"Aurora\""));
    }

    #[test]
    fn status_line_gates_duplicate_output() {
        let mut status = StatusLine::new();
        assert!(status.update("a"));
        assert!(!status.update("a"));
        assert!(status.update("b"));
    }
}
