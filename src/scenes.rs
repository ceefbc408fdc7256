//! Scene/preset entries consumed to populate the selection control.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One selectable scene. The list is ordered and read-only once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntry {
    pub id: String,
    pub name: String,
}

pub fn parse_scenes(raw: &str) -> serde_json::Result<Vec<SceneEntry>> {
    serde_json::from_str(raw)
}

/// Load scene entries from a JSON file shaped `[{"id": ..., "name": ...}]`.
pub fn load_scenes(path: &Path) -> Result<Vec<SceneEntry>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(parse_scenes(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ordered_entries() {
        let raw = r#"[{"id": "sunset", "name": "Sunset"}, {"id": "strobe", "name": "Strobe"}]"#;
        let scenes = parse_scenes(raw).unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].id, "sunset");
        assert_eq!(scenes[1].name, "Strobe");
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_scenes(r#"[{"id": "x"}]"#).is_err());
    }
}
