//! Overlay catalog - the overlays the shell knows how to open

use crate::registry::{OverlaySpec, SizeHint};
use serde::{Deserialize, Serialize};

/// Default overlays: (identifier, width, height)
pub const DEFAULT_OVERLAYS: &[(&str, i32, i32)] = &[
    ("radar", 500, 500),
    ("leaderboard", 450, 300),
    ("speed", 400, 250),
    ("controls", 450, 300),
];

/// One known overlay and its default window size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayDefinition {
    pub id: String,
    pub width: i32,
    pub height: i32,
}

impl OverlayDefinition {
    pub fn new(id: impl Into<String>, width: i32, height: i32) -> Self {
        OverlayDefinition {
            id: id.into(),
            width,
            height,
        }
    }

    pub fn defaults() -> Vec<OverlayDefinition> {
        DEFAULT_OVERLAYS
            .iter()
            .map(|(id, width, height)| OverlayDefinition::new(*id, *width, *height))
            .collect()
    }

    pub fn size_hint(&self) -> SizeHint {
        SizeHint {
            width: self.width,
            height: self.height,
        }
    }
}

/// Lookup of overlay definitions plus the backend URL their content comes from
#[derive(Debug, Clone)]
pub struct OverlayCatalog {
    definitions: Vec<OverlayDefinition>,
    base_url: String,
}

impl OverlayCatalog {
    pub fn new(definitions: Vec<OverlayDefinition>, base_url: impl Into<String>) -> Self {
        OverlayCatalog {
            definitions,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn get(&self, overlay_id: &str) -> Option<&OverlayDefinition> {
        self.definitions.iter().find(|d| d.id == overlay_id)
    }

    pub fn contains(&self, overlay_id: &str) -> bool {
        self.get(overlay_id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.id.as_str())
    }

    /// Everything the window layer needs to create the overlay's window
    pub fn spec(&self, overlay_id: &str) -> Option<OverlaySpec> {
        self.get(overlay_id).map(|definition| OverlaySpec {
            overlay_id: definition.id.clone(),
            size: definition.size_hint(),
            url: format!("{}/{}", self.base_url, definition.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sizes() {
        let catalog = OverlayCatalog::new(OverlayDefinition::defaults(), "http://127.0.0.1:8000");
        assert_eq!(catalog.get("radar").unwrap().size_hint(), SizeHint { width: 500, height: 500 });
        assert_eq!(catalog.get("speed").unwrap().size_hint(), SizeHint { width: 400, height: 250 });
        assert!(!catalog.contains("minimap"));
    }

    #[test]
    fn test_spec_builds_content_url() {
        let catalog = OverlayCatalog::new(OverlayDefinition::defaults(), "http://127.0.0.1:8000/");
        let spec = catalog.spec("leaderboard").unwrap();
        assert_eq!(spec.url, "http://127.0.0.1:8000/leaderboard");
        assert_eq!(spec.size, SizeHint { width: 450, height: 300 });
        assert!(catalog.spec("minimap").is_none());
    }
}
