//! Durable settings store
//!
//! One JSON document maps overlay identifiers to their persisted preferences.
//! The whole document is read and written as a unit; a write goes to a
//! sibling temp file which is then renamed over the target.
//!
//! Read failures never propagate: a missing, unreadable or corrupt document
//! loads as an empty mapping so the UI stays available.

use crate::error::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// Current layout version of the settings document
pub const SETTINGS_VERSION: u32 = 1;

/// Top-left window coordinate, persisted as `[x, y]`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Position { x, y }
    }
}

impl From<Position> for (i32, i32) {
    fn from(position: Position) -> Self {
        (position.x, position.y)
    }
}

/// Persisted preferences of one overlay.
/// Every field is optional: absence means "use the default", which keeps a
/// partially written record distinct from one holding explicit defaults.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct OverlaySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(
        rename = "cardBgOpacity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub card_bg_opacity: Option<f64>,
    /// Fields written by other versions of the app, kept on rewrite
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OverlaySettings {
    pub fn is_empty(&self) -> bool {
        self.zoom.is_none()
            && self.position.is_none()
            && self.card_bg_opacity.is_none()
            && self.extra.is_empty()
    }
}

/// Overlay identifier -> settings
pub type OverlaySettingsMap = BTreeMap<String, OverlaySettings>;

#[derive(Deserialize)]
struct SettingsDocument {
    version: u32,
    #[serde(default)]
    overlays: OverlaySettingsMap,
}

#[derive(Serialize)]
struct SettingsDocumentRef<'a> {
    version: u32,
    overlays: &'a OverlaySettingsMap,
}

/// File-backed settings store.
/// The only component allowed to touch the settings document path.
pub struct SettingsStore {
    path: PathBuf,
    /// Serializes load-modify-save sequences within this process
    write_lock: Mutex<()>,
    /// Highest document version read so far; a newer layout is never
    /// rewritten under an older version number
    version_seen: AtomicU32,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SettingsStore {
            path: path.into(),
            write_lock: Mutex::new(()),
            version_seen: AtomicU32::new(SETTINGS_VERSION),
        }
    }

    /// Store at the default per-user location
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(Self::new(crate::config::settings_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the settings document currently exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the persisted mapping, or an empty one on any failure
    pub fn load(&self) -> OverlaySettingsMap {
        match self.try_load() {
            Ok(map) => map,
            Err(e) => {
                warn!("{}; continuing with empty overlay settings", e);
                OverlaySettingsMap::new()
            }
        }
    }

    /// Load the persisted mapping, reporting why it could not be read
    pub fn try_load(&self) -> Result<OverlaySettingsMap, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(OverlaySettingsMap::new()),
            Err(source) => {
                return Err(StoreError::Unreadable {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(OverlaySettingsMap::new());
        }

        let (version, map) =
            parse_document(&contents).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        self.version_seen.fetch_max(version, Ordering::Relaxed);
        Ok(map)
    }

    /// Version number the next write will carry
    pub fn document_version(&self) -> u32 {
        self.version_seen.load(Ordering::Relaxed)
    }

    /// Overwrite the document with `map`
    pub fn save(&self, map: &OverlaySettingsMap) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        self.write_document(map)
    }

    /// Load-modify-save the record of one overlay
    pub fn update<F>(&self, overlay_id: &str, modify: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut OverlaySettings),
    {
        let _guard = self.write_lock.lock();
        let mut map = self.load();
        modify(map.entry(overlay_id.to_string()).or_default());
        self.write_document(&map)
    }

    /// Delete the document. A missing file is not an error.
    pub fn reset(&self) {
        let _guard = self.write_lock.lock();
        self.version_seen.store(SETTINGS_VERSION, Ordering::Relaxed);
        match fs::remove_file(&self.path) {
            Ok(()) => info!("Removed overlay settings {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No overlay settings to remove at {}", self.path.display())
            }
            Err(source) => {
                let err = StoreError::RemoveFailed {
                    path: self.path.clone(),
                    source,
                };
                warn!("{}", err);
            }
        }
    }

    fn write_document(&self, map: &OverlaySettingsMap) -> Result<(), StoreError> {
        let result = self.try_write_document(map);
        if let Err(e) = &result {
            warn!("{}", e);
        }
        result
    }

    fn try_write_document(&self, map: &OverlaySettingsMap) -> Result<(), StoreError> {
        let write_failed = |reason: String| StoreError::WriteFailed {
            path: self.path.clone(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| write_failed(format!("create {}: {}", parent.display(), e)))?;
            }
        }

        let document = SettingsDocumentRef {
            version: self.document_version(),
            overlays: map,
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| write_failed(format!("serialize: {}", e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| write_failed(format!("write {}: {}", tmp_path.display(), e)))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            write_failed(format!("replace: {}", e))
        })?;

        debug!("Saved settings for {} overlays", map.len());
        Ok(())
    }
}

/// Parse either the versioned layout or a legacy document whose top-level
/// keys are overlay identifiers. Returns the layout version alongside the
/// mapping; a legacy document reports version 0.
fn parse_document(contents: &str) -> Result<(u32, OverlaySettingsMap), serde_json::Error> {
    let value: Value = serde_json::from_str(contents)?;

    let is_versioned = value
        .as_object()
        .and_then(|object| object.get("version"))
        .map_or(false, Value::is_u64);

    if !is_versioned {
        debug!("Migrating unversioned overlay settings document");
        return Ok((0, serde_json::from_value(value)?));
    }

    let document: SettingsDocument = serde_json::from_value(value)?;
    if document.version > SETTINGS_VERSION {
        warn!(
            "Overlay settings document has newer version {} (supported: {})",
            document.version, SETTINGS_VERSION
        );
    }
    Ok((document.version, document.overlays))
}
