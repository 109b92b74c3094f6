//! Command channel messages
//!
//! Requests arrive as `Command` values, one JSON object per line, tagged by
//! the `command` field:
//!
//! ```json
//! {"command": "set-zoom", "id": "radar", "factor": 1.25}
//! ```
//!
//! Every request gets exactly one `Reply`, fire-and-forget commands included.

use crate::error::DispatchError;
use crate::store::Position;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    OpenOverlay { id: String },
    SetZoom { id: String, factor: f64 },
    GetZoom { id: String },
    SetPosition { id: String, x: i32, y: i32 },
    GetPosition { id: String },
    SetOpacity { id: String, value: f64 },
    GetOpacity { id: String },
    ResetAllSettings,
    CloseOverlay { id: String },
    ListOverlays,
}

impl Command {
    /// Overlay the command targets, if any
    pub fn overlay_id(&self) -> Option<&str> {
        match self {
            Command::OpenOverlay { id }
            | Command::SetZoom { id, .. }
            | Command::GetZoom { id }
            | Command::SetPosition { id, .. }
            | Command::GetPosition { id }
            | Command::SetOpacity { id, .. }
            | Command::GetOpacity { id }
            | Command::CloseOverlay { id } => Some(id),
            Command::ResetAllSettings | Command::ListOverlays => None,
        }
    }

    pub fn parse(line: &str) -> Result<Command, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// Open state of one catalog overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayStatus {
    pub id: String,
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Response {
    Ack,
    Opened { id: String, created: bool },
    Zoom { factor: f64 },
    Position { position: Option<Position> },
    Opacity { value: f64 },
    Overlays { overlays: Vec<OverlayStatus> },
}

/// One line written back on the command channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Ok(Response),
    Error(String),
}

impl Reply {
    pub fn to_line(&self) -> String {
        // Plain enums of strings and numbers always serialize
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}

impl From<Result<Response, DispatchError>> for Reply {
    fn from(result: Result<Response, DispatchError>) -> Self {
        match result {
            Ok(response) => Reply::Ok(response),
            Err(e) => Reply::Error(e.to_string()),
        }
    }
}
