//! Command dispatcher - routes command-channel requests into the session

use crate::command::{Command, OverlayStatus, Response};
use crate::error::DispatchError;
use crate::registry::WindowFactory;
use crate::session::Session;
use crate::store::Position;
use tracing::debug;

/// UI range for zoom factors
pub const MIN_ZOOM: f64 = 0.25;
pub const MAX_ZOOM: f64 = 3.0;

/// Handle one command. Runs on the thread that owns the window layer,
/// since opening an overlay may create a window through `factory`.
pub fn dispatch(
    session: &Session,
    command: Command,
    factory: &dyn WindowFactory,
) -> Result<Response, DispatchError> {
    debug!("Dispatching {:?}", command);

    if let Some(overlay_id) = command.overlay_id() {
        session.ensure_known(overlay_id)?;
    }

    let response = match command {
        Command::OpenOverlay { id } => {
            let (_, created) = session.open_overlay(&id, factory)?;
            Response::Opened { id, created }
        }
        Command::SetZoom { id, factor } => {
            session.cache().set_zoom(&id, clamp_zoom(factor))?;
            Response::Ack
        }
        Command::GetZoom { id } => Response::Zoom {
            factor: session.cache().get_zoom(&id),
        },
        Command::SetPosition { id, x, y } => {
            session.cache().set_position(&id, Position::new(x, y));
            Response::Ack
        }
        Command::GetPosition { id } => Response::Position {
            position: session.cache().get_position(&id),
        },
        Command::SetOpacity { id, value } => {
            session.cache().set_opacity(&id, clamp_opacity(value))?;
            Response::Ack
        }
        Command::GetOpacity { id } => Response::Opacity {
            value: session.cache().get_opacity(&id),
        },
        Command::ResetAllSettings => {
            session.reset_all();
            Response::Ack
        }
        Command::CloseOverlay { id } => {
            session.close_overlay(&id);
            Response::Ack
        }
        Command::ListOverlays => {
            let open = session.registry().open_ids();
            let overlays = session
                .catalog()
                .ids()
                .map(|id| OverlayStatus {
                    id: id.to_string(),
                    open: open.iter().any(|o| o == id),
                })
                .collect();
            Response::Overlays { overlays }
        }
    };

    Ok(response)
}

/// Clamp to the UI range. NaN passes through so the cache rejects it.
fn clamp_zoom(factor: f64) -> f64 {
    if factor.is_nan() {
        factor
    } else {
        factor.clamp(MIN_ZOOM, MAX_ZOOM)
    }
}

fn clamp_opacity(value: f64) -> f64 {
    if value.is_nan() {
        value
    } else {
        value.clamp(0.0, 1.0)
    }
}
