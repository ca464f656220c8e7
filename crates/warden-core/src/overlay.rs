//! Block overlay state machine

use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_api::OverlayState;
use warden_host_api::{AppLabelResolver, OverlaySurface};
use warden_util::AppId;

/// Drives the render surface and tracks whether the overlay is up.
///
/// The state is `Hidden` or `ShownFor(app)`; it is never persisted and
/// starts `Hidden` on every process start.
pub struct OverlayController {
    surface: Arc<dyn OverlaySurface>,
    labels: Arc<dyn AppLabelResolver>,
    state: OverlayState,
}

impl OverlayController {
    pub fn new(surface: Arc<dyn OverlaySurface>, labels: Arc<dyn AppLabelResolver>) -> Self {
        Self {
            surface,
            labels,
            state: OverlayState::Hidden,
        }
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn is_showing(&self) -> bool {
        self.state.is_showing()
    }

    /// Display name for an app, falling back to the raw id
    pub fn label_for(&self, app_id: &AppId) -> String {
        self.labels
            .label_for(app_id)
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| app_id.to_string())
    }

    /// Show the overlay for `app_id`.
    ///
    /// No-op while already showing, for any app. Returns true if the surface
    /// accepted the overlay.
    pub fn show(&mut self, app_id: &AppId, now: DateTime<Local>) -> bool {
        if self.state.is_showing() {
            debug!(app_id = %app_id, "Overlay already showing");
            return false;
        }

        let label = self.label_for(app_id);
        match self.surface.attach(app_id, &label) {
            Ok(()) => {
                self.state = OverlayState::ShownFor {
                    app_id: app_id.clone(),
                    shown_at: now,
                };
                info!(app_id = %app_id, label = %label, "Block overlay shown");
                true
            }
            Err(e) => {
                warn!(app_id = %app_id, error = %e, "Failed to attach overlay");
                self.state = OverlayState::Hidden;
                false
            }
        }
    }

    /// Remove the overlay. No-op when hidden; returns true if it was showing.
    pub fn dismiss(&mut self) -> bool {
        if !self.state.is_showing() {
            return false;
        }

        self.state = OverlayState::Hidden;
        if let Err(e) = self.surface.detach() {
            warn!(error = %e, "Failed to detach overlay");
        }
        info!("Block overlay dismissed");
        true
    }

    /// The user left the overlay from the overlay itself; the surface is
    /// already gone.
    pub fn mark_closed(&mut self) {
        if self.state.is_showing() {
            debug!("Overlay closed by user");
        }
        self.state = OverlayState::Hidden;
    }
}
