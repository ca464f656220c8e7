//! Overlay surface that hands rendering to subscribed shell clients

use warden_api::{Event, EventPayload};
use warden_host_api::{HostError, HostResult, OverlaySurface};
use warden_ipc::EventBroadcaster;
use warden_util::AppId;

/// Broadcasts overlay requests as IPC events.
///
/// The shell client that subscribed to events owns the actual window.
pub struct IpcOverlaySurface {
    events: EventBroadcaster,
}

impl IpcOverlaySurface {
    pub fn new(events: EventBroadcaster) -> Self {
        Self { events }
    }
}

impl OverlaySurface for IpcOverlaySurface {
    fn attach(&self, app_id: &AppId, label: &str) -> HostResult<()> {
        if self.events.subscriber_count() == 0 {
            return Err(HostError::AttachFailed(
                "No overlay client is subscribed".into(),
            ));
        }

        self.events.broadcast(Event::new(EventPayload::OverlayShow {
            app_id: app_id.clone(),
            label: label.to_string(),
        }));
        Ok(())
    }

    fn detach(&self) -> HostResult<()> {
        self.events.broadcast(Event::new(EventPayload::OverlayDismiss));
        Ok(())
    }
}
