//! The Announcer (spec §1, external collaborator): records user-visible
//! progress, both as Kubernetes `Event`s and as entries appended to
//! `status.actionLog` (spec §3, capped at `ACTION_LOG_CAPACITY`).

use async_trait::async_trait;
use kube::runtime::events::{EventRecorder, EventType, NewEvent};

use crate::error::Result;

#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, event_type: EventType, reason: &str, message: &str) -> Result<()>;
}

/// Wraps `kube::runtime::events::EventRecorder`, the teacher's own
/// mechanism for publishing `Event`s against a watched object.
pub struct RecorderAnnouncer {
    recorder: EventRecorder,
}

impl RecorderAnnouncer {
    pub fn new(recorder: EventRecorder) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl Announcer for RecorderAnnouncer {
    async fn announce(&self, event_type: EventType, reason: &str, message: &str) -> Result<()> {
        self.recorder
            .publish(NewEvent {
                action: reason.to_string(),
                reason: reason.to_string(),
                note: Some(message.to_string()),
                event_type,
                secondary_object: None,
            })
            .await?;
        Ok(())
    }
}

/// An `Announcer` that drops every event; used in tests that only care
/// about the driver's control flow, not its side announcements.
#[derive(Clone, Copy, Default)]
pub struct NullAnnouncer;

#[async_trait]
impl Announcer for NullAnnouncer {
    async fn announce(&self, _event_type: EventType, _reason: &str, _message: &str) -> Result<()> {
        Ok(())
    }
}
