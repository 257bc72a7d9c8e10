//! Persistence boundary: the core never durably stores anything itself
//! (spec.md §1 Non-goals, §6 "Persistence, produced events") — it emits a
//! typed event on every mutation of a persisted entity, and a storage
//! collaborator outside this crate subscribes and is responsible for
//! durability. A `tokio::sync::broadcast` fan-out of the full event set
//! spec.md §6 names.

use crate::types::Eui64;
use crate::zcl::foundation::AttributeValue;

/// Every variant spec.md §6 lists. The application controller (C8) is the
/// sole producer; devices/endpoints/clusters/groups/backups signal their
/// owner, which re-emits here rather than broadcasting directly, so there is
/// exactly one fan-out point a storage collaborator needs to subscribe to.
#[derive(Debug, Clone)]
pub enum PersistenceEvent {
    DeviceJoined { ieee: Eui64 },
    DeviceLeft { ieee: Eui64 },
    DeviceInitialized { ieee: Eui64 },
    DeviceRemoved { ieee: Eui64 },
    AttributeUpdated { ieee: Eui64, endpoint_id: u8, cluster_id: u16, attr_id: u16, value: AttributeValue },
    NetworkBackupCreated,
    NetworkBackupRemoved,
    GroupAdded { group_id: u16 },
    GroupRemoved { group_id: u16 },
    GroupMemberAdded { group_id: u16, ieee: Eui64, endpoint_id: u8 },
    GroupMemberRemoved { group_id: u16, ieee: Eui64, endpoint_id: u8 },
}

/// Fan-out for [`PersistenceEvent`]. A thin wrapper over a broadcast channel
/// rather than [`crate::listener::ListenerRegistry`]: subscribers here are
/// expected to be out-of-process-ish storage collaborators that come and go
/// independently of any single dispatch, not short-lived closures snapshotted
/// per fan-out.
pub struct PersistenceBus {
    tx: tokio::sync::broadcast::Sender<PersistenceEvent>,
}

impl Default for PersistenceBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceBus {
    pub fn new() -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PersistenceEvent> {
        self.tx.subscribe()
    }

    /// A cheap, cloneable handle a detached task/closure can hold to emit
    /// without borrowing the bus (or the controller that owns it) for its
    /// entire lifetime — used by the application controller's device-init
    /// completion callback (spec.md §9 "cyclic references").
    pub fn sender(&self) -> tokio::sync::broadcast::Sender<PersistenceEvent> {
        self.tx.clone()
    }

    /// Best-effort: a mutation event with no subscribers currently listening
    /// is simply dropped, same as `broadcast::Sender::send`'s "no active
    /// receivers" case. The core never blocks waiting for a storage
    /// collaborator to catch up.
    pub fn emit(&self, event: PersistenceEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_events() {
        let bus = PersistenceBus::new();
        let mut rx = bus.subscribe();
        bus.emit(PersistenceEvent::DeviceJoined { ieee: Eui64([1, 2, 3, 4, 5, 6, 7, 8]) });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, PersistenceEvent::DeviceJoined { .. }));
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = PersistenceBus::new();
        bus.emit(PersistenceEvent::NetworkBackupCreated);
    }
}
