//! Process-wide completion event bus (§4.E "Completion propagation", §5
//! "Shared resources"). A single `async-broadcast` channel carries one
//! `CompletionEvent` per terminal transition; every owner want subscribes
//! and filters for events addressed to it.

use mywant_core::want::Status;
use mywant_core::WantId;

/// `(child_id, controller_owner_id, terminal_status)`, published once a
/// want's task reaches `completed` or `failed` (§4.E point 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    pub child_id: WantId,
    pub controller_owner_id: WantId,
    pub terminal_status: Status,
}

/// The publishing half of the bus, held by the runtime. Overflow is
/// configured to drop the oldest unread event rather than block the
/// publisher (§5: "a slow subscriber... falls behind and silently drops
/// the oldest undelivered events rather than stalling the want that
/// publishes them").
#[derive(Clone)]
pub struct EventBus {
    sender: async_broadcast::Sender<CompletionEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> (Self, async_broadcast::Receiver<CompletionEvent>) {
        let (mut sender, receiver) = async_broadcast::broadcast(capacity.max(1));
        sender.set_overflow(true);
        (Self { sender }, receiver)
    }

    /// Publish a completion event. Never blocks: a full channel overwrites
    /// its oldest entry instead.
    pub fn publish(&self, event: CompletionEvent) {
        let _ = self.sender.try_broadcast(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> async_broadcast::Receiver<CompletionEvent> {
        self.sender.new_receiver()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_addressed_to_any_owner() {
        let (bus, _initial_receiver) = EventBus::new(4);
        let mut receiver = bus.subscribe();
        bus.publish(CompletionEvent {
            child_id: WantId::from_raw(1),
            controller_owner_id: WantId::from_raw(2),
            terminal_status: Status::Completed,
        });
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.child_id, WantId::from_raw(1));
        assert_eq!(event.controller_owner_id, WantId::from_raw(2));
    }

    #[tokio::test]
    async fn overflow_drops_oldest_rather_than_blocking_publish() {
        let (bus, _initial_receiver) = EventBus::new(1);
        let mut receiver = bus.subscribe();
        bus.publish(CompletionEvent {
            child_id: WantId::from_raw(1),
            controller_owner_id: WantId::from_raw(9),
            terminal_status: Status::Completed,
        });
        bus.publish(CompletionEvent {
            child_id: WantId::from_raw(2),
            controller_owner_id: WantId::from_raw(9),
            terminal_status: Status::Failed,
        });
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.child_id, WantId::from_raw(2), "oldest event should have been dropped");
    }
}
