//! The process-wide recovery bus: a broadcast channel any subsystem can publish to, consumed
//! by the adapter layer to actually power-cycle the radio or re-issue a connect.

use btrcu_bluez::MacAddress;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 32;

#[derive(Clone, Debug)]
pub enum RecoveryEvent {
    PowerCycleAdapter,
    ReconnectDevice(MacAddress),
}

#[derive(Clone)]
pub struct RecoveryBus {
    sender: broadcast::Sender<RecoveryEvent>,
}

impl RecoveryBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        RecoveryBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: RecoveryEvent) {
        // No subscribers is a legitimate state at startup; dropping the event is correct.
        let _ = self.sender.send(event);
    }
}

impl Default for RecoveryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_events_reach_subscribers() {
        let bus = RecoveryBus::new();
        let mut rx = bus.subscribe();
        bus.publish(RecoveryEvent::PowerCycleAdapter);
        assert!(matches!(
            rx.recv().await.unwrap(),
            RecoveryEvent::PowerCycleAdapter
        ));
    }
}
