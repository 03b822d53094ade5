//! The per-device top-level state machine (§4.2): tracks connect/pair/service-resolution
//! progress, drives the [`ServicesAggregator`](crate::aggregator::ServicesAggregator) once
//! resolved, and recovers from a stuck service-resolution by cycling the connection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use btrcu_bluez::{BluetoothSession, DeviceId, MacAddress};
use btrcu_sm::{StateId, StateMachine};
use tokio::sync::{broadcast, mpsc};

use crate::aggregator::ServicesAggregator;
use crate::device::DeviceRecord;
use crate::recovery::{RecoveryBus, RecoveryEvent};

const SERVICE_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

const IDLE: StateId = 0;
const PAIRED: StateId = 1;
const CONNECTED: StateId = 2;
const RESOLVING_SERVICES: StateId = 3;
const RECOVERY_SUPER: StateId = 4;
const RECOVERY_DISCONNECTING: StateId = 5;
const RECOVERY_RECONNECTING: StateId = 6;
const SETUP_SUPER: StateId = 7;
const STARTING_SERVICES: StateId = 8;
const READY: StateId = 9;

#[derive(Clone, Debug)]
pub enum OrchestratorEvent {
    DeviceConnected,
    DeviceDisconnected,
    DevicePaired,
    DeviceUnpaired,
    ServicesResolved,
    ServicesNotResolved,
    ServicesStarted,
    ServicesResolveTimeout,
}

use OrchestratorEvent::*;

/// Observable state shared between the orchestrator's own API and its entry/exit callbacks,
/// which cannot borrow `&mut DeviceOrchestrator` directly since they must be `'static`.
struct Shared {
    record: DeviceRecord,
}

/// A ready/connection-state change the IPC projector relays to clients.
#[derive(Clone, Debug)]
pub enum OrchestratorNotification {
    ReadyChanged(bool),
}

pub struct DeviceOrchestrator {
    sm: StateMachine<OrchestratorEvent>,
    shared: Arc<Mutex<Shared>>,
    aggregator: Arc<ServicesAggregator>,
    notify_tx: broadcast::Sender<OrchestratorNotification>,
}

impl DeviceOrchestrator {
    pub fn new(
        session: BluetoothSession,
        device_id: DeviceId,
        address: MacAddress,
        recovery_bus: RecoveryBus,
        aggregator: ServicesAggregator,
    ) -> Self {
        let shared = Arc::new(Mutex::new(Shared {
            record: DeviceRecord::new(address.clone()),
        }));
        let aggregator = Arc::new(aggregator);
        let (notify_tx, _) = broadcast::channel(16);

        let mut sm = StateMachine::new(format!("orchestrator[{}]", address));
        for (id, name) in [
            (IDLE, "Idle"),
            (PAIRED, "Paired"),
            (CONNECTED, "Connected"),
            (RESOLVING_SERVICES, "ResolvingServices"),
            (RECOVERY_SUPER, "RecoverySuperState"),
            (SETUP_SUPER, "SetupSuperState"),
        ] {
            sm.add_state(id, name).unwrap();
        }
        sm.add_child_state(RECOVERY_SUPER, RECOVERY_DISCONNECTING, "RecoveryDisconnecting")
            .unwrap();
        sm.add_child_state(RECOVERY_SUPER, RECOVERY_RECONNECTING, "RecoveryReconnecting")
            .unwrap();
        sm.add_child_state(SETUP_SUPER, STARTING_SERVICES, "StartingServices")
            .unwrap();
        sm.add_child_state(SETUP_SUPER, READY, "Ready").unwrap();
        sm.set_initial_state(IDLE).unwrap();

        sm.add_transition(IDLE, &DeviceConnected, CONNECTED).unwrap();
        sm.add_transition(IDLE, &DevicePaired, PAIRED).unwrap();
        sm.add_transition(PAIRED, &DeviceConnected, RESOLVING_SERVICES)
            .unwrap();
        sm.add_transition(CONNECTED, &DevicePaired, RESOLVING_SERVICES)
            .unwrap();
        sm.add_transition(RESOLVING_SERVICES, &ServicesResolved, STARTING_SERVICES)
            .unwrap();
        sm.add_transition(
            RESOLVING_SERVICES,
            &ServicesResolveTimeout,
            RECOVERY_DISCONNECTING,
        )
        .unwrap();
        sm.add_transition(
            RECOVERY_DISCONNECTING,
            &DeviceDisconnected,
            RECOVERY_RECONNECTING,
        )
        .unwrap();
        sm.add_transition(RECOVERY_SUPER, &DeviceConnected, RESOLVING_SERVICES)
            .unwrap();
        sm.add_transition(SETUP_SUPER, &ServicesNotResolved, RESOLVING_SERVICES)
            .unwrap();
        sm.add_transition(SETUP_SUPER, &DeviceDisconnected, PAIRED)
            .unwrap();
        sm.add_transition(SETUP_SUPER, &DeviceUnpaired, CONNECTED)
            .unwrap();
        sm.add_transition(STARTING_SERVICES, &ServicesStarted, READY)
            .unwrap();

        let tx = sm.external_sender();
        {
            let shared = shared.clone();
            sm.on_enter(RESOLVING_SERVICES, move |poster| {
                let resolved = shared.lock().unwrap().record.services_resolved;
                if resolved {
                    poster.post(ServicesResolved);
                } else if !shared.lock().unwrap().record.recovery_ceiling_reached() {
                    poster.post_delayed(ServicesResolveTimeout, SERVICE_RESOLVE_TIMEOUT);
                }
            });
        }
        {
            let tx = tx.clone();
            let shared = shared.clone();
            let session = session.clone();
            let device_id = device_id.clone();
            let recovery_bus = recovery_bus.clone();
            sm.on_enter(RECOVERY_DISCONNECTING, move |_poster| {
                let ceiling_reached = {
                    let mut shared = shared.lock().unwrap();
                    shared.record.recovery_attempts += 1;
                    shared.record.recovery_ceiling_reached()
                };
                if ceiling_reached {
                    recovery_bus.publish(RecoveryEvent::PowerCycleAdapter);
                }
                let tx = tx.clone();
                let session = session.clone();
                let device_id = device_id.clone();
                tokio::spawn(async move {
                    let _ = session.disconnect(&device_id).await;
                    let still_connected = session
                        .get_device_info(&device_id)
                        .await
                        .map(|info| info.connected)
                        .unwrap_or(false);
                    if !still_connected {
                        let _ = tx.send(DeviceDisconnected);
                    }
                });
            });
        }
        {
            let tx = tx.clone();
            let session = session.clone();
            let device_id = device_id.clone();
            let recovery_bus = recovery_bus.clone();
            let address = address.clone();
            sm.on_enter(RECOVERY_RECONNECTING, move |_poster| {
                recovery_bus.publish(RecoveryEvent::ReconnectDevice(address.clone()));
                let tx = tx.clone();
                let session = session.clone();
                let device_id = device_id.clone();
                tokio::spawn(async move {
                    if session.connect(&device_id).await.is_ok() {
                        let _ = tx.send(DeviceConnected);
                    }
                });
            });
        }
        {
            let tx = tx.clone();
            let aggregator = aggregator.clone();
            sm.on_enter(STARTING_SERVICES, move |_poster| {
                let tx = tx.clone();
                let aggregator = aggregator.clone();
                tokio::spawn(async move {
                    if aggregator.start().await.is_ok() {
                        let _ = tx.send(ServicesStarted);
                    }
                });
            });
        }
        {
            let shared = shared.clone();
            let notify_tx = notify_tx.clone();
            sm.on_enter(READY, move |_poster| {
                shared.lock().unwrap().record.mark_ready();
                let _ = notify_tx.send(OrchestratorNotification::ReadyChanged(true));
            });
        }
        {
            let shared = shared.clone();
            let notify_tx = notify_tx.clone();
            sm.on_exit(READY, move |_poster| {
                shared.lock().unwrap().record.mark_not_ready();
                let _ = notify_tx.send(OrchestratorNotification::ReadyChanged(false));
            });
        }
        {
            let aggregator = aggregator.clone();
            sm.on_exit(SETUP_SUPER, move |_poster| {
                let aggregator = aggregator.clone();
                tokio::spawn(async move {
                    aggregator.stop().await;
                });
            });
        }

        sm.start().unwrap();

        DeviceOrchestrator {
            sm,
            shared,
            aggregator,
            notify_tx,
        }
    }

    pub fn external_sender(&self) -> mpsc::UnboundedSender<OrchestratorEvent> {
        self.sm.external_sender()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorNotification> {
        self.notify_tx.subscribe()
    }

    pub fn handle_device_connected(&mut self) {
        self.shared.lock().unwrap().record.connected = true;
        self.sm.post_event(DeviceConnected);
    }

    pub fn handle_device_disconnected(&mut self) {
        self.shared.lock().unwrap().record.connected = false;
        self.sm.post_event(DeviceDisconnected);
    }

    pub fn handle_device_paired(&mut self) {
        self.shared.lock().unwrap().record.paired = true;
        self.sm.post_event(DevicePaired);
    }

    pub fn handle_device_unpaired(&mut self) {
        self.shared.lock().unwrap().record.paired = false;
        self.sm.post_event(DeviceUnpaired);
    }

    pub fn handle_services_resolved(&mut self, resolved: bool) {
        self.shared.lock().unwrap().record.services_resolved = resolved;
        self.sm
            .post_event(if resolved { ServicesResolved } else { ServicesNotResolved });
    }

    pub fn is_ready(&self) -> bool {
        self.shared.lock().unwrap().record.is_ready()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().unwrap().record.connected
    }

    pub fn is_paired(&self) -> bool {
        self.shared.lock().unwrap().record.paired
    }

    pub fn is_pairing(&self) -> bool {
        self.sm.in_state(RESOLVING_SERVICES)
    }

    pub fn ms_since_ready(&self) -> u64 {
        self.shared.lock().unwrap().record.ms_since_ready()
    }

    pub fn aggregator(&self) -> &ServicesAggregator {
        &self.aggregator
    }

    /// A clone of the shared handle to the aggregator, for callers that need to hold onto it
    /// from a `'static` task (e.g. an IPC projection) independent of this orchestrator's lifetime.
    pub fn aggregator_handle(&self) -> Arc<ServicesAggregator> {
        self.aggregator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_do_not_collide() {
        let ids = [
            IDLE,
            PAIRED,
            CONNECTED,
            RESOLVING_SERVICES,
            RECOVERY_SUPER,
            RECOVERY_DISCONNECTING,
            RECOVERY_RECONNECTING,
            SETUP_SUPER,
            STARTING_SERVICES,
            READY,
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
