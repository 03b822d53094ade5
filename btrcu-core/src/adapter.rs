//! §6.1: the adapter-level capability the daemon drives to keep discovery and pairability in
//! sync with the policy it wants, plus a watchdog that reconciles observed state that has
//! drifted from the requested state (a known quirk of some BlueZ versions).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use btrcu_bluez::{AdapterId, BluetoothSession, DeviceId, DeviceInfo, DiscoveryFilter, Transport};

use crate::error::BlercuResult;

/// How often the watchdog checks whether the adapter's discovery/pairable state still matches
/// what was last requested.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

pub struct BluetoothAdapter {
    session: BluetoothSession,
    id: AdapterId,
    discovery_requested: AtomicBool,
    pairable_requested: AtomicBool,
}

impl BluetoothAdapter {
    pub fn new(session: BluetoothSession, id: AdapterId) -> Self {
        BluetoothAdapter {
            session,
            id,
            discovery_requested: AtomicBool::new(false),
            pairable_requested: AtomicBool::new(false),
        }
    }

    pub async fn list_devices(&self) -> BlercuResult<Vec<DeviceInfo>> {
        Ok(self.session.get_devices().await?)
    }

    pub async fn start_discovery(&self) -> BlercuResult<()> {
        self.discovery_requested.store(true, Ordering::SeqCst);
        let filter = DiscoveryFilter {
            transport: Some(Transport::Le),
            ..Default::default()
        };
        self.session
            .start_discovery_on_adapter_with_filter(&self.id, &filter)
            .await?;
        Ok(())
    }

    pub async fn stop_discovery(&self) -> BlercuResult<()> {
        self.discovery_requested.store(false, Ordering::SeqCst);
        self.session.stop_discovery_on_adapter(&self.id).await?;
        Ok(())
    }

    pub async fn set_pairable(&self, pairable: bool, timeout_ms: u64) -> BlercuResult<()> {
        self.pairable_requested.store(pairable, Ordering::SeqCst);
        let timeout_secs = (timeout_ms / 1000) as u32;
        self.session
            .set_adapter_pairable(&self.id, pairable, timeout_secs)
            .await?;
        Ok(())
    }

    pub async fn remove_device(&self, device: &DeviceId) -> BlercuResult<()> {
        Ok(self.session.remove_device(&self.id, device).await?)
    }

    pub async fn power(&self, on: bool) -> BlercuResult<()> {
        Ok(self.session.set_adapter_powered(&self.id, on).await?)
    }

    pub async fn modalias(&self) -> BlercuResult<String> {
        Ok(self.session.get_adapter_modalias(&self.id).await?)
    }

    /// Reconciles observed discovery/pairable state against what was last requested; intended to
    /// be polled on a [`WATCHDOG_INTERVAL`] timer by the daemon's event loop.
    pub async fn reconcile(&self) -> BlercuResult<()> {
        let info = self.session.get_adapter_info(&self.id).await?;
        if self.discovery_requested.load(Ordering::SeqCst) && !info.discovering {
            log::warn!("adapter: discovery silently stopped, restarting");
            self.start_discovery().await?;
        }
        if self.pairable_requested.load(Ordering::SeqCst) && !info.pairable {
            log::warn!("adapter: pairable silently disabled, re-enabling");
            self.session.set_adapter_pairable(&self.id, true, 0).await?;
        }
        Ok(())
    }

    pub fn watchdog_interval(&self) -> Duration {
        WATCHDOG_INTERVAL
    }
}
