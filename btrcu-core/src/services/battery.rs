//! §4.8: a single notify characteristic reporting battery percentage.

use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use btrcu_bluez::{BluetoothSession, CharacteristicId};
use tokio::sync::{broadcast, Mutex};

use crate::error::BlercuResult;
use crate::gatt_shim::GattCharacteristic;

const START_NOTIFY_RETRY: Duration = Duration::from_secs(2);
/// Sentinel for "never read a level yet" (§4.8: represented as -1).
const UNKNOWN_LEVEL: i16 = -1;

pub struct BatteryService {
    level_characteristic: GattCharacteristic,
    level: Arc<AtomicI16>,
    level_changed_tx: broadcast::Sender<i16>,
    notify_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    telemetry_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BatteryService {
    pub fn new(session: BluetoothSession, battery_level: CharacteristicId) -> Self {
        let (level_changed_tx, _) = broadcast::channel(16);
        BatteryService {
            level_characteristic: GattCharacteristic::new(session, battery_level),
            level: Arc::new(AtomicI16::new(UNKNOWN_LEVEL)),
            level_changed_tx,
            notify_task: Mutex::new(None),
            telemetry_task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<i16> {
        self.level_changed_tx.subscribe()
    }

    pub fn level(&self) -> i16 {
        self.level.load(Ordering::SeqCst)
    }

    pub async fn start(&self) -> BlercuResult<()> {
        let mut receiver = loop {
            match self.level_characteristic.enable_notifications().await {
                Ok(receiver) => break receiver,
                Err(err) => {
                    log::warn!("battery: enable_notifications failed, retrying: {err}");
                    tokio::time::sleep(START_NOTIFY_RETRY).await;
                }
            }
        };

        if let Ok(initial) = self.level_characteristic.read_value().await {
            apply_reading(&self.level, &self.level_changed_tx, &initial);
        }

        let level = self.level.clone();
        let tx = self.level_changed_tx.clone();
        let handle = tokio::spawn(async move {
            while let Some(value) = receiver.recv().await {
                apply_reading(&level, &tx, &value);
            }
        });
        *self.notify_task.lock().await = Some(handle);

        let level = self.level.clone();
        let telemetry_handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5 * 60)).await;
            loop {
                log::info!("battery: level {} (telemetry milestone)", level.load(Ordering::SeqCst));
                tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
            }
        });
        *self.telemetry_task.lock().await = Some(telemetry_handle);
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.notify_task.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.telemetry_task.lock().await.take() {
            handle.abort();
        }
        let _ = self.level_characteristic.disable_notifications().await;
    }
}

fn apply_reading(level: &AtomicI16, level_changed_tx: &broadcast::Sender<i16>, value: &[u8]) {
    if let Some(&byte) = value.first() {
        let clamped = (byte as i16).clamp(0, 100);
        let previous = level.swap(clamped, Ordering::SeqCst);
        if previous != clamped {
            let _ = level_changed_tx.send(clamped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_bounds() {
        let level = AtomicI16::new(UNKNOWN_LEVEL);
        let (tx, mut rx) = broadcast::channel(4);
        apply_reading(&level, &tx, &[255]);
        assert_eq!(level.load(Ordering::SeqCst), 100);
        assert_eq!(rx.try_recv().unwrap(), 100);

        apply_reading(&level, &tx, &[100]);
        assert!(rx.try_recv().is_err(), "unchanged level must not re-emit");
    }
}
