//! The uniform GATT attribute access contract every sub-service is built on: async
//! read/write/notify, an optional per-attribute cache, and a timeout clamped to a sane range.

use std::sync::Mutex;
use std::time::Duration;

use btrcu_bluez::{BluetoothError, BluetoothSession, CharacteristicId};
use tokio::sync::mpsc;

use crate::error::{BlercuError, BlercuResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);
const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 60_000;

/// Clamp a requested per-attribute timeout override into `[1000, 60000]` ms, per the shim's
/// contract.
pub fn clamp_timeout_ms(requested_ms: u64) -> u64 {
    requested_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS)
}

/// A single GATT characteristic, accessed through the uniform shim contract.
pub struct GattCharacteristic {
    session: BluetoothSession,
    id: CharacteristicId,
    timeout: Duration,
    cache: Mutex<Option<Vec<u8>>>,
    cacheable: bool,
}

impl GattCharacteristic {
    pub fn new(session: BluetoothSession, id: CharacteristicId) -> Self {
        GattCharacteristic {
            session,
            id,
            timeout: DEFAULT_TIMEOUT,
            cache: Mutex::new(None),
            cacheable: false,
        }
    }

    /// Enable caching: a successful read caches the value; it is returned on subsequent reads
    /// until a write replaces it. There is no automatic expiry.
    pub fn with_cache(mut self) -> Self {
        self.cacheable = true;
        self
    }

    /// Override the default 25 s timeout, clamped to `[1000, 60000]` ms.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(clamp_timeout_ms(timeout_ms));
        self
    }

    pub async fn read_value(&self) -> BlercuResult<Vec<u8>> {
        if self.cacheable {
            if let Some(cached) = self.cache.lock().unwrap().clone() {
                return Ok(cached);
            }
        }
        let value = tokio::time::timeout(
            self.timeout,
            self.session.read_characteristic_value(&self.id),
        )
        .await
        .map_err(|_| BlercuError::TimedOut(format!("read {} timed out", self.id)))?
        .map_err(map_bluetooth_error)?;
        if self.cacheable {
            *self.cache.lock().unwrap() = Some(value.clone());
        }
        Ok(value)
    }

    pub async fn write_value(&self, value: Vec<u8>) -> BlercuResult<()> {
        tokio::time::timeout(
            self.timeout,
            self.session
                .write_characteristic_value(&self.id, value.clone()),
        )
        .await
        .map_err(|_| BlercuError::TimedOut(format!("write {} timed out", self.id)))?
        .map_err(map_bluetooth_error)?;
        if self.cacheable {
            *self.cache.lock().unwrap() = Some(value);
        }
        Ok(())
    }

    /// A write-without-response, treated identically to `write_value` by the underlying stack
    /// client but kept as a distinct entry point to mirror the two write kinds the sub-services
    /// need to pick between.
    pub async fn write_value_without_response(&self, value: Vec<u8>) -> BlercuResult<()> {
        self.write_value(value).await
    }

    /// Enable (or, if `false`, disable) notifications, returning the receiving half of an
    /// unbounded channel over which each notification's bytes arrive. Disabling an
    /// already-disabled characteristic is a no-op success (there is nothing to close).
    pub async fn enable_notifications(&self) -> BlercuResult<mpsc::UnboundedReceiver<Vec<u8>>> {
        self.session
            .start_notify(&self.id)
            .await
            .map_err(map_bluetooth_error)?;
        let mut stream = self
            .session
            .characteristic_event_stream(&self.id)
            .await
            .map_err(map_bluetooth_error)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let session = self.session.clone();
        let id = self.id.clone();
        tokio::spawn(async move {
            use futures::StreamExt;
            while let Some(event) = stream.next().await {
                if let btrcu_bluez::BluetoothEvent::Characteristic {
                    event: btrcu_bluez::CharacteristicEvent::Value { value },
                    ..
                } = event
                {
                    if tx.send(value).is_err() {
                        let _ = session.stop_notify(&id).await;
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }

    pub async fn disable_notifications(&self) -> BlercuResult<()> {
        self.session
            .stop_notify(&self.id)
            .await
            .or_else(|err| match err {
                BluetoothError::DbusError(_) => Ok(()),
                other => Err(other),
            })
            .map_err(map_bluetooth_error)
    }
}

fn map_bluetooth_error(err: BluetoothError) -> BlercuError {
    err.into()
}
