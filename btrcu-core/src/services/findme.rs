//! §4.10: a single write-without-response characteristic used to make the remote beep so it
//! can be located.

use std::sync::atomic::{AtomicBool, Ordering};

use btrcu_bluez::{BluetoothSession, CharacteristicId};

use crate::error::{BlercuError, BlercuResult};
use crate::gatt_shim::GattCharacteristic;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlertLevel {
    Mid = 1,
    High = 2,
}

pub struct FindMeService {
    alert_level: GattCharacteristic,
    running: AtomicBool,
}

impl FindMeService {
    pub fn new(session: BluetoothSession, alert_level: CharacteristicId) -> Self {
        FindMeService {
            alert_level: GattCharacteristic::new(session, alert_level),
            running: AtomicBool::new(false),
        }
    }

    pub async fn start(&self) -> BlercuResult<()> {
        self.alert_level.write_value_without_response(vec![0]).await?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// `duration` is accepted for IPC interface compatibility but ignored (§4.10).
    pub async fn start_beeping(&self, level: AlertLevel, _duration_secs: u32) -> BlercuResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(BlercuError::rejected("find-me service not running"));
        }
        self.alert_level
            .write_value_without_response(vec![level as u8])
            .await
    }

    pub async fn stop_beeping(&self) -> BlercuResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(BlercuError::rejected("find-me service not running"));
        }
        self.alert_level.write_value_without_response(vec![0]).await
    }
}
