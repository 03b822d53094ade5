//! §4.11: the vendor RemoteControl service. UnpairReason/RebootReason are notified by the
//! remote, RcuAction is written by us; LastKeypress/AdvertisingConfig/AdvertisingConfigCustomList
//! are optional and absent on older hardware.

use btrcu_bluez::{BluetoothSession, CharacteristicId};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Duration;

use crate::error::{BlercuError, BlercuResult};
use crate::gatt_shim::GattCharacteristic;

const NOTIFY_RETRY: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnpairReason {
    UserRequested,
    LostPairingInfo,
    FactoryReset,
    Other(u8),
}

impl From<u8> for UnpairReason {
    fn from(byte: u8) -> Self {
        match byte {
            0x01 => UnpairReason::UserRequested,
            0x02 => UnpairReason::LostPairingInfo,
            0x03 => UnpairReason::FactoryReset,
            other => UnpairReason::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RebootReason {
    PowerOn,
    Watchdog,
    Firmware,
    Other(u8),
}

impl From<u8> for RebootReason {
    fn from(byte: u8) -> Self {
        match byte {
            0x01 => RebootReason::PowerOn,
            0x02 => RebootReason::Watchdog,
            0x03 => RebootReason::Firmware,
            other => RebootReason::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RcuAction {
    FactoryReset = 0x01,
    Reboot = 0x02,
    ClearPairing = 0x03,
}

#[derive(Clone, Debug)]
pub enum RemoteControlNotification {
    Unpaired(UnpairReason),
    Rebooted(RebootReason),
}

pub struct RemoteControlCharacteristics {
    pub unpair_reason: CharacteristicId,
    pub reboot_reason: CharacteristicId,
    pub rcu_action: CharacteristicId,
    pub last_keypress: Option<CharacteristicId>,
    pub advertising_config: Option<CharacteristicId>,
    pub advertising_config_custom_list: Option<CharacteristicId>,
}

pub struct RemoteControlService {
    unpair_reason: GattCharacteristic,
    reboot_reason: GattCharacteristic,
    rcu_action: GattCharacteristic,
    last_keypress: Option<GattCharacteristic>,
    advertising_config: Option<GattCharacteristic>,
    advertising_config_custom_list: Option<GattCharacteristic>,
    notify_tx: broadcast::Sender<RemoteControlNotification>,
    notify_tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    advertising_write_lock: Mutex<()>,
}

impl RemoteControlService {
    pub fn new(session: BluetoothSession, ids: RemoteControlCharacteristics) -> Self {
        let (notify_tx, _) = broadcast::channel(16);
        RemoteControlService {
            unpair_reason: GattCharacteristic::new(session.clone(), ids.unpair_reason),
            reboot_reason: GattCharacteristic::new(session.clone(), ids.reboot_reason),
            rcu_action: GattCharacteristic::new(session.clone(), ids.rcu_action),
            last_keypress: ids
                .last_keypress
                .map(|id| GattCharacteristic::new(session.clone(), id)),
            advertising_config: ids
                .advertising_config
                .map(|id| GattCharacteristic::new(session.clone(), id).with_cache()),
            advertising_config_custom_list: ids
                .advertising_config_custom_list
                .map(|id| GattCharacteristic::new(session, id).with_cache()),
            notify_tx,
            notify_tasks: Mutex::new(Vec::new()),
            advertising_write_lock: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemoteControlNotification> {
        self.notify_tx.subscribe()
    }

    /// `StartReadLastKeypress` → `StartUnpairNotify` → `StartRebootNotify` → `Starting` →
    /// `Running`. LastKeypress is an optional one-shot read, not a notify subscription, so its
    /// absence or failure is simply logged and skipped. The two required notifications retry
    /// every two seconds until they succeed.
    pub async fn start(&self) -> BlercuResult<()> {
        if let Some(last_keypress) = &self.last_keypress {
            if let Err(err) = last_keypress.read_value().await {
                log::warn!("remote control: LastKeypress read failed, ignoring: {err}");
            }
        }

        let unpair_rx = enable_with_retry(&self.unpair_reason, "UnpairReason").await;
        let reboot_rx = enable_with_retry(&self.reboot_reason, "RebootReason").await;

        let mut tasks = self.notify_tasks.lock().await;
        tasks.push(spawn_forwarder(unpair_rx, self.notify_tx.clone(), |byte| {
            RemoteControlNotification::Unpaired(UnpairReason::from(byte))
        }));
        tasks.push(spawn_forwarder(reboot_rx, self.notify_tx.clone(), |byte| {
            RemoteControlNotification::Rebooted(RebootReason::from(byte))
        }));
        Ok(())
    }

    pub async fn stop(&self) {
        for task in self.notify_tasks.lock().await.drain(..) {
            task.abort();
        }
        let _ = self.unpair_reason.disable_notifications().await;
        let _ = self.reboot_reason.disable_notifications().await;
    }

    pub async fn send_action(&self, action: RcuAction) -> BlercuResult<()> {
        self.rcu_action.write_value(vec![action as u8]).await
    }

    pub async fn last_keypress(&self) -> BlercuResult<u8> {
        match &self.last_keypress {
            Some(characteristic) => Ok(*characteristic.read_value().await?.first().unwrap_or(&0)),
            None => Err(BlercuError::NotImplemented("LastKeypress is not present on this device".to_string())),
        }
    }

    pub async fn advertising_config(&self) -> BlercuResult<u8> {
        match &self.advertising_config {
            Some(characteristic) => Ok(*characteristic.read_value().await?.first().unwrap_or(&0)),
            None => Err(BlercuError::NotImplemented("AdvertisingConfig is not present on this device".to_string())),
        }
    }

    /// Writes the config byte, then (if `custom_list` is non-empty) the custom list, completing
    /// only after both phases succeed. Serialised so a single outstanding write is in flight at
    /// a time, matching the one-promise-for-both-phases contract.
    pub async fn write_advertising_config(&self, config: u8, custom_list: &[u8]) -> BlercuResult<()> {
        let _guard = self.advertising_write_lock.lock().await;
        let config_characteristic = self
            .advertising_config
            .as_ref()
            .ok_or_else(|| BlercuError::NotImplemented("AdvertisingConfig is not present on this device".to_string()))?;
        config_characteristic.write_value(vec![config]).await?;

        if custom_list.is_empty() {
            return Ok(());
        }
        let custom_list_characteristic = self
            .advertising_config_custom_list
            .as_ref()
            .ok_or_else(|| {
                BlercuError::NotImplemented("AdvertisingConfigCustomList is not present on this device".to_string())
            })?;
        custom_list_characteristic.write_value(custom_list.to_vec()).await
    }
}

async fn enable_with_retry(
    characteristic: &GattCharacteristic,
    name: &'static str,
) -> tokio::sync::mpsc::UnboundedReceiver<Vec<u8>> {
    loop {
        match characteristic.enable_notifications().await {
            Ok(receiver) => return receiver,
            Err(err) => {
                log::warn!("remote control: enabling {name} notify failed, retrying: {err}");
                tokio::time::sleep(NOTIFY_RETRY).await;
            }
        }
    }
}

fn spawn_forwarder<F>(
    mut receiver: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
    notify_tx: broadcast::Sender<RemoteControlNotification>,
    decode: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(u8) -> RemoteControlNotification + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(value) = receiver.recv().await {
            if let Some(&byte) = value.first() {
                let _ = notify_tx.send(decode(byte));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpair_reason_decodes_known_codes() {
        assert_eq!(UnpairReason::from(0x01), UnpairReason::UserRequested);
        assert_eq!(UnpairReason::from(0xFE), UnpairReason::Other(0xFE));
    }

    #[test]
    fn reboot_reason_decodes_known_codes() {
        assert_eq!(RebootReason::from(0x02), RebootReason::Watchdog);
        assert_eq!(RebootReason::from(0x09), RebootReason::Other(0x09));
    }
}
