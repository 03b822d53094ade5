//! §4.7: the CodeId/Standby/EmitIr characteristics plus an N-fold set of programmable
//! SignalSlot characteristics, one per physical key on the remote.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use btrcu_bluez::{BluetoothSession, CharacteristicId, DescriptorId};
use tokio::sync::Mutex;

use crate::error::{BlercuError, BlercuResult};
use crate::gatt_shim::GattCharacteristic;
use crate::ir_database::IrDatabase;
use crate::uuids::Key;

/// §9 open question, resolved: permanently fail a slot's setup after this many consecutive
/// unrecognised SignalReference reads rather than retrying forever.
const SIGNAL_REFERENCE_RETRY_LIMIT: u32 = 3;
const MAX_WAVEFORM_BYTES: usize = 256;

/// The default key set `program_ir_signals` programs when called with an empty key set.
const DEFAULT_KEY_SET: [Key; 5] = [
    Key::Standby,
    Key::InputSelect,
    Key::VolumeUp,
    Key::VolumeDown,
    Key::Mute,
];

struct GattDescriptorAccess {
    session: BluetoothSession,
    id: DescriptorId,
}

impl GattDescriptorAccess {
    async fn read_value(&self) -> BlercuResult<Vec<u8>> {
        self.session
            .read_descriptor_value(&self.id)
            .await
            .map_err(BlercuError::from)
    }

    async fn write_value(&self, value: Vec<u8>) -> BlercuResult<()> {
        self.session
            .write_descriptor_value(&self.id, value)
            .await
            .map_err(BlercuError::from)
    }
}

/// One programmable physical key (§3 "IR signal slot").
pub struct IrSignalSlot {
    slot: GattCharacteristic,
    signal_reference: GattDescriptorAccess,
    signal_configuration: GattDescriptorAccess,
    key: Mutex<Option<Key>>,
    failed: Mutex<bool>,
}

impl IrSignalSlot {
    pub fn new(
        session: BluetoothSession,
        slot: CharacteristicId,
        signal_reference: DescriptorId,
        signal_configuration: DescriptorId,
    ) -> Self {
        IrSignalSlot {
            slot: GattCharacteristic::new(session.clone(), slot),
            signal_reference: GattDescriptorAccess {
                session: session.clone(),
                id: signal_reference,
            },
            signal_configuration: GattDescriptorAccess {
                session,
                id: signal_configuration,
            },
            key: Mutex::new(None),
            failed: Mutex::new(false),
        }
    }

    /// Decode the key identity from the reference descriptor, retrying up to
    /// `SIGNAL_REFERENCE_RETRY_LIMIT` times on an unrecognised byte before permanently failing.
    pub async fn start(&self) {
        for attempt in 1..=SIGNAL_REFERENCE_RETRY_LIMIT {
            match self.signal_reference.read_value().await {
                Ok(bytes) => match bytes.first().copied().and_then(Key::from_signal_reference) {
                    Some(key) => {
                        *self.key.lock().await = Some(key);
                        return;
                    }
                    None => {
                        log::warn!(
                            "ir slot: unrecognised SignalReference byte on attempt {attempt}/{SIGNAL_REFERENCE_RETRY_LIMIT}"
                        );
                    }
                },
                Err(err) => {
                    log::warn!("ir slot: SignalReference read failed on attempt {attempt}: {err}");
                }
            }
        }
        log::error!("ir slot: permanently failing setup after {SIGNAL_REFERENCE_RETRY_LIMIT} retries");
        *self.failed.lock().await = true;
    }

    pub async fn key(&self) -> Option<Key> {
        *self.key.lock().await
    }

    pub async fn failed(&self) -> bool {
        *self.failed.lock().await
    }

    /// Disable → write payload → enable, per the slot's programming sub-machine. An empty
    /// payload disables the slot and skips the enable phase, returning it to the idle state.
    pub async fn program(&self, payload: &[u8]) -> BlercuResult<()> {
        if payload.len() > MAX_WAVEFORM_BYTES {
            return Err(BlercuError::general(format!(
                "IR waveform of {} bytes exceeds the {} byte limit",
                payload.len(),
                MAX_WAVEFORM_BYTES
            )));
        }
        self.signal_configuration.write_value(vec![0x00]).await?;
        if payload.is_empty() {
            return Ok(());
        }
        self.slot.write_value(payload.to_vec()).await?;
        self.signal_configuration.write_value(vec![0x01]).await
    }
}

pub struct InfraredCharacteristics {
    pub code_id: CharacteristicId,
    pub standby: Option<CharacteristicId>,
    pub emit_ir: CharacteristicId,
    pub slots: Vec<(CharacteristicId, DescriptorId, DescriptorId)>,
}

pub struct InfraredService {
    code_id_characteristic: GattCharacteristic,
    standby: Option<GattCharacteristic>,
    emit_ir: GattCharacteristic,
    slots: Vec<Arc<IrSignalSlot>>,
    default_touch_mode: u8,
    ir_database: Arc<dyn IrDatabase>,
    code_id: AtomicU32,
}

impl InfraredService {
    pub fn new(
        session: BluetoothSession,
        ids: InfraredCharacteristics,
        default_touch_mode: u8,
        ir_database: Arc<dyn IrDatabase>,
    ) -> Self {
        let slots = ids
            .slots
            .into_iter()
            .map(|(characteristic, reference, configuration)| {
                Arc::new(IrSignalSlot::new(
                    session.clone(),
                    characteristic,
                    reference,
                    configuration,
                ))
            })
            .collect();
        InfraredService {
            code_id_characteristic: GattCharacteristic::new(session.clone(), ids.code_id).with_cache(),
            standby: ids
                .standby
                .map(|id| GattCharacteristic::new(session.clone(), id)),
            emit_ir: GattCharacteristic::new(session, ids.emit_ir),
            slots,
            default_touch_mode,
            ir_database,
            code_id: AtomicU32::new(0),
        }
    }

    /// `SetStandbyMode`: an idempotent write of the per-model default touch mode, skipped if the
    /// characteristic is absent from the device's GATT profile (§9 open question, resolved).
    async fn set_standby_mode(&self) -> BlercuResult<()> {
        match &self.standby {
            Some(standby) => standby.write_value(vec![self.default_touch_mode]).await,
            None => Ok(()),
        }
    }

    pub async fn start(&self) -> BlercuResult<()> {
        self.set_standby_mode().await?;
        if let Ok(bytes) = self.code_id_characteristic.read_value().await {
            if let Ok(array) = <[u8; 4]>::try_from(bytes.as_slice()) {
                self.code_id.store(u32::from_le_bytes(array), Ordering::SeqCst);
            }
        }
        for slot in &self.slots {
            slot.start().await;
        }
        Ok(())
    }

    pub async fn stop(&self) {}

    pub fn code_id(&self) -> u32 {
        self.code_id.load(Ordering::SeqCst)
    }

    async fn active_slots(&self) -> Vec<(Key, Arc<IrSignalSlot>)> {
        let mut result = Vec::new();
        for slot in &self.slots {
            if slot.failed().await {
                continue;
            }
            if let Some(key) = slot.key().await {
                result.push((key, slot.clone()));
            }
        }
        result
    }

    /// Looks up waveforms from the IR database and programs the matching slots. An empty key
    /// set programs the default five-key set.
    pub async fn program_ir_signals(&self, code_id: u32, keys: &[Key]) -> BlercuResult<()> {
        let keys: Vec<Key> = if keys.is_empty() {
            DEFAULT_KEY_SET.to_vec()
        } else {
            keys.to_vec()
        };
        let waveforms = self.ir_database.waveforms_for(code_id, &keys).await?;
        self.code_id.store(code_id, Ordering::SeqCst);
        self.code_id_characteristic
            .write_value(code_id.to_le_bytes().to_vec())
            .await?;
        self.program_ir_signal_waveforms(&waveforms).await
    }

    pub async fn program_ir_signal_waveforms(
        &self,
        waveforms: &HashMap<Key, Vec<u8>>,
    ) -> BlercuResult<()> {
        for (key, slot) in self.active_slots().await {
            if let Some(payload) = waveforms.get(&key) {
                slot.program(payload).await?;
            }
        }
        Ok(())
    }

    pub async fn erase_ir_signals(&self) -> BlercuResult<()> {
        for (_, slot) in self.active_slots().await {
            slot.program(&[]).await?;
        }
        Ok(())
    }

    pub async fn emit_ir_signal(&self, key: Key) -> BlercuResult<()> {
        let code = key
            .cdi_code()
            .ok_or_else(|| BlercuError::InvalidArg(format!("{key:?} has no emit code")))?;
        self.emit_ir.write_value(vec![(code & 0xFF) as u8]).await
    }
}
