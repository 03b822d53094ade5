//! §4.9: static/one-shot reads of manufacturer/model/revision strings plus the SystemId and
//! PnP ID binary characteristics.

use std::sync::atomic::{AtomicBool, Ordering};

use btrcu_bluez::{BluetoothSession, CharacteristicId};
use tokio::sync::RwLock;

use crate::error::{BlercuError, BlercuResult};
use crate::firmware::Version;
use crate::gatt_shim::GattCharacteristic;
use crate::uuids::decode_system_id;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PnpId {
    pub vendor_source: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_version: u16,
}

impl PnpId {
    fn parse(bytes: &[u8]) -> BlercuResult<Self> {
        if bytes.len() < 7 {
            return Err(BlercuError::BadFormat(format!(
                "PnP ID must be at least 7 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(PnpId {
            vendor_source: bytes[0],
            vendor_id: u16::from_le_bytes([bytes[1], bytes[2]]),
            product_id: u16::from_le_bytes([bytes[3], bytes[4]]),
            product_version: u16::from_le_bytes([bytes[5], bytes[6]]),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct DeviceInfoSnapshot {
    pub manufacturer_name: Option<String>,
    pub model_number: Option<String>,
    pub serial_number: Option<String>,
    pub hardware_revision: Option<String>,
    pub firmware_revision: Option<String>,
    pub software_revision: Option<String>,
    pub system_id: Option<u64>,
    pub pnp_id: Option<PnpId>,
}

pub struct DeviceInfoCharacteristics {
    pub manufacturer_name: CharacteristicId,
    pub model_number: CharacteristicId,
    pub serial_number: CharacteristicId,
    pub hardware_revision: CharacteristicId,
    pub firmware_revision: CharacteristicId,
    pub software_revision: CharacteristicId,
    pub system_id: Option<CharacteristicId>,
    pub pnp_id: CharacteristicId,
}

pub struct DeviceInfoService {
    manufacturer_name: GattCharacteristic,
    model_number: GattCharacteristic,
    serial_number: GattCharacteristic,
    hardware_revision: GattCharacteristic,
    firmware_revision: GattCharacteristic,
    software_revision: GattCharacteristic,
    system_id: Option<GattCharacteristic>,
    pnp_id: GattCharacteristic,
    snapshot: RwLock<DeviceInfoSnapshot>,
    /// Set by the upgrade service on completion; consumed here to force the next `start()` to
    /// rediscover the static fields (§4.9's only coupling with the upgrade service).
    force_refresh: AtomicBool,
}

impl DeviceInfoService {
    pub fn new(session: BluetoothSession, ids: DeviceInfoCharacteristics) -> Self {
        let characteristic = |id| GattCharacteristic::new(session.clone(), id).with_cache();
        DeviceInfoService {
            manufacturer_name: characteristic(ids.manufacturer_name),
            model_number: characteristic(ids.model_number),
            serial_number: characteristic(ids.serial_number),
            hardware_revision: characteristic(ids.hardware_revision),
            firmware_revision: characteristic(ids.firmware_revision),
            software_revision: characteristic(ids.software_revision),
            system_id: ids.system_id.map(|id| characteristic(id)),
            pnp_id: characteristic(ids.pnp_id),
            snapshot: RwLock::new(DeviceInfoSnapshot::default()),
            force_refresh: AtomicBool::new(true),
        }
    }

    pub fn request_refresh(&self) {
        self.force_refresh.store(true, Ordering::SeqCst);
    }

    /// Reads all six required strings and PnP ID in parallel; only those are required to reach
    /// Running. SystemId is optional and its failure does not fail `start`.
    pub async fn start(&self) -> BlercuResult<()> {
        if !self.force_refresh.swap(false, Ordering::SeqCst) && self.snapshot.read().await.manufacturer_name.is_some()
        {
            return Ok(());
        }

        let (manufacturer, model, serial, hardware, firmware, software, pnp) = tokio::try_join!(
            read_string(&self.manufacturer_name),
            read_string(&self.model_number),
            read_string(&self.serial_number),
            read_string(&self.hardware_revision),
            read_string(&self.firmware_revision),
            read_string(&self.software_revision),
            read_pnp_id(&self.pnp_id),
        )?;

        let system_id = match &self.system_id {
            Some(characteristic) => read_system_id(characteristic).await.ok(),
            None => None,
        };

        *self.snapshot.write().await = DeviceInfoSnapshot {
            manufacturer_name: Some(manufacturer),
            model_number: Some(model),
            serial_number: Some(serial),
            hardware_revision: Some(hardware),
            firmware_revision: Some(firmware),
            software_revision: Some(software),
            system_id,
            pnp_id: Some(pnp),
        };
        Ok(())
    }

    pub async fn stop(&self) {}

    pub async fn snapshot(&self) -> DeviceInfoSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn hardware_version(&self) -> Option<Version> {
        self.snapshot.read().await.hardware_revision.as_deref().and_then(parse_version)
    }
}

async fn read_string(characteristic: &GattCharacteristic) -> BlercuResult<String> {
    let bytes = characteristic.read_value().await?;
    String::from_utf8(bytes)
        .map(|s| s.trim_end_matches('\0').to_owned())
        .map_err(|err| BlercuError::BadFormat(err.to_string()))
}

async fn read_pnp_id(characteristic: &GattCharacteristic) -> BlercuResult<PnpId> {
    let bytes = characteristic.read_value().await?;
    PnpId::parse(&bytes)
}

async fn read_system_id(characteristic: &GattCharacteristic) -> BlercuResult<u64> {
    let bytes = characteristic.read_value().await?;
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| BlercuError::BadFormat("SystemId must be 8 bytes".to_string()))?;
    Ok(decode_system_id(&array))
}

/// Parse a `"major.minor.patch"` hardware revision string, if that's the format the device
/// happens to report it in. A non-conforming string simply yields `None`.
fn parse_version(revision: &str) -> Option<Version> {
    let mut parts = revision.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    Some(Version::new(major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pnp_id_parses_little_endian_fields() {
        let bytes = [0x02, 0x0A, 0x00, 0x34, 0x12, 0x01, 0x00];
        let pnp = PnpId::parse(&bytes).unwrap();
        assert_eq!(pnp.vendor_source, 0x02);
        assert_eq!(pnp.vendor_id, 0x000A);
        assert_eq!(pnp.product_id, 0x1234);
        assert_eq!(pnp.product_version, 0x0001);
    }

    #[test]
    fn pnp_id_too_short_is_bad_format() {
        assert!(matches!(PnpId::parse(&[1, 2]), Err(BlercuError::BadFormat(_))));
    }

    #[test]
    fn parse_version_accepts_dotted_triple() {
        assert_eq!(parse_version("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version("not-a-version"), None);
    }
}
