use uuid::Uuid;

/// The Bluetooth SIG base UUID, into which any 16-bit or 32-bit standard attribute UUID is
/// substituted at bytes 2-3 (or bytes 0-3 for the 32-bit form) to get the full 128-bit UUID.
const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_bytes([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb,
]);

/// Build a full 128-bit UUID from a standard Bluetooth SIG 16-bit attribute UUID.
pub fn uuid_from_u16(uuid: u16) -> Uuid {
    let mut bytes = *BLUETOOTH_BASE_UUID.as_bytes();
    bytes[2..4].copy_from_slice(&uuid.to_be_bytes());
    Uuid::from_bytes(bytes)
}

/// Build a full 128-bit UUID from a standard Bluetooth SIG 32-bit attribute UUID.
pub fn uuid_from_u32(uuid: u32) -> Uuid {
    let mut bytes = *BLUETOOTH_BASE_UUID.as_bytes();
    bytes[0..4].copy_from_slice(&uuid.to_be_bytes());
    Uuid::from_bytes(bytes)
}

/// Extension trait offering a terser spelling for building a standard UUID from its short form.
pub trait BleUuid {
    fn ble_uuid(self) -> Uuid;
}

impl BleUuid for u16 {
    fn ble_uuid(self) -> Uuid {
        uuid_from_u16(self)
    }
}

impl BleUuid for u32 {
    fn ble_uuid(self) -> Uuid {
        uuid_from_u32(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_level_uuid() {
        assert_eq!(
            uuid_from_u16(0x2a19),
            Uuid::parse_str("00002a19-0000-1000-8000-00805f9b34fb").unwrap()
        );
    }

    #[test]
    fn extension_trait_matches_free_function() {
        assert_eq!(0x180fu16.ble_uuid(), uuid_from_u16(0x180f));
    }
}
