use btrcu_bluez::uuid_from_u16;
use uuid::Uuid;

/// This system's vendor base UUID, into which a 16-bit vendor attribute id is substituted at
/// bytes 2-3 to get the full 128-bit UUID, mirroring the Bluetooth SIG base substitution but
/// with our own base instead of theirs.
const VENDOR_BASE_UUID: Uuid = Uuid::from_bytes([
    0x00, 0x00, 0x00, 0x00, 0xbd, 0xf0, 0x40, 0x7c, 0xaa, 0xff, 0xd0, 0x99, 0x67, 0xf3, 0x1a, 0xcd,
]);

/// Build a full 128-bit UUID from this system's 16-bit vendor attribute id.
pub fn vendor_uuid(id: u16) -> Uuid {
    let mut bytes = *VENDOR_BASE_UUID.as_bytes();
    bytes[2..4].copy_from_slice(&id.to_be_bytes());
    Uuid::from_bytes(bytes)
}

macro_rules! sig_uuid {
    ($name:ident, $value:expr) => {
        pub fn $name() -> Uuid {
            uuid_from_u16($value)
        }
    };
}

pub mod sig {
    use super::*;

    sig_uuid!(battery_level, 0x2a19);
    sig_uuid!(manufacturer_name, 0x2a29);
    sig_uuid!(model_number, 0x2a24);
    sig_uuid!(serial_number, 0x2a25);
    sig_uuid!(hardware_revision, 0x2a27);
    sig_uuid!(firmware_revision, 0x2a26);
    sig_uuid!(software_revision, 0x2a28);
    sig_uuid!(system_id, 0x2a23);
    sig_uuid!(pnp_id, 0x2a50);
    sig_uuid!(alert_level, 0x2a06);
    sig_uuid!(client_characteristic_configuration, 0x2902);
    // Primary service UUIDs for the three sub-services the SIG has a standard service for.
    sig_uuid!(device_information_service, 0x180a);
    sig_uuid!(battery_service, 0x180f);
    sig_uuid!(immediate_alert_service, 0x1802);
}

pub mod vendor {
    use super::*;

    /// Primary service UUIDs for the four vendor-defined sub-services (§4.3).
    pub fn audio_service() -> Uuid {
        vendor_uuid(0x0000)
    }
    pub fn infrared_service() -> Uuid {
        vendor_uuid(0x000f)
    }
    pub fn upgrade_service() -> Uuid {
        vendor_uuid(0x003f)
    }
    pub fn remote_control_service() -> Uuid {
        vendor_uuid(0x004f)
    }

    pub fn audio_codecs() -> Uuid {
        vendor_uuid(0x0001)
    }
    pub fn audio_gain() -> Uuid {
        vendor_uuid(0x0002)
    }
    pub fn audio_control() -> Uuid {
        vendor_uuid(0x0003)
    }
    pub fn audio_data() -> Uuid {
        vendor_uuid(0x0004)
    }

    pub fn ir_code_id() -> Uuid {
        vendor_uuid(0x0010)
    }
    pub fn ir_standby() -> Uuid {
        vendor_uuid(0x0011)
    }
    pub fn ir_emit() -> Uuid {
        vendor_uuid(0x0012)
    }
    pub fn ir_signal_slot(index: u16) -> Uuid {
        vendor_uuid(0x0020 + index)
    }
    pub fn ir_signal_reference() -> Uuid {
        vendor_uuid(0x0030)
    }
    pub fn ir_signal_configuration() -> Uuid {
        vendor_uuid(0x0031)
    }

    pub fn firmware_control_point() -> Uuid {
        vendor_uuid(0x0040)
    }
    pub fn firmware_packet() -> Uuid {
        vendor_uuid(0x0041)
    }
    pub fn firmware_packet_window_size() -> Uuid {
        vendor_uuid(0x0042)
    }

    pub fn rcu_unpair_reason() -> Uuid {
        vendor_uuid(0x0050)
    }
    pub fn rcu_reboot_reason() -> Uuid {
        vendor_uuid(0x0051)
    }
    pub fn rcu_action() -> Uuid {
        vendor_uuid(0x0052)
    }
    pub fn rcu_last_keypress() -> Uuid {
        vendor_uuid(0x0053)
    }
    pub fn rcu_advertising_config() -> Uuid {
        vendor_uuid(0x0054)
    }
    pub fn rcu_advertising_config_custom_list() -> Uuid {
        vendor_uuid(0x0055)
    }
}

/// Decode the GATT "System ID" characteristic's 8 raw bytes into a `u64`, using Bluetooth SIG's
/// non-monotone byte-index reassembly (OUI ends up in the top three octets).
pub fn decode_system_id(bytes: &[u8; 8]) -> u64 {
    const SHIFTS: [u32; 8] = [32, 24, 16, 8, 0, 40, 48, 56];
    bytes
        .iter()
        .zip(SHIFTS.iter())
        .fold(0u64, |acc, (&byte, &shift)| acc | ((byte as u64) << shift))
}

/// A logical key on the remote, as named in the IR signal mapping (§4.7) and the IPC boundary.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Key {
    WakeUp,
    Standby,
    InputSelect,
    VolumeUp,
    VolumeDown,
    Mute,
    Select,
    Up,
    Down,
    Left,
    Right,
}

impl Key {
    /// Map a `SignalReference` byte to its logical key, per the fixed table.
    pub fn from_signal_reference(byte: u8) -> Option<Key> {
        match byte {
            0x0B => Some(Key::WakeUp),
            0x0C => Some(Key::Standby),
            0x29 => Some(Key::InputSelect),
            0x10 => Some(Key::VolumeUp),
            0x11 => Some(Key::VolumeDown),
            0x0D => Some(Key::Mute),
            0x5C => Some(Key::Select),
            0x58 => Some(Key::Up),
            0x59 => Some(Key::Down),
            0x5A => Some(Key::Left),
            0x5B => Some(Key::Right),
            _ => None,
        }
    }

    /// The 16-bit CDI key code used at the IPC boundary, where defined.
    pub fn cdi_code(self) -> Option<u16> {
        match self {
            Key::Standby => Some(0xE000),
            Key::VolumeUp => Some(0xE003),
            Key::VolumeDown => Some(0xE004),
            Key::Mute => Some(0xE005),
            Key::InputSelect => Some(0xE010),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_uuid_follows_pattern() {
        assert_eq!(
            vendor_uuid(0x0001),
            Uuid::parse_str("00000001-bdf0-407c-aaff-d09967f31acd").unwrap()
        );
    }

    #[test]
    fn decode_system_id_matches_spec_example() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let decoded = decode_system_id(&bytes);
        assert_eq!(
            decoded,
            0x05u64
                | (0x04 << 8)
                | (0x03 << 16)
                | (0x02 << 24)
                | (0x01 << 32)
                | (0x06 << 40)
                | (0x07 << 48)
                | (0x08 << 56)
        );
    }

    #[test]
    fn signal_reference_mapping() {
        assert_eq!(Key::from_signal_reference(0x10), Some(Key::VolumeUp));
        assert_eq!(Key::from_signal_reference(0xFF), None);
    }
}
