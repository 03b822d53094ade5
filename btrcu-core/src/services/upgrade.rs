//! §4.6: a windowed block-transfer OTA protocol over a ControlPoint (read) and a Packet
//! (write-without-response + notify) characteristic, with an optional PacketWindowSize
//! descriptor.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use btrcu_bluez::{BluetoothSession, CharacteristicId, DescriptorId};
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::error::{BlercuError, BlercuResult};
use crate::firmware::FirmwareImage;
use crate::gatt_shim::GattCharacteristic;

/// Firmware payload maximum transfer unit: each DATA packet carries at most this many payload
/// bytes (§4.6).
pub const FIRMWARE_PACKET_MTU: usize = 18;
const DEFAULT_WINDOW_SIZE: u8 = 5;
const RETRY_TIMEOUT: Duration = Duration::from_secs(6);
const MAX_TIMEOUT_RETRIES: u32 = 3;

#[derive(Clone, Debug)]
pub enum UpgradeNotification {
    ProgressChanged(i32),
    Complete,
    Error(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ControlPointInfo {
    manufacturer_id: u8,
    hardware_major: u8,
    hardware_minor: u8,
    hardware_micro: u8,
}

impl ControlPointInfo {
    fn parse(bytes: &[u8]) -> BlercuResult<Self> {
        if bytes.len() < 4 {
            return Err(BlercuError::BadFormat("ControlPoint must be at least 12 bytes".to_string()));
        }
        Ok(ControlPointInfo {
            manufacturer_id: bytes[0],
            hardware_major: bytes[1],
            hardware_minor: bytes[2],
            hardware_micro: bytes[3],
        })
    }
}

fn rcu_error_message(code: u8) -> String {
    match code {
        0x01 => "CRC mismatch".to_string(),
        0x02 => "invalid size".to_string(),
        0x03 => "size mismatch".to_string(),
        0x04 => "battery too low".to_string(),
        0x05 => "invalid opcode".to_string(),
        0x06 => "internal".to_string(),
        0x07 => "invalid hash".to_string(),
        other => format!("unknown (0x{other:02X})"),
    }
}

fn build_wrq(length: u32, version: u32, crc32: u32) -> Vec<u8> {
    let mut packet = vec![0x00, 0x00];
    packet.extend_from_slice(&length.to_le_bytes());
    packet.extend_from_slice(&version.to_le_bytes());
    packet.extend_from_slice(&crc32.to_le_bytes());
    packet
}

fn build_data(block_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x40 | ((block_id >> 8) as u8 & 0x3F), (block_id & 0xFF) as u8];
    packet.extend_from_slice(payload);
    packet
}

enum Ack {
    Block(u16),
    Error(u8),
    Unrecognised,
}

fn parse_notification(bytes: &[u8]) -> Ack {
    let Some(&first) = bytes.first() else {
        return Ack::Unrecognised;
    };
    match first & 0xC0 {
        0x80 => {
            let Some(&second) = bytes.get(1) else {
                return Ack::Unrecognised;
            };
            let block_id = (((first & 0x3F) as u16) << 8) | second as u16;
            Ack::Block(block_id)
        }
        0xC0 => Ack::Error(bytes.get(1).copied().unwrap_or(0)),
        _ => Ack::Unrecognised,
    }
}

struct Transfer {
    image: FirmwareImage,
    window_size: u8,
    last_acked_block: AtomicI32,
    timeout_retries: AtomicI32,
    cancelled: AtomicBool,
}

struct ActiveUpgrade {
    transfer: Arc<Transfer>,
    pump_task: tokio::task::JoinHandle<()>,
    driver_task: tokio::task::JoinHandle<()>,
}

pub struct UpgradeService {
    control_point: GattCharacteristic,
    window_size_descriptor: Option<DescriptorId>,
    session: BluetoothSession,
    packet: CharacteristicId,
    upgrading: Arc<AtomicBool>,
    progress: Arc<AtomicI32>,
    strict_hardware_match: bool,
    notify_tx: broadcast::Sender<UpgradeNotification>,
    active: Mutex<Option<ActiveUpgrade>>,
}

impl UpgradeService {
    pub fn new(
        session: BluetoothSession,
        control_point: CharacteristicId,
        packet: CharacteristicId,
        window_size_descriptor: Option<DescriptorId>,
        strict_hardware_match: bool,
    ) -> Self {
        let (notify_tx, _) = broadcast::channel(16);
        UpgradeService {
            control_point: GattCharacteristic::new(session.clone(), control_point),
            window_size_descriptor,
            session,
            packet,
            upgrading: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(AtomicI32::new(-1)),
            strict_hardware_match,
            notify_tx,
            active: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpgradeNotification> {
        self.notify_tx.subscribe()
    }

    pub async fn start(&self) -> BlercuResult<()> {
        Ok(())
    }

    pub async fn stop(&self) {
        let _ = self.cancel_upgrade().await;
    }

    pub fn upgrading(&self) -> bool {
        self.upgrading.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> i32 {
        self.progress.load(Ordering::SeqCst)
    }

    pub async fn cancel_upgrade(&self) -> BlercuResult<()> {
        if !self.upgrading.swap(false, Ordering::SeqCst) {
            return Err(BlercuError::rejected("no upgrade in progress"));
        }
        if let Some(active) = self.active.lock().await.take() {
            active.transfer.cancelled.store(true, Ordering::SeqCst);
            active.pump_task.abort();
            active.driver_task.abort();
            let _ = self.session.stop_notify(&self.packet).await;
        }
        self.progress.store(-1, Ordering::SeqCst);
        Ok(())
    }

    /// Starts the upload and resolves once the remote has acknowledged the WRQ (i.e. the
    /// transfer has moved past the initial handshake into streaming DATA packets).
    pub async fn start_upgrade(&self, image: FirmwareImage) -> BlercuResult<()> {
        if self.upgrading.swap(true, Ordering::SeqCst) {
            return Err(BlercuError::busy("upgrade already in progress"));
        }

        let control_info = match self.control_point.read_value().await.and_then(|b| ControlPointInfo::parse(&b)) {
            Ok(info) => info,
            Err(err) => {
                self.upgrading.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };
        if control_info.manufacturer_id != image.manufacturer_id()
            || control_info.hardware_major != image.hardware_version().major
            || control_info.hardware_minor != image.hardware_version().minor
            || control_info.hardware_micro != image.hardware_version().patch
        {
            log::warn!("upgrade: firmware hardware id does not match device ControlPoint");
            if self.strict_hardware_match {
                self.upgrading.store(false, Ordering::SeqCst);
                return Err(BlercuError::InvalidHardware(
                    "firmware image hardware id does not match device".to_string(),
                ));
            }
        }

        let window_size = match &self.window_size_descriptor {
            Some(descriptor) => match self.session.read_descriptor_value(descriptor).await {
                Ok(bytes) => bytes.first().copied().unwrap_or(DEFAULT_WINDOW_SIZE),
                Err(err) => {
                    log::warn!("upgrade: failed to read PacketWindowSize, using default: {err}");
                    DEFAULT_WINDOW_SIZE
                }
            },
            None => DEFAULT_WINDOW_SIZE,
        };
        if window_size == 0 {
            self.upgrading.store(false, Ordering::SeqCst);
            return Err(BlercuError::general("Invalid OTA Packet Window Size"));
        }

        let mut notifications = match self.session.characteristic_event_stream(&self.packet).await {
            Ok(stream) => stream,
            Err(err) => {
                self.upgrading.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        if let Err(err) = self.session.start_notify(&self.packet).await {
            self.upgrading.store(false, Ordering::SeqCst);
            return Err(err.into());
        }

        let transfer = Arc::new(Transfer {
            image,
            window_size,
            last_acked_block: AtomicI32::new(-1),
            timeout_retries: AtomicI32::new(0),
            cancelled: AtomicBool::new(false),
        });

        let (wrq_acked_tx, wrq_acked_rx) = tokio::sync::oneshot::channel();
        let session = self.session.clone();
        let packet_id = self.packet.clone();
        let notify_tx = self.notify_tx.clone();

        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
        let pump_task = tokio::spawn(async move {
            use futures::StreamExt;
            while let Some(event) = notifications.next().await {
                if let btrcu_bluez::BluetoothEvent::Characteristic {
                    event: btrcu_bluez::CharacteristicEvent::Value { value },
                    ..
                } = event
                {
                    if ack_tx.send(value).is_err() {
                        break;
                    }
                }
            }
        });

        let driver_transfer = transfer.clone();
        let reported_progress = self.progress.clone();
        let driver_upgrading = self.upgrading.clone();

        let driver = tokio::spawn(async move {
            send_wrq(&session, &packet_id, &driver_transfer).await;
            let mut wrq_acked_tx = Some(wrq_acked_tx);

            loop {
                if driver_transfer.cancelled.load(Ordering::SeqCst) {
                    break;
                }
                let outcome = tokio::time::timeout(RETRY_TIMEOUT, ack_rx.recv()).await;
                match outcome {
                    Ok(Some(bytes)) => match parse_notification(&bytes) {
                        Ack::Block(block_id) => {
                            driver_transfer.timeout_retries.store(0, Ordering::SeqCst);
                            let total_blocks_size = block_id as u64 * FIRMWARE_PACKET_MTU as u64;
                            if total_blocks_size > driver_transfer.image.size() as u64 {
                                reported_progress.store(100, Ordering::SeqCst);
                                let _ = notify_tx.send(UpgradeNotification::ProgressChanged(100));
                                let _ = notify_tx.send(UpgradeNotification::Complete);
                                break;
                            }
                            let last = driver_transfer.last_acked_block.load(Ordering::SeqCst);
                            if (block_id as i32) > last {
                                let was_first_ack = last < 0;
                                driver_transfer
                                    .last_acked_block
                                    .store(block_id as i32, Ordering::SeqCst);
                                if was_first_ack {
                                    if let Some(tx) = wrq_acked_tx.take() {
                                        let _ = tx.send(());
                                    }
                                }
                                let pct = ((total_blocks_size * 100)
                                    / driver_transfer.image.size().max(1) as u64)
                                    as i32;
                                reported_progress.store(pct.min(99), Ordering::SeqCst);
                                let _ = notify_tx.send(UpgradeNotification::ProgressChanged(pct.min(99)));
                                send_window(&session, &packet_id, &driver_transfer).await;
                            }
                        }
                        Ack::Error(code) => {
                            let message = rcu_error_message(code);
                            let _ = notify_tx.send(UpgradeNotification::Error(message));
                            break;
                        }
                        Ack::Unrecognised => {
                            log::warn!("upgrade: unrecognised notification on Packet characteristic");
                        }
                    },
                    Ok(None) => break,
                    Err(_) => {
                        let last_acked = driver_transfer.last_acked_block.load(Ordering::SeqCst);
                        let total_blocks = block_count(&driver_transfer.image) as i64;
                        if last_acked >= 0 && last_acked as i64 >= total_blocks - driver_transfer.window_size as i64 {
                            // The remote has every block; its final ack confirming completion was
                            // lost, but there's nothing left to retransmit, so treat this timeout
                            // as completion rather than erroring out.
                            reported_progress.store(100, Ordering::SeqCst);
                            let _ = notify_tx.send(UpgradeNotification::ProgressChanged(100));
                            let _ = notify_tx.send(UpgradeNotification::Complete);
                            if let Some(tx) = wrq_acked_tx.take() {
                                let _ = tx.send(());
                            }
                            break;
                        }
                        let retries = driver_transfer.timeout_retries.fetch_add(1, Ordering::SeqCst) + 1;
                        if retries as u32 > MAX_TIMEOUT_RETRIES {
                            let _ = notify_tx.send(UpgradeNotification::Error("Timed-out".to_string()));
                            // Drop without sending: start_upgrade must reject, not succeed, when
                            // the remote never acknowledged the WRQ.
                            wrq_acked_tx.take();
                            break;
                        }
                        if last_acked < 0 {
                            send_wrq(&session, &packet_id, &driver_transfer).await;
                        } else {
                            send_window(&session, &packet_id, &driver_transfer).await;
                        }
                    }
                }
            }
            driver_upgrading.store(false, Ordering::SeqCst);
            let _ = session.stop_notify(&packet_id).await;
        });

        *self.active.lock().await = Some(ActiveUpgrade {
            transfer: transfer.clone(),
            pump_task,
            driver_task: driver,
        });

        let ack_result = wrq_acked_rx.await;
        if ack_result.is_err() {
            self.upgrading.store(false, Ordering::SeqCst);
            if let Some(active) = self.active.lock().await.take() {
                active.pump_task.abort();
                active.driver_task.abort();
            }
            return Err(BlercuError::TimedOut("OTA handshake".to_string()));
        }
        Ok(())
    }
}

async fn send_wrq(session: &BluetoothSession, packet_id: &CharacteristicId, transfer: &Transfer) {
    let wrq = build_wrq(transfer.image.size(), firmware_version_word(transfer), transfer.image.crc32());
    let _ = session
        .write_characteristic_value(packet_id, wrq)
        .await;
}

fn firmware_version_word(transfer: &Transfer) -> u32 {
    let version = transfer.image.firmware_version();
    (version.major as u32) << 16 | (version.minor as u32) << 8 | version.patch as u32
}

/// Number of DATA blocks (§4.6) the image is carved into, the last one possibly short.
fn block_count(image: &FirmwareImage) -> u32 {
    let mtu = FIRMWARE_PACKET_MTU as u64;
    ((image.size() as u64 + mtu - 1) / mtu) as u32
}

async fn send_window(session: &BluetoothSession, packet_id: &CharacteristicId, transfer: &Transfer) {
    let last_acked = transfer.last_acked_block.load(Ordering::SeqCst).max(0) as u32;
    let start_block = last_acked + 1;
    for offset in 0..transfer.window_size as u32 {
        let block_id = start_block + offset;
        let byte_offset = (block_id - 1) as u64 * FIRMWARE_PACKET_MTU as u64;
        if byte_offset >= transfer.image.size() as u64 {
            break;
        }
        let remaining = transfer.image.size() as u64 - byte_offset;
        let length = remaining.min(FIRMWARE_PACKET_MTU as u64) as u32;
        let Ok(payload) = transfer.image.read_block(byte_offset as u32, length) else {
            break;
        };
        let packet = build_data(block_id as u16, payload);
        let _ = session.write_characteristic_value(packet_id, packet).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_wrq_encodes_length_version_and_crc() {
        // 900-byte image, version word 0x00_01_02_03, crc 0xDEADBEEF, each little-endian on the wire.
        let wrq = build_wrq(900, 0x00_01_02_03, 0xDEADBEEF);
        assert_eq!(
            wrq,
            vec![0x00, 0x00, 0x84, 0x03, 0x00, 0x00, 0x03, 0x02, 0x01, 0x00, 0xEF, 0xBE, 0xAD, 0xDE]
        );
    }

    fn transfer_with(window_size: u8, data: Vec<u8>) -> Transfer {
        let image = FirmwareImage::new(0x01, crate::firmware::Version::new(1, 0, 0), crate::firmware::Version::new(1, 2, 3), data);
        Transfer {
            image,
            window_size,
            last_acked_block: AtomicI32::new(-1),
            timeout_retries: AtomicI32::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    #[test]
    fn firmware_version_word_matches_the_original_encoding() {
        let transfer = transfer_with(DEFAULT_WINDOW_SIZE, vec![0; 10]);
        assert_eq!(firmware_version_word(&transfer), 0x00_01_02_03);
    }

    #[test]
    fn block_count_rounds_up_to_the_next_block() {
        let transfer = transfer_with(DEFAULT_WINDOW_SIZE, vec![0; FIRMWARE_PACKET_MTU * 2 + 1]);
        assert_eq!(block_count(&transfer.image), 3);
    }

    #[test]
    fn block_count_is_exact_for_a_multiple_of_the_mtu() {
        let transfer = transfer_with(DEFAULT_WINDOW_SIZE, vec![0; FIRMWARE_PACKET_MTU * 4]);
        assert_eq!(block_count(&transfer.image), 4);
    }

    #[test]
    fn build_data_encodes_block_id_across_two_bytes() {
        let packet = build_data(1, &[0xAA; 18]);
        assert_eq!(packet[0], 0x40);
        assert_eq!(packet[1], 0x01);
        assert_eq!(packet.len(), 20);
    }

    #[test]
    fn parse_notification_distinguishes_ack_and_error() {
        assert!(matches!(parse_notification(&[0x80, 0x05]), Ack::Block(5)));
        assert!(matches!(parse_notification(&[0xC0, 0x01]), Ack::Error(1)));
    }

    #[test]
    fn rcu_error_messages() {
        assert_eq!(rcu_error_message(0x01), "CRC mismatch");
        assert_eq!(rcu_error_message(0xFE), "unknown (0xFE)");
    }
}
