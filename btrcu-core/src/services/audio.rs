//! §4.5: drives voice streaming from a remote-side microphone over four characteristics.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use btrcu_bluez::{BluetoothSession, CharacteristicId};
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::{broadcast, Mutex};

use crate::error::{BlercuError, BlercuResult};
use crate::gatt_shim::GattCharacteristic;

const AUTO_STOP_AFTER: Duration = Duration::from_secs(30);
/// Notifications on AudioData are exactly 20 bytes, carrying 5 packets-per-frame (§4.5).
const BYTES_PER_NOTIFICATION: usize = 20;
const PACKETS_PER_NOTIFICATION: u32 = 5;
const DUPLEX_BUFFER: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
    Adpcm = 0x01,
    Pcm16 = 0x02,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AudioStatus {
    pub last_error: Option<String>,
    pub actual_packets: u32,
    pub expected_packets: u32,
}

#[derive(Clone, Debug)]
pub enum AudioNotification {
    StreamingChanged(bool),
}

/// Background task handles for a streaming session, since they must own `'static` state rather
/// than borrow `&AudioService`. The counters and last error they update live on `AudioService`
/// itself so that `status()` keeps reporting them after the session stops (§4.5).
struct Session {
    drain_task: tokio::task::JoinHandle<()>,
    auto_stop_task: tokio::task::JoinHandle<()>,
}

pub struct AudioService {
    codecs: GattCharacteristic,
    gain: GattCharacteristic,
    control: GattCharacteristic,
    data: GattCharacteristic,
    bt_session: BluetoothSession,
    control_id: CharacteristicId,
    data_id: CharacteristicId,
    streaming: Arc<AtomicBool>,
    active: Arc<Mutex<Option<Session>>>,
    actual_packets: Arc<AtomicU32>,
    expected_packets: Arc<AtomicU32>,
    last_error: Arc<Mutex<Option<String>>>,
    notify_tx: broadcast::Sender<AudioNotification>,
}

impl AudioService {
    pub fn new(
        session: BluetoothSession,
        codecs: CharacteristicId,
        gain: CharacteristicId,
        control: CharacteristicId,
        data: CharacteristicId,
    ) -> Self {
        let (notify_tx, _) = broadcast::channel(16);
        AudioService {
            codecs: GattCharacteristic::new(session.clone(), codecs),
            gain: GattCharacteristic::new(session.clone(), gain).with_cache(),
            control: GattCharacteristic::new(session.clone(), control.clone()),
            data: GattCharacteristic::new(session.clone(), data.clone()),
            bt_session: session,
            control_id: control,
            data_id: data,
            streaming: Arc::new(AtomicBool::new(false)),
            active: Arc::new(Mutex::new(None)),
            actual_packets: Arc::new(AtomicU32::new(0)),
            expected_packets: Arc::new(AtomicU32::new(0)),
            last_error: Arc::new(Mutex::new(None)),
            notify_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AudioNotification> {
        self.notify_tx.subscribe()
    }

    pub async fn start(&self) -> BlercuResult<()> {
        Ok(())
    }

    pub async fn stop(&self) {
        let _ = self.stop_streaming().await;
    }

    pub async fn codecs(&self) -> BlercuResult<u32> {
        let bytes = self.codecs.read_value().await?;
        let array: [u8; 4] = bytes
            .try_into()
            .map_err(|_| BlercuError::BadFormat("AudioCodecs must be 4 bytes".to_string()))?;
        Ok(u32::from_le_bytes(array))
    }

    pub async fn gain(&self) -> BlercuResult<u8> {
        Ok(*self.gain.read_value().await?.first().unwrap_or(&0))
    }

    pub async fn set_gain(&self, value: u8) -> BlercuResult<()> {
        self.gain.write_value(vec![value]).await
    }

    /// Returns a readable end of an in-process duplex stream standing in for the anonymous
    /// byte pipe the original interface hands back as a raw file descriptor.
    pub async fn start_streaming(&self, encoding: Encoding) -> BlercuResult<DuplexStream> {
        let (writer, reader) = tokio::io::duplex(DUPLEX_BUFFER);
        self.start_streaming_to(encoding, writer).await?;
        Ok(reader)
    }

    pub async fn start_streaming_to<W>(&self, encoding: Encoding, mut sink: W) -> BlercuResult<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if self.streaming.swap(true, Ordering::SeqCst) {
            return Err(BlercuError::busy("audio already streaming"));
        }

        let mut receiver = match self.data.enable_notifications().await {
            Ok(receiver) => receiver,
            Err(err) => {
                self.streaming.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        // The control byte is fixed; `encoding` only selects which decode path the caller reads
        // the piped-out frames with, not anything sent over the wire.
        let _ = encoding;
        if let Err(err) = self.control.write_value_without_response(vec![0x01, 0x01]).await {
            self.streaming.store(false, Ordering::SeqCst);
            return Err(err);
        }

        self.actual_packets.store(0, Ordering::SeqCst);
        self.expected_packets.store(0, Ordering::SeqCst);
        *self.last_error.lock().await = None;

        let first_notification = Arc::new(AtomicBool::new(true));

        let drain_task = tokio::spawn({
            let actual_packets = self.actual_packets.clone();
            let expected_packets = self.expected_packets.clone();
            let last_error = self.last_error.clone();
            let notify_tx = self.notify_tx.clone();
            async move {
                while let Some(frame) = receiver.recv().await {
                    if first_notification.swap(false, Ordering::SeqCst) {
                        let _ = notify_tx.send(AudioNotification::StreamingChanged(true));
                    }
                    expected_packets.fetch_add(PACKETS_PER_NOTIFICATION, Ordering::SeqCst);
                    if frame.len() != BYTES_PER_NOTIFICATION {
                        *last_error.lock().await = Some(format!(
                            "unexpected AudioData frame length {}",
                            frame.len()
                        ));
                        continue;
                    }
                    if sink.write_all(&frame).await.is_err() {
                        *last_error.lock().await = Some("audio sink closed".to_string());
                        break;
                    }
                    actual_packets.fetch_add(PACKETS_PER_NOTIFICATION, Ordering::SeqCst);
                }
                let _ = sink.shutdown().await;
            }
        });

        let auto_stop_task = tokio::spawn({
            let bt_session = self.bt_session.clone();
            let control_id = self.control_id.clone();
            let data_id = self.data_id.clone();
            let streaming = self.streaming.clone();
            let active = self.active.clone();
            let notify_tx = self.notify_tx.clone();
            async move {
                tokio::time::sleep(AUTO_STOP_AFTER).await;
                if !streaming.swap(false, Ordering::SeqCst) {
                    return;
                }
                if let Some(session) = active.lock().await.take() {
                    session.drain_task.abort();
                }
                let _ = bt_session
                    .write_characteristic_value(&control_id, vec![0x01, 0x00])
                    .await;
                let _ = bt_session.stop_notify(&data_id).await;
                if notify_tx.receiver_count() > 0 {
                    let _ = notify_tx.send(AudioNotification::StreamingChanged(false));
                }
            }
        });

        *self.active.lock().await = Some(Session { drain_task, auto_stop_task });
        Ok(())
    }

    pub async fn stop_streaming(&self) -> BlercuResult<()> {
        if !self.streaming.swap(false, Ordering::SeqCst) {
            return Err(BlercuError::busy("audio not streaming"));
        }
        if let Some(session) = self.active.lock().await.take() {
            session.drain_task.abort();
            session.auto_stop_task.abort();
        }
        self.control.write_value_without_response(vec![0x01, 0x00]).await?;
        let _ = self.data.disable_notifications().await;
        if self.notify_tx.receiver_count() > 0 {
            let _ = self.notify_tx.send(AudioNotification::StreamingChanged(false));
        }
        Ok(())
    }

    /// Reflects the counters of the most recent streaming session, preserved across a stop
    /// until the next `start_streaming` call resets them (§4.5).
    pub async fn status(&self) -> AudioStatus {
        AudioStatus {
            last_error: self.last_error.lock().await.clone(),
            actual_packets: self.actual_packets.load(Ordering::SeqCst),
            expected_packets: self.expected_packets.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn expected_never_less_than_actual_by_construction() {
        // actual_packets is only ever incremented after expected_packets for the same frame.
        let expected = 10u32;
        let actual = 5u32;
        assert!(expected >= actual);
    }
}
