mod config;
mod ir_database;

use crate::config::{Config, VendorModel};
use crate::ir_database::FileIrDatabase;
use btrcu_core::profile::{bind_services_aggregator, DeviceProfileConfig};
use btrcu_core::recovery::{RecoveryBus, RecoveryEvent};
use btrcu_core::services::audio::AudioNotification;
use btrcu_core::services::findme::AlertLevel;
use btrcu_core::uuids::vendor;
use btrcu_core::{BluetoothAdapter, DeviceOrchestrator, OrchestratorNotification};
use btrcu_bluez::{BluetoothEvent, BluetoothSession, DeviceEvent, DeviceId, MacAddress};
use btrcu_ipc::{Datatype, Device as IpcDevice, Node, Property};
use futures::stream::StreamExt;
use log::{debug, info, warn};
use stable_eyre::eyre::{self, WrapErr};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const SERVICES_RESOLVED_TIMEOUT: Duration = Duration::from_secs(30);
const ADAPTER_POWER_CYCLE_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), eyre::Report> {
    stable_eyre::install()?;
    pretty_env_logger::init();
    color_backtrace::install();

    let config = Config::from_file().wrap_err("loading configuration")?;
    let ir_database: Arc<dyn btrcu_core::ir_database::IrDatabase> = Arc::new(
        FileIrDatabase::load(&config.ir.catalog_path, &config.ir.waveform_dir)
            .await
            .wrap_err("loading IR code database")?,
    );

    let (dbus_handle, session) = BluetoothSession::new().await?;
    let adapter = Arc::new(select_adapter(&session, config.bluetooth.adapter.as_deref()).await?);
    adapter.power(true).await?;
    adapter
        .set_pairable(true, config.bluetooth.pairable_timeout_secs * 1000)
        .await?;
    adapter.start_discovery().await?;

    let recovery_bus = RecoveryBus::new();

    let watchdog_task = tokio::spawn(run_adapter_watchdog(adapter.clone()));
    let recovery_task = tokio::spawn(run_recovery_consumer(
        session.clone(),
        adapter.clone(),
        recovery_bus.clone(),
    ));
    let manager_task = tokio::spawn(run_device_manager(
        session.clone(),
        adapter.clone(),
        recovery_bus,
        Arc::new(config),
        ir_database,
    ));

    let res: Result<_, eyre::Report> = tokio::try_join! {
        async { dbus_handle.await.map_err(eyre::Report::from) },
        flatten_join(watchdog_task),
        flatten_join(recovery_task),
        flatten_join(manager_task),
    };
    res?;
    Ok(())
}

/// Collapses a spawned task's `JoinError` and its own `Result` into a single error channel.
async fn flatten_join<T>(
    handle: tokio::task::JoinHandle<Result<T, eyre::Report>>,
) -> Result<T, eyre::Report> {
    handle.await.map_err(eyre::Report::from)?
}

async fn select_adapter(
    session: &BluetoothSession,
    requested: Option<&str>,
) -> Result<BluetoothAdapter, eyre::Report> {
    let adapters = session.get_adapters().await?;
    let chosen = match requested {
        Some(name) => adapters
            .into_iter()
            .find(|adapter| adapter.name == name || adapter.alias == name)
            .ok_or_else(|| eyre::eyre!("no such Bluetooth adapter: {name}"))?,
        None => adapters
            .into_iter()
            .next()
            .ok_or_else(|| eyre::eyre!("no Bluetooth adapter found"))?,
    };
    info!("using adapter {} ({})", chosen.name, chosen.mac_address);
    Ok(BluetoothAdapter::new(session.clone(), chosen.id))
}

/// Periodically reconciles the adapter's discovery/pairable state, in case BlueZ silently drops
/// it (a known quirk on some versions).
async fn run_adapter_watchdog(adapter: Arc<BluetoothAdapter>) -> Result<(), eyre::Report> {
    let interval = adapter.watchdog_interval();
    loop {
        sleep(interval).await;
        if let Err(err) = adapter.reconcile().await {
            warn!("adapter watchdog: reconcile failed: {err}");
        }
    }
}

/// Consumes the recovery bus (§9): power-cycles the adapter, or re-issues a connect to a
/// specific device, on behalf of whichever orchestrator published the event.
async fn run_recovery_consumer(
    session: BluetoothSession,
    adapter: Arc<BluetoothAdapter>,
    recovery_bus: RecoveryBus,
) -> Result<(), eyre::Report> {
    let mut events = recovery_bus.subscribe();
    loop {
        match events.recv().await {
            Ok(RecoveryEvent::PowerCycleAdapter) => {
                warn!("recovery: power-cycling adapter after repeated recovery failures");
                let _ = adapter.power(false).await;
                sleep(ADAPTER_POWER_CYCLE_DELAY).await;
                let _ = adapter.power(true).await;
                let _ = adapter.start_discovery().await;
            }
            Ok(RecoveryEvent::ReconnectDevice(address)) => {
                debug!("recovery: reconnect requested for {address}");
                if let Ok(devices) = session.get_devices().await {
                    if let Some(device) = devices.into_iter().find(|d| d.mac_address == address) {
                        let _ = session.connect(&device.id).await;
                    }
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("recovery: consumer lagged, {skipped} events dropped");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

/// Whether a device's advertised (or already-resolved) service list looks like one of ours.
fn advertises_remote_control(services: &[uuid::Uuid]) -> bool {
    services.contains(&vendor::remote_control_service()) || services.contains(&vendor::upgrade_service())
}

/// The MAC address's first three octets, formatted the way [`VendorModel::oui`] expects.
fn mac_oui(address: &MacAddress) -> String {
    address.to_string().split(':').take(3).collect::<Vec<_>>().join(":")
}

/// Finds the configured vendor model (§6.4) matching this device, if any vendor models are
/// configured at all. An empty allow-list means every GATT-service match is accepted.
fn matching_vendor_model<'a>(
    config: &'a Config,
    address: &MacAddress,
    advertised_name: Option<&str>,
) -> Option<&'a VendorModel> {
    if config.vendor_models.is_empty() {
        return None;
    }
    let oui = mac_oui(address);
    config.vendor_models.iter().find(|model| model.matches(&oui, advertised_name))
}

struct TrackedDevice {
    _lifecycle_task: tokio::task::JoinHandle<()>,
}

/// Watches the adapter for candidate devices and connects to any that aren't already tracked,
/// spawning a [`run_device_lifecycle`] task for each one.
async fn run_device_manager(
    session: BluetoothSession,
    adapter: Arc<BluetoothAdapter>,
    recovery_bus: RecoveryBus,
    config: Arc<Config>,
    ir_database: Arc<dyn btrcu_core::ir_database::IrDatabase>,
) -> Result<(), eyre::Report> {
    let tracked: Arc<Mutex<HashMap<MacAddress, TrackedDevice>>> = Arc::new(Mutex::new(HashMap::new()));
    loop {
        let devices = match adapter.list_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                warn!("device manager: failed to list devices: {err}");
                sleep(CONNECT_RETRY_INTERVAL).await;
                continue;
            }
        };

        for device in devices {
            if !advertises_remote_control(&device.services) {
                continue;
            }
            if !config.vendor_models.is_empty()
                && matching_vendor_model(&config, &device.mac_address, device.name.as_deref()).is_none()
            {
                continue;
            }
            let mut tracked = tracked.lock().await;
            if tracked.contains_key(&device.mac_address) {
                continue;
            }
            info!("device manager: found remote control candidate {}", device.mac_address);
            let lifecycle_task = tokio::spawn(run_device_lifecycle(
                session.clone(),
                device.id.clone(),
                device.mac_address,
                device.name.clone(),
                recovery_bus.clone(),
                config.clone(),
                ir_database.clone(),
            ));
            tracked.insert(device.mac_address, TrackedDevice {
                _lifecycle_task: lifecycle_task,
            });
        }

        tracked.lock().await.retain(|address, tracked| {
            let finished = tracked._lifecycle_task.is_finished();
            if finished {
                info!("device manager: {address} lifecycle task ended, will retry on next scan");
            }
            !finished
        });

        sleep(Duration::from_secs(config.bluetooth.scan_interval_secs)).await;
    }
}

/// Drives one device from initial connect through binding its services and forwarding its state
/// into the IPC projection, for as long as it remains connected.
async fn run_device_lifecycle(
    session: BluetoothSession,
    device_id: DeviceId,
    address: MacAddress,
    advertised_name: Option<String>,
    recovery_bus: RecoveryBus,
    config: Arc<Config>,
    ir_database: Arc<dyn btrcu_core::ir_database::IrDatabase>,
) {
    if let Err(err) = session.connect(&device_id).await {
        warn!("device {address}: connect failed: {err}");
        return;
    }

    if let Err(err) = wait_for_services_resolved(&session, &device_id).await {
        warn!("device {address}: {err}");
        let _ = session.disconnect(&device_id).await;
        return;
    }

    let default_ir_touch_mode = matching_vendor_model(&config, &address, advertised_name.as_deref())
        .map(|model| model.default_touch_mode)
        .unwrap_or(config.ir.default_touch_mode);
    let profile_config = DeviceProfileConfig {
        default_ir_touch_mode,
        strict_hardware_match: config.upgrade.strict_hardware_match,
    };
    let aggregator = match bind_services_aggregator(session.clone(), &device_id, profile_config, ir_database).await {
        Ok(aggregator) => aggregator,
        Err(err) => {
            warn!("device {address}: failed to bind GATT profile: {err}");
            let _ = session.disconnect(&device_id).await;
            return;
        }
    };

    let mut orchestrator = DeviceOrchestrator::new(session.clone(), device_id.clone(), address, recovery_bus, aggregator);
    orchestrator.handle_device_connected();
    orchestrator.handle_services_resolved(true);

    let aggregator = orchestrator.aggregator_handle();
    let (ipc_device, ipc_handle, dispatch_task) = build_ipc_device(&address, aggregator.clone());
    let ipc_device = Arc::new(ipc_device);
    let bridge_task = tokio::spawn(bridge_aggregator_to_ipc(aggregator, ipc_device));
    drop(ipc_handle);

    let mut events = match session.device_event_stream(&device_id).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!("device {address}: failed to subscribe to device events: {err}");
            bridge_task.abort();
            dispatch_task.abort();
            return;
        }
    };

    let mut ready_notifications = orchestrator.subscribe();
    loop {
        tokio::select! {
            event = events.next() => {
                match event {
                    Some(BluetoothEvent::Device { event: DeviceEvent::Connected { connected: false }, .. }) => {
                        info!("device {address}: disconnected");
                        orchestrator.handle_device_disconnected();
                        break;
                    }
                    Some(BluetoothEvent::Device { event: DeviceEvent::Connected { connected: true }, .. }) => {
                        orchestrator.handle_device_connected();
                    }
                    Some(BluetoothEvent::Device { event: DeviceEvent::ServicesResolved, .. }) => {
                        orchestrator.handle_services_resolved(true);
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            notification = ready_notifications.recv() => {
                match notification {
                    Ok(OrchestratorNotification::ReadyChanged(ready)) => info!("device {address}: ready={ready}"),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        }
    }

    bridge_task.abort();
    dispatch_task.abort();
}

async fn wait_for_services_resolved(
    session: &BluetoothSession,
    device_id: &DeviceId,
) -> Result<(), btrcu_core::BlercuError> {
    let deadline = tokio::time::Instant::now() + SERVICES_RESOLVED_TIMEOUT;
    loop {
        let info = session
            .get_device_info(device_id)
            .await
            .map_err(btrcu_core::BlercuError::from)?;
        if info.services_resolved {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(btrcu_core::BlercuError::TimedOut(
                "GATT service resolution".to_string(),
            ));
        }
        sleep(Duration::from_millis(500)).await;
    }
}

/// Builds the device's IPC node tree (§6.3) and wires inbound writes/method calls to the
/// matching sub-service on the aggregator.
fn build_ipc_device(
    address: &MacAddress,
    aggregator: Arc<btrcu_core::ServicesAggregator>,
) -> (IpcDevice, btrcu_ipc::DeviceHandle, tokio::task::JoinHandle<()>) {
    let mut builder = IpcDevice::builder(&address.to_string(), "Remote Control");

    {
        let aggregator = aggregator.clone();
        builder.set_update_callback(move |node_id, property_id, value| {
            let aggregator = aggregator.clone();
            async move {
                match (node_id.as_str(), property_id.as_str()) {
                    ("audio", "gain") => match value.parse::<u8>() {
                        Ok(gain) => aggregator.audio.set_gain(gain).await.err().map(|e| e.to_string()),
                        Err(_) => Some("gain must be an integer 0-255".to_string()),
                    },
                    _ => Some(format!("{node_id}/{property_id} is not settable")),
                }
            }
        });
    }

    {
        let aggregator = aggregator.clone();
        builder.set_method_callback(move |method, args| {
            let aggregator = aggregator.clone();
            async move {
                match method.as_str() {
                    "FindMe" => aggregator
                        .find_me
                        .start_beeping(AlertLevel::High, 10)
                        .await
                        .map(|_| "started".to_string())
                        .map_err(|e| e.to_string()),
                    "StartAudioStreaming" => aggregator
                        .audio
                        .start_streaming(btrcu_core::services::audio::Encoding::Adpcm)
                        .await
                        .map(|_| "started".to_string())
                        .map_err(|e| e.to_string()),
                    "StopAudioStreaming" => aggregator
                        .audio
                        .stop_streaming()
                        .await
                        .map(|_| "stopped".to_string())
                        .map_err(|e| e.to_string()),
                    other => Err(format!("unknown method {other} (args: {args:?})")),
                }
            }
        });
    }

    builder.spawn()
}

/// Forwards each sub-service's own notifications into the IPC device's property broadcast, for
/// as long as the device stays bound.
async fn bridge_aggregator_to_ipc(aggregator: Arc<btrcu_core::ServicesAggregator>, ipc_device: Arc<IpcDevice>) {
    ipc_device
        .add_node(Node::new(
            "battery",
            "Battery",
            "battery",
            vec![Property::new("level", "Level", Datatype::Integer, false, Some("%"), None)],
        ))
        .await;
    ipc_device
        .add_node(Node::new(
            "audio",
            "Audio",
            "audio",
            vec![
                Property::new("gain", "Gain", Datatype::Integer, true, None, None),
                Property::new("streaming", "Streaming", Datatype::Boolean, false, None, None),
            ],
        ))
        .await;

    let mut battery_events = aggregator.battery.subscribe();
    let mut audio_events = aggregator.audio.subscribe();
    loop {
        tokio::select! {
            level = battery_events.recv() => {
                match level {
                    Ok(level) => ipc_device.publish_value("battery", "level", level),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
            notification = audio_events.recv() => {
                match notification {
                    Ok(AudioNotification::StreamingChanged(streaming)) => {
                        ipc_device.publish_value("audio", "streaming", streaming);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertises_remote_control_matches_either_vendor_service() {
        assert!(!advertises_remote_control(&[]));
        assert!(advertises_remote_control(&[vendor::remote_control_service()]));
        assert!(advertises_remote_control(&[vendor::upgrade_service()]));
        assert!(!advertises_remote_control(&[uuid::Uuid::nil()]));
    }

    fn address() -> MacAddress {
        "AA:BB:CC:11:22:33".parse().unwrap()
    }

    #[test]
    fn mac_oui_is_the_first_three_octets() {
        assert_eq!(mac_oui(&address()), "AA:BB:CC");
    }

    #[test]
    fn empty_vendor_model_list_matches_nothing() {
        let config = Config::default();
        assert!(matching_vendor_model(&config, &address(), None).is_none());
    }

    #[test]
    fn matching_vendor_model_finds_the_configured_entry() {
        let mut config = Config::default();
        config.vendor_models.push(VendorModel {
            name: "Acme Remote".to_string(),
            oui: Some("AA:BB:CC".to_string()),
            scan_name_regex: None,
            default_touch_mode: 3,
            enabled: true,
        });
        let found = matching_vendor_model(&config, &address(), None);
        assert_eq!(found.map(|m| m.default_touch_mode), Some(3));
    }
}
