//! Resolves a connected device's GATT profile (§6.2) into the characteristic/descriptor
//! bundles each sub-service needs, and assembles the [`ServicesAggregator`] for it. This is the
//! glue between the generic `GattProfile` capability and the typed sub-services in
//! [`crate::services`].

use std::sync::Arc;

use btrcu_bluez::{BluetoothSession, CharacteristicId, DeviceId, ServiceId};
use uuid::Uuid;

use crate::aggregator::{missing_required_service, ServicesAggregator};
use crate::error::BlercuResult;
use crate::ir_database::IrDatabase;
use crate::services::audio::AudioService;
use crate::services::battery::BatteryService;
use crate::services::device_info::{DeviceInfoCharacteristics, DeviceInfoService};
use crate::services::findme::FindMeService;
use crate::services::infrared::{InfraredCharacteristics, InfraredService};
use crate::services::remote_control::{RemoteControlCharacteristics, RemoteControlService};
use crate::services::upgrade::UpgradeService;
use crate::uuids::{sig, vendor};

/// Per-model configuration that isn't discoverable from the GATT profile itself.
pub struct DeviceProfileConfig {
    pub default_ir_touch_mode: u8,
    pub strict_hardware_match: bool,
}

async fn find_service(
    session: &BluetoothSession,
    device: &DeviceId,
    uuid: Uuid,
) -> Option<ServiceId> {
    session.get_service_by_uuid(device, uuid).await.ok().map(|info| info.id)
}

async fn required_characteristic(
    session: &BluetoothSession,
    service: &ServiceId,
    uuid: Uuid,
    label: &'static str,
) -> BlercuResult<CharacteristicId> {
    session
        .get_characteristic_by_uuid(service, uuid)
        .await
        .map(|info| info.id)
        .map_err(|_| missing_required_service(label))
}

async fn optional_characteristic(
    session: &BluetoothSession,
    service: &ServiceId,
    uuid: Uuid,
) -> Option<CharacteristicId> {
    session
        .get_characteristic_by_uuid(service, uuid)
        .await
        .ok()
        .map(|info| info.id)
}

async fn descriptors_for(
    session: &BluetoothSession,
    characteristic: &CharacteristicId,
    reference_uuid: Uuid,
    configuration_uuid: Uuid,
) -> Option<(CharacteristicId, btrcu_bluez::DescriptorId, btrcu_bluez::DescriptorId)> {
    let descriptors = session.get_descriptors(characteristic).await.ok()?;
    let reference = descriptors.iter().find(|d| d.uuid == reference_uuid)?.id.clone();
    let configuration = descriptors.iter().find(|d| d.uuid == configuration_uuid)?.id.clone();
    Some((characteristic.clone(), reference, configuration))
}

/// Binds a connected, service-resolved device's GATT profile into a fully constructed
/// [`ServicesAggregator`]. Required sub-services whose primary service UUID is missing fail the
/// whole bind; only RemoteControl is allowed to be absent.
pub async fn bind_services_aggregator(
    session: BluetoothSession,
    device: &DeviceId,
    config: DeviceProfileConfig,
    ir_database: Arc<dyn IrDatabase>,
) -> BlercuResult<ServicesAggregator> {
    let device_info_service =
        find_service(&session, device, sig::device_information_service()).await
            .ok_or_else(|| missing_required_service("DeviceInformation"))?;
    let device_info = DeviceInfoService::new(
        session.clone(),
        DeviceInfoCharacteristics {
            manufacturer_name: required_characteristic(&session, &device_info_service, sig::manufacturer_name(), "ManufacturerName").await?,
            model_number: required_characteristic(&session, &device_info_service, sig::model_number(), "ModelNumber").await?,
            serial_number: required_characteristic(&session, &device_info_service, sig::serial_number(), "SerialNumber").await?,
            hardware_revision: required_characteristic(&session, &device_info_service, sig::hardware_revision(), "HardwareRevision").await?,
            firmware_revision: required_characteristic(&session, &device_info_service, sig::firmware_revision(), "FirmwareRevision").await?,
            software_revision: required_characteristic(&session, &device_info_service, sig::software_revision(), "SoftwareRevision").await?,
            system_id: optional_characteristic(&session, &device_info_service, sig::system_id()).await,
            pnp_id: required_characteristic(&session, &device_info_service, sig::pnp_id(), "PnPID").await?,
        },
    );

    let battery_service = find_service(&session, device, sig::battery_service()).await
        .ok_or_else(|| missing_required_service("Battery"))?;
    let battery = BatteryService::new(
        session.clone(),
        required_characteristic(&session, &battery_service, sig::battery_level(), "BatteryLevel").await?,
    );

    let find_me_service = find_service(&session, device, sig::immediate_alert_service()).await
        .ok_or_else(|| missing_required_service("ImmediateAlert"))?;
    let find_me = FindMeService::new(
        session.clone(),
        required_characteristic(&session, &find_me_service, sig::alert_level(), "AlertLevel").await?,
    );

    let audio_service = find_service(&session, device, vendor::audio_service()).await
        .ok_or_else(|| missing_required_service("Audio"))?;
    let audio = AudioService::new(
        session.clone(),
        required_characteristic(&session, &audio_service, vendor::audio_codecs(), "AudioCodecs").await?,
        required_characteristic(&session, &audio_service, vendor::audio_gain(), "AudioGain").await?,
        required_characteristic(&session, &audio_service, vendor::audio_control(), "AudioControl").await?,
        required_characteristic(&session, &audio_service, vendor::audio_data(), "AudioData").await?,
    );

    let infrared_service = find_service(&session, device, vendor::infrared_service()).await
        .ok_or_else(|| missing_required_service("Infrared"))?;
    let code_id = required_characteristic(&session, &infrared_service, vendor::ir_code_id(), "IrCodeId").await?;
    let standby = optional_characteristic(&session, &infrared_service, vendor::ir_standby()).await;
    let emit_ir = required_characteristic(&session, &infrared_service, vendor::ir_emit(), "IrEmit").await?;
    let mut slots = Vec::new();
    for index in 0..crate::uuids::IR_SIGNAL_SLOT_COUNT {
        if let Some(slot_characteristic) = optional_characteristic(
            &session,
            &infrared_service,
            vendor::ir_signal_slot(index as u16),
        )
        .await
        {
            if let Some(bundle) = descriptors_for(
                &session,
                &slot_characteristic,
                vendor::ir_signal_reference(),
                vendor::ir_signal_configuration(),
            )
            .await
            {
                slots.push(bundle);
            }
        }
    }
    let infrared = InfraredService::new(
        session.clone(),
        InfraredCharacteristics { code_id, standby, emit_ir, slots },
        config.default_ir_touch_mode,
        ir_database,
    );

    let upgrade_service = find_service(&session, device, vendor::upgrade_service()).await
        .ok_or_else(|| missing_required_service("Upgrade"))?;
    let firmware_packet = required_characteristic(&session, &upgrade_service, vendor::firmware_packet(), "FirmwarePacket").await?;
    let window_size_descriptor = session
        .get_descriptors(&firmware_packet)
        .await
        .unwrap_or_default()
        .into_iter()
        .find(|d| d.uuid == vendor::firmware_packet_window_size())
        .map(|d| d.id);
    let upgrade = UpgradeService::new(
        session.clone(),
        required_characteristic(&session, &upgrade_service, vendor::firmware_control_point(), "FirmwareControlPoint").await?,
        firmware_packet,
        window_size_descriptor,
        config.strict_hardware_match,
    );

    let remote_control = match find_service(&session, device, vendor::remote_control_service()).await {
        Some(remote_control_service) => Some(RemoteControlService::new(
            session.clone(),
            RemoteControlCharacteristics {
                unpair_reason: required_characteristic(&session, &remote_control_service, vendor::rcu_unpair_reason(), "RcuUnpairReason").await?,
                reboot_reason: required_characteristic(&session, &remote_control_service, vendor::rcu_reboot_reason(), "RcuRebootReason").await?,
                rcu_action: required_characteristic(&session, &remote_control_service, vendor::rcu_action(), "RcuAction").await?,
                last_keypress: optional_characteristic(&session, &remote_control_service, vendor::rcu_last_keypress()).await,
                advertising_config: optional_characteristic(&session, &remote_control_service, vendor::rcu_advertising_config()).await,
                advertising_config_custom_list: optional_characteristic(&session, &remote_control_service, vendor::rcu_advertising_config_custom_list()).await,
            },
        )),
        None => None,
    };

    Ok(ServicesAggregator::new(
        device_info,
        battery,
        find_me,
        audio,
        infrared,
        upgrade,
        remote_control,
    ))
}
