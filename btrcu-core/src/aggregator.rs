//! Owns one instance of each sub-service and walks them through a fixed linear startup
//! sequence (§4.3), proceeding to the next only once the current one reports ready.

use crate::error::{BlercuError, BlercuResult};
use crate::services::audio::AudioService;
use crate::services::battery::BatteryService;
use crate::services::device_info::DeviceInfoService;
use crate::services::findme::FindMeService;
use crate::services::infrared::InfraredService;
use crate::services::remote_control::RemoteControlService;
use crate::services::upgrade::UpgradeService;

/// Owns the device's seven sub-services and starts/stops them in a fixed order: DeviceInfo,
/// Battery, FindMe, Audio, Infrared, Upgrade, RemoteControl are required; only RemoteControl is
/// allowed to be absent from the device's GATT profile.
pub struct ServicesAggregator {
    pub device_info: DeviceInfoService,
    pub battery: BatteryService,
    pub find_me: FindMeService,
    pub audio: AudioService,
    pub infrared: InfraredService,
    pub upgrade: UpgradeService,
    pub remote_control: Option<RemoteControlService>,
}

impl ServicesAggregator {
    pub fn new(
        device_info: DeviceInfoService,
        battery: BatteryService,
        find_me: FindMeService,
        audio: AudioService,
        infrared: InfraredService,
        upgrade: UpgradeService,
        remote_control: Option<RemoteControlService>,
    ) -> Self {
        ServicesAggregator {
            device_info,
            battery,
            find_me,
            audio,
            infrared,
            upgrade,
            remote_control,
        }
    }

    /// Start every sub-service in order, stopping at (and failing with) the first required
    /// sub-service that cannot reach its ready state. The optional RemoteControl service's
    /// readiness is synthesised immediately if it is absent.
    pub async fn start(&self) -> BlercuResult<()> {
        log::debug!("aggregator: starting DeviceInfo");
        self.device_info.start().await?;
        log::debug!("aggregator: starting Battery");
        self.battery.start().await?;
        log::debug!("aggregator: starting FindMe");
        self.find_me.start().await?;
        log::debug!("aggregator: starting Audio");
        self.audio.start().await?;
        log::debug!("aggregator: starting Infrared");
        self.infrared.start().await?;
        log::debug!("aggregator: starting Upgrade");
        self.upgrade.start().await?;
        if let Some(remote_control) = &self.remote_control {
            log::debug!("aggregator: starting RemoteControl");
            remote_control.start().await?;
        } else {
            log::debug!("aggregator: RemoteControl service UUID absent, synthesising ready");
        }
        Ok(())
    }

    /// Stop every sub-service that was started, in reverse order. Best-effort: a single
    /// sub-service's stop failure is logged and does not prevent stopping the rest.
    pub async fn stop(&self) {
        if let Some(remote_control) = &self.remote_control {
            remote_control.stop().await;
        }
        self.upgrade.stop().await;
        self.infrared.stop().await;
        self.audio.stop().await;
        self.find_me.stop().await;
        self.battery.stop().await;
        self.device_info.stop().await;
    }
}

pub(crate) fn missing_required_service(name: &'static str) -> BlercuError {
    BlercuError::General(format!("required GATT service '{name}' not found on device"))
}
