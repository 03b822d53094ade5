use regex::Regex;
use serde_derive::Deserialize;
use stable_eyre::eyre::{Report, WrapErr};
use std::fs::read_to_string;
use std::path::PathBuf;

const CONFIG_FILENAME: &str = "btrcu.toml";

const DEFAULT_SCAN_INTERVAL_SECS: u64 = 20;
const DEFAULT_PAIRABLE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_IR_TOUCH_MODE: u8 = 0;
const DEFAULT_IPC_EVENT_CAPACITY: usize = 64;
const DEFAULT_IR_CATALOG: &str = "/etc/btrcu/ir-catalog.toml";
const DEFAULT_IR_WAVEFORMS: &str = "/etc/btrcu/ir-waveforms";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bluetooth: BluetoothConfig,
    pub upgrade: UpgradeConfig,
    pub ir: IrConfig,
    pub ipc: IpcConfig,
    /// Known vendor models (§6.4), narrowing which advertising devices are treated as
    /// candidates and overriding their default IR touch mode. Empty means "accept anything
    /// advertising the remote-control or upgrade service", the daemon's original behaviour.
    #[serde(default)]
    pub vendor_models: Vec<VendorModel>,
}

impl Config {
    pub fn from_file() -> Result<Config, Report> {
        let config_file =
            read_to_string(CONFIG_FILENAME).wrap_err_with(|| format!("Reading {}", CONFIG_FILENAME))?;
        Ok(toml::from_str(&config_file)?)
    }
}

/// Which adapter to drive, and how aggressively to scan for and accept pairing from remotes.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// The BlueZ adapter id (e.g. `"hci0"`) to use. Defaults to the first adapter BlueZ reports.
    pub adapter: Option<String>,
    pub scan_interval_secs: u64,
    pub pairable_timeout_secs: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        BluetoothConfig {
            adapter: None,
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            pairable_timeout_secs: DEFAULT_PAIRABLE_TIMEOUT_SECS,
        }
    }
}

/// Policy knobs for the OTA upgrade protocol (§4.6, §9).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Whether to refuse an upgrade image whose hardware id doesn't match the connected device.
    pub strict_hardware_match: bool,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        UpgradeConfig {
            strict_hardware_match: true,
        }
    }
}

/// The IR signal database (§6.4) and the touch-mode a newly bound device starts with.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IrConfig {
    pub default_touch_mode: u8,
    pub catalog_path: PathBuf,
    pub waveform_dir: PathBuf,
}

impl Default for IrConfig {
    fn default() -> Self {
        IrConfig {
            default_touch_mode: DEFAULT_IR_TOUCH_MODE,
            catalog_path: PathBuf::from(DEFAULT_IR_CATALOG),
            waveform_dir: PathBuf::from(DEFAULT_IR_WAVEFORMS),
        }
    }
}

/// Tuning for the local IPC projection (§6.3, §10.4).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub event_capacity: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        IpcConfig {
            event_capacity: DEFAULT_IPC_EVENT_CAPACITY,
        }
    }
}

/// One entry in the supported-remote-control-models allow-list (§6.4): an OUI (the MAC
/// address's first three octets, formatted like `"AA:BB:CC"`), a regex the advertised name
/// must match, a default IR touch mode for remotes of this model, and whether the model is
/// currently enabled.
#[derive(Clone, Debug, Deserialize)]
pub struct VendorModel {
    pub name: String,
    pub oui: Option<String>,
    pub scan_name_regex: Option<String>,
    pub default_touch_mode: u8,
    #[serde(default = "VendorModel::default_enabled")]
    pub enabled: bool,
}

impl VendorModel {
    fn default_enabled() -> bool {
        true
    }

    /// Whether `mac` and `advertised_name` satisfy this entry's OUI and name-regex filters.
    /// An absent filter matches anything; a present filter that fails to compile matches
    /// nothing, since a config typo should never silently accept unintended devices.
    pub fn matches(&self, mac_oui: &str, advertised_name: Option<&str>) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(oui) = &self.oui {
            if !oui.eq_ignore_ascii_case(mac_oui) {
                return false;
            }
        }
        if let Some(pattern) = &self.scan_name_regex {
            let Some(name) = advertised_name else { return false };
            match Regex::new(pattern) {
                Ok(re) => {
                    if !re.is_match(name) {
                        return false;
                    }
                }
                Err(_) => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> VendorModel {
        VendorModel {
            name: "Acme Remote".to_string(),
            oui: Some("AA:BB:CC".to_string()),
            scan_name_regex: Some("^Acme-".to_string()),
            default_touch_mode: 2,
            enabled: true,
        }
    }

    #[test]
    fn matches_when_oui_and_name_both_satisfy_filters() {
        assert!(model().matches("AA:BB:CC", Some("Acme-RC1")));
    }

    #[test]
    fn rejects_wrong_oui() {
        assert!(!model().matches("11:22:33", Some("Acme-RC1")));
    }

    #[test]
    fn rejects_non_matching_name() {
        assert!(!model().matches("AA:BB:CC", Some("SomethingElse")));
    }

    #[test]
    fn rejects_missing_name_when_regex_filter_present() {
        assert!(!model().matches("AA:BB:CC", None));
    }

    #[test]
    fn disabled_model_never_matches() {
        let mut disabled = model();
        disabled.enabled = false;
        assert!(!disabled.matches("AA:BB:CC", Some("Acme-RC1")));
    }

    #[test]
    fn absent_filters_match_anything() {
        let open = VendorModel {
            name: "Any".to_string(),
            oui: None,
            scan_name_regex: None,
            default_touch_mode: 0,
            enabled: true,
        };
        assert!(open.matches("11:22:33", None));
    }
}
