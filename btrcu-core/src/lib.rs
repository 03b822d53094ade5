//! Per-device orchestration, GATT service translation and the OTA upgrade protocol for a BLE
//! remote-control host daemon.

pub mod adapter;
pub mod aggregator;
pub mod device;
pub mod error;
pub mod firmware;
pub mod gatt_shim;
pub mod ir_database;
pub mod orchestrator;
pub mod profile;
pub mod recovery;
pub mod services;
pub mod uuids;

pub use adapter::BluetoothAdapter;
pub use aggregator::ServicesAggregator;
pub use device::DeviceRecord;
pub use error::{BlercuError, BlercuResult};
pub use orchestrator::{DeviceOrchestrator, OrchestratorEvent, OrchestratorNotification};
pub use profile::{bind_services_aggregator, DeviceProfileConfig};
pub use recovery::{RecoveryBus, RecoveryEvent};
