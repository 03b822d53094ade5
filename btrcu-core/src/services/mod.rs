//! The seven GATT-backed sub-services a device exposes, owned and sequenced by
//! [`crate::aggregator::ServicesAggregator`].

pub mod audio;
pub mod battery;
pub mod device_info;
pub mod findme;
pub mod infrared;
pub mod remote_control;
pub mod upgrade;
