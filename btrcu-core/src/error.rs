use btrcu_async::PromiseDropped;
use btrcu_bluez::BluetoothError;
use thiserror::Error;

/// The closed error taxonomy surfaced by every async operation on a device's services, and over
/// the IPC boundary.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BlercuError {
    #[error("No error")]
    NoError,
    #[error("{0}")]
    General(String),
    #[error("Rejected: {0}")]
    Rejected(String),
    #[error("Busy: {0}")]
    Busy(String),
    #[error("I/O device error: {0}")]
    IoDevice(String),
    #[error("Invalid argument: {0}")]
    InvalidArg(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Bad format: {0}")]
    BadFormat(String),
    #[error("Invalid hardware: {0}")]
    InvalidHardware(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Timed out: {0}")]
    TimedOut(String),
}

impl BlercuError {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy(message.into())
    }
}

impl PromiseDropped for BlercuError {
    fn promise_dropped() -> Self {
        BlercuError::General("promise dropped".to_string())
    }
}

impl From<BluetoothError> for BlercuError {
    fn from(err: BluetoothError) -> Self {
        match err {
            BluetoothError::ServiceDiscoveryTimedOut => {
                BlercuError::TimedOut(err.to_string())
            }
            BluetoothError::DbusError(_) => BlercuError::IoDevice(err.to_string()),
            other => BlercuError::General(other.to_string()),
        }
    }
}

pub type BlercuResult<T> = Result<T, BlercuError>;
