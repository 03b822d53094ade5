//! Generated async D-Bus bindings for talking to BlueZ on Linux.
//!
//! These are hand-maintained in the same shape `dbus-codegen-rust` would produce, so that
//! regenerating them from the upstream `org.bluez.*` introspection XML stays a drop-in
//! replacement rather than a rewrite.

mod adapter1;
mod device1;
mod gattcharacteristic1;
mod gattdescriptor1;
mod gattservice1;

pub use adapter1::{OrgBluezAdapter1, OrgBluezAdapter1Properties, ORG_BLUEZ_ADAPTER1_NAME};
pub use device1::{OrgBluezDevice1, OrgBluezDevice1Properties, ORG_BLUEZ_DEVICE1_NAME};
pub use gattcharacteristic1::{
    OrgBluezGattCharacteristic1, OrgBluezGattCharacteristic1Properties,
    ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME,
};
pub use gattdescriptor1::{
    OrgBluezGattDescriptor1, OrgBluezGattDescriptor1Properties, ORG_BLUEZ_GATT_DESCRIPTOR1_NAME,
};
pub use gattservice1::{
    OrgBluezGattService1, OrgBluezGattService1Properties, ORG_BLUEZ_GATT_SERVICE1_NAME,
};
