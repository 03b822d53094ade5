use std::collections::HashMap;

use dbus::arg::{PropMap, RefArg, Variant};
use dbus::message::{MatchRule, SignalArgs};
use dbus::nonblock::stdintf::org_freedesktop_dbus::{
    ObjectManagerInterfacesAdded as InterfacesAdded,
    PropertiesPropertiesChanged as PropertiesChanged,
};
use dbus::{Message, Path};
use uuid::Uuid;

use crate::device::{convert_manufacturer_data, convert_service_data, convert_services};
use crate::{AdapterId, CharacteristicId, DeviceId};
use btrcu_bluez_generated::{ORG_BLUEZ_ADAPTER1_NAME, ORG_BLUEZ_DEVICE1_NAME};

const ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME: &str = "org.bluez.GattCharacteristic1";

/// Something that changed about a Bluetooth adapter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdapterEvent {
    Powered { powered: bool },
    Discovering { discovering: bool },
}

/// Something that changed about a Bluetooth device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeviceEvent {
    Connected { connected: bool },
    ServicesResolved,
    Rssi { rssi: i16 },
    ManufacturerData { manufacturer_data: HashMap<u16, Vec<u8>> },
    ServiceData { service_data: HashMap<Uuid, Vec<u8>> },
}

/// Something that changed about a GATT characteristic, most importantly a notified value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CharacteristicEvent {
    Value { value: Vec<u8> },
}

/// A single Bluetooth event, scoped to the adapter, device or characteristic it concerns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BluetoothEvent {
    Adapter { id: AdapterId, event: AdapterEvent },
    Device { id: DeviceId, event: DeviceEvent },
    Characteristic {
        id: CharacteristicId,
        event: CharacteristicEvent,
    },
}

impl BluetoothEvent {
    /// Build the D-Bus match rules which need to be registered to observe all events in scope,
    /// optionally restricted to signals whose object path is at or below `object`.
    pub(crate) fn match_rules(object: Option<Path<'static>>) -> Vec<MatchRule<'static>> {
        let mut properties_changed_rule = PropertiesChanged::match_rule(None, None).static_clone();
        let mut interfaces_added_rule = InterfacesAdded::match_rule(None, None).static_clone();
        if let Some(object) = object {
            properties_changed_rule.path_is_namespace = true;
            properties_changed_rule.path = Some(object.clone());
            interfaces_added_rule.path_is_namespace = true;
            interfaces_added_rule.path = Some(object);
        }
        vec![properties_changed_rule, interfaces_added_rule]
    }

    /// Convert a raw D-Bus signal into zero or more Bluetooth events.
    pub(crate) fn message_to_events(message: Message) -> Vec<BluetoothEvent> {
        let object_path = match message.path() {
            Some(path) => path.into_static(),
            None => return vec![],
        };
        if let Some(changed) = PropertiesChanged::from_message(&message) {
            Self::from_properties_changed(object_path, changed)
        } else if let Some(added) = InterfacesAdded::from_message(&message) {
            Self::from_interfaces_added(added)
        } else {
            vec![]
        }
    }

    fn from_properties_changed(
        object_path: Path<'static>,
        changed: PropertiesChanged,
    ) -> Vec<BluetoothEvent> {
        match changed.interface_name.as_str() {
            ORG_BLUEZ_ADAPTER1_NAME => adapter_events(AdapterId { object_path }, &changed.changed_properties),
            ORG_BLUEZ_DEVICE1_NAME => device_events(DeviceId { object_path }, &changed.changed_properties),
            ORG_BLUEZ_GATT_CHARACTERISTIC1_NAME => {
                characteristic_events(CharacteristicId { object_path }, &changed.changed_properties)
            }
            _ => vec![],
        }
    }

    fn from_interfaces_added(added: InterfacesAdded) -> Vec<BluetoothEvent> {
        added
            .interfaces
            .iter()
            .flat_map(|(interface, properties)| match interface.as_str() {
                ORG_BLUEZ_DEVICE1_NAME => device_events(
                    DeviceId {
                        object_path: added.object.clone(),
                    },
                    properties,
                ),
                _ => vec![],
            })
            .collect()
    }
}

fn adapter_events(id: AdapterId, changed_properties: &PropMap) -> Vec<BluetoothEvent> {
    let mut events = vec![];
    if let Some(powered) = prop::<bool>(changed_properties, "Powered") {
        events.push(BluetoothEvent::Adapter {
            id: id.clone(),
            event: AdapterEvent::Powered { powered },
        });
    }
    if let Some(discovering) = prop::<bool>(changed_properties, "Discovering") {
        events.push(BluetoothEvent::Adapter {
            id,
            event: AdapterEvent::Discovering { discovering },
        });
    }
    events
}

fn device_events(id: DeviceId, changed_properties: &PropMap) -> Vec<BluetoothEvent> {
    let mut events = vec![];
    if let Some(connected) = prop::<bool>(changed_properties, "Connected") {
        events.push(BluetoothEvent::Device {
            id: id.clone(),
            event: DeviceEvent::Connected { connected },
        });
    }
    if let Some(true) = prop::<bool>(changed_properties, "ServicesResolved") {
        events.push(BluetoothEvent::Device {
            id: id.clone(),
            event: DeviceEvent::ServicesResolved,
        });
    }
    if let Some(rssi) = prop::<i16>(changed_properties, "RSSI") {
        events.push(BluetoothEvent::Device {
            id: id.clone(),
            event: DeviceEvent::Rssi { rssi },
        });
    }
    if let Some(data) = changed_properties
        .get("ManufacturerData")
        .and_then(|v| v.0.as_any().downcast_ref::<HashMap<u16, Variant<Box<dyn RefArg>>>>())
    {
        events.push(BluetoothEvent::Device {
            id: id.clone(),
            event: DeviceEvent::ManufacturerData {
                manufacturer_data: convert_manufacturer_data(data),
            },
        });
    }
    if let Some(data) = changed_properties
        .get("ServiceData")
        .and_then(|v| v.0.as_any().downcast_ref::<PropMap>())
    {
        events.push(BluetoothEvent::Device {
            id,
            event: DeviceEvent::ServiceData {
                service_data: convert_service_data(data),
            },
        });
    }
    let _ = convert_services;
    events
}

fn characteristic_events(id: CharacteristicId, changed_properties: &PropMap) -> Vec<BluetoothEvent> {
    let mut events = vec![];
    if let Some(value) = changed_properties
        .get("Value")
        .and_then(|v| v.0.as_any().downcast_ref::<Vec<u8>>())
    {
        events.push(BluetoothEvent::Characteristic {
            id,
            event: CharacteristicEvent::Value {
                value: value.clone(),
            },
        });
    }
    events
}

fn prop<T: 'static + Clone>(properties: &PropMap, name: &str) -> Option<T> {
    properties
        .get(name)
        .and_then(|v| v.0.as_any().downcast_ref::<T>())
        .cloned()
}
