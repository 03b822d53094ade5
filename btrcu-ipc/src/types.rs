use std::fmt::Debug;

/// The data type of an IPC-projected property (§6.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Datatype {
    /// A 64-bit signed integer, used for battery level, touch mode and similar numeric fields.
    Integer,
    /// A 64-bit floating-point number.
    Float,
    /// A boolean value, e.g. `Connected` or `AudioStreaming`.
    Boolean,
    /// A UTF-8 encoded string, e.g. `Name` or `SerialNumber`.
    String,
    /// An enum value from a fixed set named by the property's `format`, e.g. `UnpairReason`.
    Enum,
}

impl Datatype {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Enum => "enum",
        }
    }
}

impl std::fmt::Display for Datatype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One property of a device node (§6.3), e.g. `BatteryLevel` on the device's root node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Property {
    /// The property's id. Must be unique per node.
    pub id: String,

    /// The human-readable name of the property.
    pub name: String,

    /// The data type of the property.
    pub datatype: Datatype,

    /// Whether the property accepts an inbound `set` request from an IPC client.
    pub settable: bool,

    /// The unit of the property, if any (e.g. `"%"` for `BatteryLevel`).
    pub unit: Option<String>,

    /// The format of the property, if any. Required for `Enum` properties (the comma-separated
    /// list of valid values).
    pub format: Option<String>,
}

impl Property {
    pub fn new(
        id: &str,
        name: &str,
        datatype: Datatype,
        settable: bool,
        unit: Option<&str>,
        format: Option<&str>,
    ) -> Property {
        Property {
            id: id.to_owned(),
            name: name.to_owned(),
            datatype,
            settable,
            unit: unit.map(|s| s.to_owned()),
            format: format.map(|s| s.to_owned()),
        }
    }
}

/// One node of a device's projection (§6.3). A device has exactly one node per sub-service
/// (`battery`, `audio`, `infrared`, ...).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    /// The node's id, unique per device.
    pub id: String,

    /// The human-readable name of the node.
    pub name: String,

    /// The type of the node. An arbitrary string naming the sub-service it represents.
    pub node_type: String,

    /// The properties of the node. There should be at least one.
    pub properties: Vec<Property>,
}

impl Node {
    pub fn new(id: &str, name: &str, node_type: &str, properties: Vec<Property>) -> Node {
        Node {
            id: id.to_owned(),
            name: name.to_owned(),
            node_type: node_type.to_owned(),
            properties,
        }
    }
}
