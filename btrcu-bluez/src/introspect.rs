use async_trait::async_trait;
use dbus::nonblock;
use dbus::nonblock::stdintf::org_freedesktop_dbus::Introspectable;
use serde_derive::Deserialize;

use crate::BluetoothError;

/// A child object path reported by a D-Bus introspection response.
#[derive(Clone, Debug, Deserialize)]
pub struct SubNode {
    #[serde(rename = "name")]
    pub name: Option<String>,
}

/// The parsed result of a D-Bus `Introspect()` call, restricted to the parts this crate uses:
/// the set of immediate child object paths.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(rename = "node")]
pub struct Node {
    #[serde(rename = "node", default)]
    pub nodes: Vec<SubNode>,
}

/// Convenience extension to call `Introspect()` and parse the resulting XML in one step.
#[async_trait]
pub(crate) trait IntrospectParse {
    async fn introspect_parse(&self) -> Result<Node, BluetoothError>;
}

#[async_trait]
impl<'a, T, C> IntrospectParse for nonblock::Proxy<'a, C>
where
    T: nonblock::NonblockReply + Sync,
    C: std::ops::Deref<Target = T> + Sync + Send,
{
    async fn introspect_parse(&self) -> Result<Node, BluetoothError> {
        let xml = self.introspect().await?;
        serde_xml_rs::from_str(&xml).map_err(BluetoothError::XmlParseError)
    }
}
