//! Local IPC projection of a bound remote-control device (§6.3): a per-device broadcast of
//! property changes plus a command channel for inbound `set`/`call` requests, replacing the
//! MQTT wire format an IPC frontend would otherwise need.

pub mod types;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

pub use types::{Datatype, Node, Property};

const DEFAULT_EVENT_CAPACITY: usize = 64;

/// An update to a device's projected state, broadcast to every subscriber.
#[derive(Clone, Debug)]
pub enum DeviceEvent {
    /// A node was added to the device (e.g. a sub-service finished binding).
    NodeAdded(Node),
    /// A node was removed (e.g. its sub-service was torn down).
    NodeRemoved(String),
    /// A property's value changed.
    PropertyChanged {
        node_id: String,
        property_id: String,
        value: String,
    },
}

/// Invoked for an inbound `set` on a settable property. Returns `Some(error)` to reject the
/// write, or `None` to accept it.
pub type UpdateCallback = Box<
    dyn FnMut(String, String, String) -> Pin<Box<dyn Future<Output = Option<String>> + Send>>
        + Send,
>;

/// Invoked for an inbound method call (§6.3, e.g. `StartAudioStreaming`, `FindMe`). Returns the
/// method's result payload, or an error message.
pub type MethodCallback = Box<
    dyn FnMut(String, Vec<String>) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>>
        + Send,
>;

enum Command {
    Set {
        node_id: String,
        property_id: String,
        value: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Call {
        method: String,
        args: Vec<String>,
        reply: oneshot::Sender<Result<String, String>>,
    },
}

/// Builds a [`Device`]/[`DeviceHandle`] pair and the dispatch task that connects the handle's
/// commands to the registered callbacks.
pub struct DeviceBuilder {
    device_id: String,
    device_name: String,
    event_capacity: usize,
    update_callback: Option<UpdateCallback>,
    method_callback: Option<MethodCallback>,
}

impl DeviceBuilder {
    fn new(device_id: &str, device_name: &str) -> Self {
        DeviceBuilder {
            device_id: device_id.to_owned(),
            device_name: device_name.to_owned(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            update_callback: None,
            method_callback: None,
        }
    }

    /// Registers the callback invoked for inbound property writes.
    pub fn set_update_callback<F, Fut>(&mut self, mut callback: F)
    where
        F: (FnMut(String, String, String) -> Fut) + Send + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.update_callback = Some(Box::new(move |node_id, property_id, value| {
            Box::pin(callback(node_id, property_id, value))
        }));
    }

    /// Registers the callback invoked for inbound method calls.
    pub fn set_method_callback<F, Fut>(&mut self, mut callback: F)
    where
        F: (FnMut(String, Vec<String>) -> Fut) + Send + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        self.method_callback = Some(Box::new(move |method, args| Box::pin(callback(method, args))));
    }

    /// Overrides the broadcast channel's lagging-subscriber buffer size.
    pub fn set_event_capacity(&mut self, capacity: usize) {
        self.event_capacity = capacity;
    }

    /// Builds the device and spawns its command dispatch task.
    pub fn spawn(self) -> (Device, DeviceHandle, JoinHandle<()>) {
        let (events_tx, _) = broadcast::channel(self.event_capacity);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let device = Device {
            device_id: self.device_id.clone(),
            device_name: self.device_name,
            events_tx: events_tx.clone(),
            nodes: Mutex::new(Vec::new()),
        };
        let handle = DeviceHandle {
            device_id: self.device_id,
            events_tx,
            command_tx,
        };
        let dispatch_task = spawn_dispatch_task(command_rx, self.update_callback, self.method_callback);
        (device, handle, dispatch_task)
    }
}

/// A bound remote-control device's IPC projection: its node/property tree and the event
/// broadcast subscribers see. Owned by the code that binds the device (the orchestrator side);
/// [`DeviceHandle`] is the client-facing counterpart handed out to IPC frontends.
pub struct Device {
    device_id: String,
    device_name: String,
    events_tx: broadcast::Sender<DeviceEvent>,
    nodes: Mutex<Vec<Node>>,
}

impl Device {
    pub fn builder(device_id: &str, device_name: &str) -> DeviceBuilder {
        DeviceBuilder::new(device_id, device_name)
    }

    pub fn id(&self) -> &str {
        &self.device_id
    }

    pub fn name(&self) -> &str {
        &self.device_name
    }

    /// Adds a node to the device's projection and broadcasts its arrival.
    ///
    /// # Panics
    /// Panics if a node with the same id is already present.
    pub async fn add_node(&self, node: Node) {
        let mut nodes = self.nodes.lock().await;
        if nodes.iter().any(|n| n.id == node.id) {
            panic!("Tried to add node with duplicate ID: {:?}", node.id);
        }
        nodes.push(node.clone());
        let _ = self.events_tx.send(DeviceEvent::NodeAdded(node));
    }

    /// Removes a node from the device's projection and broadcasts its removal.
    ///
    /// # Panics
    /// Panics if no node with that id is present.
    pub async fn remove_node(&self, node_id: &str) {
        let mut nodes = self.nodes.lock().await;
        let index = nodes
            .iter()
            .position(|n| n.id == node_id)
            .unwrap_or_else(|| panic!("Tried to remove unknown node ID: {:?}", node_id));
        nodes.remove(index);
        let _ = self.events_tx.send(DeviceEvent::NodeRemoved(node_id.to_owned()));
    }

    pub async fn nodes(&self) -> Vec<Node> {
        self.nodes.lock().await.clone()
    }

    /// Broadcasts a property value change. A no-op if nobody is currently subscribed.
    pub fn publish_value(&self, node_id: &str, property_id: &str, value: impl ToString) {
        if self.events_tx.receiver_count() > 0 {
            let _ = self.events_tx.send(DeviceEvent::PropertyChanged {
                node_id: node_id.to_owned(),
                property_id: property_id.to_owned(),
                value: value.to_string(),
            });
        }
    }
}

/// The client-facing counterpart of [`Device`]: subscribes to its event broadcast and issues
/// `set`/`call` commands, resolved asynchronously by the dispatch task spawned alongside it.
#[derive(Clone)]
pub struct DeviceHandle {
    device_id: String,
    events_tx: broadcast::Sender<DeviceEvent>,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl DeviceHandle {
    pub fn id(&self) -> &str {
        &self.device_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events_tx.subscribe()
    }

    /// Issues an inbound property write, resolved by the registered [`UpdateCallback`]. Returns
    /// `Some(error)` if the write was rejected or the dispatch task is gone.
    pub async fn set(
        &self,
        node_id: impl Into<String>,
        property_id: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        let (reply, reply_rx) = oneshot::channel();
        let command = Command::Set {
            node_id: node_id.into(),
            property_id: property_id.into(),
            value: value.into(),
            reply,
        };
        if self.command_tx.send(command).is_err() {
            return Some("device dispatch task is no longer running".to_owned());
        }
        reply_rx
            .await
            .unwrap_or_else(|_| Some("device dispatch task dropped the request".to_owned()))
    }

    /// Issues an inbound method call, resolved by the registered [`MethodCallback`].
    pub async fn call(&self, method: impl Into<String>, args: Vec<String>) -> Result<String, String> {
        let (reply, reply_rx) = oneshot::channel();
        let command = Command::Call {
            method: method.into(),
            args,
            reply,
        };
        if self.command_tx.send(command).is_err() {
            return Err("device dispatch task is no longer running".to_owned());
        }
        reply_rx
            .await
            .unwrap_or_else(|_| Err("device dispatch task dropped the request".to_owned()))
    }
}

fn spawn_dispatch_task(
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    mut update_callback: Option<UpdateCallback>,
    mut method_callback: Option<MethodCallback>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            match command {
                Command::Set {
                    node_id,
                    property_id,
                    value,
                    reply,
                } => {
                    let result = match update_callback.as_mut() {
                        Some(callback) => callback(node_id, property_id, value).await,
                        None => Some("no property update handler registered".to_owned()),
                    };
                    let _ = reply.send(result);
                }
                Command::Call { method, args, reply } => {
                    let result = match method_callback.as_mut() {
                        Some(callback) => callback(method, args).await,
                        None => Err("no method handler registered".to_owned()),
                    };
                    let _ = reply.send(result);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery_node() -> Node {
        Node::new(
            "battery",
            "Battery",
            "battery",
            vec![Property::new("level", "Level", Datatype::Integer, false, Some("%"), None)],
        )
    }

    #[tokio::test]
    async fn add_and_remove_node_broadcasts_events() {
        let (device, _handle, _task) = Device::builder("rcu1", "Remote Control").spawn();
        let mut events = device.events_tx.subscribe();

        device.add_node(battery_node()).await;
        match events.recv().await.unwrap() {
            DeviceEvent::NodeAdded(node) => assert_eq!(node.id, "battery"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(device.nodes().await.len(), 1);

        device.remove_node("battery").await;
        match events.recv().await.unwrap() {
            DeviceEvent::NodeRemoved(id) => assert_eq!(id, "battery"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(device.nodes().await.is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "duplicate ID")]
    async fn add_node_rejects_duplicate_id() {
        let (device, _handle, _task) = Device::builder("rcu1", "Remote Control").spawn();
        device.add_node(battery_node()).await;
        device.add_node(battery_node()).await;
    }

    #[tokio::test]
    async fn publish_value_broadcasts_to_subscribers() {
        let (device, handle, _task) = Device::builder("rcu1", "Remote Control").spawn();
        let mut events = handle.subscribe();

        device.publish_value("battery", "level", 42);
        match events.recv().await.unwrap() {
            DeviceEvent::PropertyChanged {
                node_id,
                property_id,
                value,
            } => {
                assert_eq!(node_id, "battery");
                assert_eq!(property_id, "level");
                assert_eq!(value, "42");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn set_routes_through_update_callback() {
        let mut builder = Device::builder("rcu1", "Remote Control");
        builder.set_update_callback(|node_id, property_id, value| async move {
            if node_id == "audio" && property_id == "gain" && value.parse::<u8>().is_ok() {
                None
            } else {
                Some("rejected".to_owned())
            }
        });
        let (_device, handle, _task) = builder.spawn();

        assert_eq!(handle.set("audio", "gain", "50").await, None);
        assert_eq!(handle.set("audio", "gain", "not-a-number").await, Some("rejected".to_owned()));
    }

    #[tokio::test]
    async fn set_without_callback_is_rejected() {
        let (_device, handle, _task) = Device::builder("rcu1", "Remote Control").spawn();
        assert!(handle.set("audio", "gain", "50").await.is_some());
    }

    #[tokio::test]
    async fn call_routes_through_method_callback() {
        let mut builder = Device::builder("rcu1", "Remote Control");
        builder.set_method_callback(|method, _args| async move {
            if method == "FindMe" {
                Ok("started".to_owned())
            } else {
                Err("unknown method".to_owned())
            }
        });
        let (_device, handle, _task) = builder.spawn();

        assert_eq!(handle.call("FindMe", vec![]).await, Ok("started".to_owned()));
        assert_eq!(handle.call("Bogus", vec![]).await, Err("unknown method".to_owned()));
    }

    #[tokio::test]
    async fn dispatch_task_exits_once_all_handles_are_dropped() {
        let (_device, handle, task) = Device::builder("rcu1", "Remote Control").spawn();
        drop(handle);
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("dispatch task should exit promptly")
            .expect("dispatch task should not panic");
    }
}
