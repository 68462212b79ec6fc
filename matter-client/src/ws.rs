//! WebSocket client for the Matter controller
//!
//! Speaks the controller's JSON-over-WebSocket API: requests carry a
//! `message_id` and are answered with a matching `result` (or error)
//! message; unsolicited `event` messages report node and attribute
//! changes. The client keeps a local node cache in sync from those
//! events and collapses every mutation into a single "something changed"
//! broadcast - consumers never see the controller's event vocabulary.
//!
//! # Example
//!
//! ```rust,ignore
//! use matter_client::{MeshClient, WsClient, WsConfig};
//!
//! let client = WsClient::connect(WsConfig::new("ws://127.0.0.1:5581/ws")).await?;
//! let mut changed = client.subscribe_changes();
//!
//! while changed.recv().await.is_ok() {
//!     println!("{} nodes known", client.nodes().len());
//! }
//! ```

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::client::MeshClient;
use crate::error::{ClientError, Result};
use crate::model::{DeviceCommand, EndpointId, Node, NodeId};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Connection configuration for [`WsClient`].
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Controller WebSocket URL, e.g. `ws://127.0.0.1:5581/ws`.
    pub url: String,
    /// Connection attempts before giving up. The controller subprocess
    /// takes a few seconds to come up after spawn.
    pub connect_attempts: u32,
    /// Delay between connection attempts.
    pub retry_delay: Duration,
    /// How long to wait for the controller to answer a request.
    pub request_timeout: Duration,
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_attempts: 15,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared state between the client handle and its reader task.
struct Inner {
    nodes: RwLock<HashMap<NodeId, Node>>,
    connected: AtomicBool,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
    next_id: AtomicU64,
    outbound: mpsc::UnboundedSender<Message>,
    changed: broadcast::Sender<()>,
    request_timeout: Duration,
}

impl Inner {
    fn notify_changed(&self) {
        // No receivers yet is fine - the first rebuild happens at startup.
        let _ = self.changed.send(());
    }
}

/// WebSocket implementation of [`MeshClient`].
pub struct WsClient {
    inner: Arc<Inner>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    reader: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WsClient {
    /// Connect to the controller with bounded retry, start listening, and
    /// populate the node cache from the initial listen result.
    pub async fn connect(config: WsConfig) -> Result<Self> {
        let url = Url::parse(&config.url)?;

        let mut last_err = String::from("no attempts made");
        let mut attempt = 0;
        let stream = loop {
            attempt += 1;
            match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((stream, _resp)) => break stream,
                Err(e) => {
                    last_err = e.to_string();
                    if attempt >= config.connect_attempts {
                        return Err(ClientError::Connect {
                            url: config.url.clone(),
                            reason: last_err,
                        });
                    }
                    tracing::debug!(
                        "controller not ready (attempt {attempt}/{}): {last_err}",
                        config.connect_attempts
                    );
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        };

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (changed_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let inner = Arc::new(Inner {
            nodes: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            outbound: outbound_tx,
            changed: changed_tx,
            request_timeout: config.request_timeout,
        });

        // Writer: drains the outbound queue into the socket.
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    tracing::warn!("controller send failed: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: resolves pending requests and applies events until the
        // socket closes or shutdown is requested.
        let reader_inner = inner.clone();
        let reader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("controller session shutting down");
                        break;
                    }
                    msg = source.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                reader_inner.handle_message(&text);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::warn!("controller closed the session");
                                break;
                            }
                            Some(Ok(_)) => {} // ping/pong handled by tungstenite
                            Some(Err(e)) => {
                                tracing::warn!("controller receive failed: {e}");
                                break;
                            }
                        }
                    }
                }
            }
            reader_inner.connected.store(false, Ordering::SeqCst);
            // Fail anything still waiting for an answer.
            for (_, tx) in reader_inner.pending.lock().drain() {
                let _ = tx.send(Err(ClientError::NotConnected));
            }
        });

        let client = Self {
            inner,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            reader: Mutex::new(Some(reader)),
        };

        client.start_listening().await?;
        Ok(client)
    }

    /// Subscribe to the change signal. One message per mesh mutation; a
    /// lagged receiver should simply treat the lag as "changed".
    pub fn subscribe_changes(&self) -> broadcast::Receiver<()> {
        self.inner.changed.subscribe()
    }

    /// Close the session and wait for the reader task to finish.
    pub async fn close(&self) {
        let tx = self.shutdown_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(()).await;
        }
        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    /// Ask the controller to stream node updates and seed the cache from
    /// the full node list it returns.
    async fn start_listening(&self) -> Result<()> {
        let result = self.request("start_listening", None).await?;
        let nodes = result
            .as_array()
            .ok_or_else(|| ClientError::Protocol("listen result is not an array".into()))?;

        let mut cache = HashMap::new();
        for wire in nodes {
            if let Some(node) = decode_wire_node(wire) {
                cache.insert(node.node_id, node);
            }
        }
        tracing::info!("listening: {} nodes known", cache.len());
        *self.inner.nodes.write() = cache;
        self.inner.notify_changed();
        Ok(())
    }

    /// Send a request and wait for its matching result message.
    async fn request(&self, command: &str, args: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);

        let mut msg = json!({
            "message_id": id.to_string(),
            "command": command,
        });
        if let Some(args) = args {
            msg["args"] = args;
        }

        self.inner
            .outbound
            .send(Message::Text(msg.to_string().into()))
            .map_err(|_| ClientError::NotConnected)?;

        match tokio::time::timeout(self.inner.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::NotConnected),
            Err(_) => {
                self.inner.pending.lock().remove(&id);
                Err(ClientError::Timeout)
            }
        }
    }
}

#[async_trait]
impl MeshClient for WsClient {
    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn nodes(&self) -> Vec<Node> {
        self.inner.nodes.read().values().cloned().collect()
    }

    async fn send_device_command(
        &self,
        node: NodeId,
        endpoint: EndpointId,
        command: DeviceCommand,
    ) -> Result<()> {
        let args = json!({
            "node_id": node,
            "endpoint_id": endpoint,
            "cluster_id": command.cluster_id(),
            "command_name": command.name(),
            "payload": command.payload(),
        });
        self.request("device_command", Some(args)).await?;
        Ok(())
    }

    async fn commission(&self, code: &str, ip: Option<IpAddr>) -> Result<()> {
        match ip {
            Some(ip) => {
                let args = json!({ "code": code, "ip_addr": ip.to_string() });
                self.request("commission_on_network", Some(args)).await?;
            }
            None => {
                let args = json!({ "code": code });
                self.request("commission_with_code", Some(args)).await?;
            }
        }
        Ok(())
    }
}

impl Inner {
    /// Decode one message from the controller and act on it.
    fn handle_message(&self, text: &str) {
        let msg: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("undecodable controller message: {e}");
                return;
            }
        };

        if let Some(event) = msg.get("event").and_then(Value::as_str) {
            self.handle_event(event, msg.get("data").unwrap_or(&Value::Null));
            return;
        }

        let Some(id) = msg
            .get("message_id")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<u64>().ok())
        else {
            // Server-info greeting and other unsolicited chatter.
            return;
        };

        let Some(tx) = self.pending.lock().remove(&id) else {
            tracing::debug!("response for unknown request {id}");
            return;
        };

        let outcome = if let Some(code) = msg.get("error_code").and_then(Value::as_i64) {
            Err(ClientError::Command {
                code,
                message: msg
                    .get("details")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown controller error")
                    .to_string(),
            })
        } else {
            Ok(msg.get("result").cloned().unwrap_or(Value::Null))
        };
        let _ = tx.send(outcome);
    }

    fn handle_event(&self, event: &str, data: &Value) {
        match event {
            "attribute_updated" => {
                // data = [node_id, "ep/cluster/attr", value]
                let Some(parts) = data.as_array() else { return };
                let (Some(node_id), Some(path)) = (
                    parts.first().and_then(Value::as_u64),
                    parts.get(1).and_then(Value::as_str),
                ) else {
                    return;
                };
                let value = parts.get(2).cloned().unwrap_or(Value::Null);

                let mut nodes = self.nodes.write();
                nodes
                    .entry(node_id)
                    .or_insert_with(|| Node::new(node_id))
                    .set_attribute_path(path, value);
                drop(nodes);
                self.notify_changed();
            }
            "node_added" | "node_updated" => {
                if let Some(node) = decode_wire_node(data) {
                    self.nodes.write().insert(node.node_id, node);
                    self.notify_changed();
                }
            }
            "node_removed" => {
                if let Some(node_id) = data.as_u64() {
                    self.nodes.write().remove(&node_id);
                    self.notify_changed();
                }
            }
            other => {
                tracing::trace!("ignoring controller event {other}");
            }
        }
    }
}

/// Decode the controller's node representation: `{"node_id": N,
/// "attributes": {"ep/cluster/attr": value, ...}}`.
fn decode_wire_node(wire: &Value) -> Option<Node> {
    let node_id = wire.get("node_id")?.as_u64()?;
    let attributes = wire.get("attributes")?.as_object()?;
    Some(Node::from_wire(node_id, attributes))
}
