//! WebSocket server for handling client connections
//!
//! The relay accepts WebSocket connections and handles protocol messages:
//! - EVENT: store signed events
//! - REQ: subscribe to events matching filters
//! - CLOSE: close a subscription
//!
//! Messages are JSON arrays. Each connection runs one task that owns its
//! subscription state and multiplexes inbound messages with the shared
//! broadcast channel in a single select loop.

use crate::error::{RelayError, Result};
use crate::store::{EventStore, StoredEvent};
use crate::subscription::{Filter, Subscription, SubscriptionManager};
use crate::validation;
use futures::{SinkExt, StreamExt};
use lodestar::Event;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Capacity of the shared event broadcast channel
const BROADCAST_CAPACITY: usize = 1024;

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address for the WebSocket server
    pub bind_addr: SocketAddr,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Maximum subscriptions per connection
    pub max_subscriptions: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7000)),
            max_message_size: 512 * 1024,
            max_subscriptions: 32,
        }
    }
}

/// Relay server
pub struct RelayServer {
    config: RelayConfig,
    store: Arc<RwLock<EventStore>>,
    broadcast_tx: broadcast::Sender<StoredEvent>,
}

impl RelayServer {
    /// Create a new relay server
    pub fn new(config: RelayConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            config,
            store: Arc::new(RwLock::new(EventStore::new())),
            broadcast_tx,
        }
    }

    /// Shared handle to the event store
    pub fn store(&self) -> Arc<RwLock<EventStore>> {
        Arc::clone(&self.store)
    }

    /// Subscribe to the event broadcast channel
    pub fn subscribe(&self) -> broadcast::Receiver<StoredEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Bind the configured address and serve connections
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Relay server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections on an already-bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let store = Arc::clone(&self.store);
                    let broadcast_tx = self.broadcast_tx.clone();
                    let max_message_size = self.config.max_message_size;
                    let max_subscriptions = self.config.max_subscriptions;

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(
                            stream,
                            addr,
                            store,
                            broadcast_tx,
                            max_message_size,
                            max_subscriptions,
                        )
                        .await
                        {
                            error!("Error handling connection from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    store: Arc<RwLock<EventStore>>,
    broadcast_tx: broadcast::Sender<StoredEvent>,
    max_message_size: usize,
    max_subscriptions: usize,
) -> Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| RelayError::WebSocket(e.to_string()))?;

    info!("WebSocket connection established: {}", addr);

    let (mut write, mut read) = ws_stream.split();
    let mut subscriptions = SubscriptionManager::new();
    let mut broadcast_rx = broadcast_tx.subscribe();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received message from {}: {}", addr, text);

                        if text.len() > max_message_size {
                            warn!("Message from {} exceeds size limit: {} > {}", addr, text.len(), max_message_size);
                            let notice = json!(["NOTICE", format!("Message too large: {} bytes (max: {})", text.len(), max_message_size)]);
                            let _ = write.send(Message::Text(notice.to_string())).await;
                            continue;
                        }

                        match serde_json::from_str::<Value>(&text) {
                            Ok(value) => {
                                let mut ctx = MessageContext {
                                    store: &store,
                                    subscriptions: &mut subscriptions,
                                    broadcast_tx: &broadcast_tx,
                                    max_subscriptions,
                                };
                                let responses = handle_message(&value, &mut ctx).await;

                                for response in responses {
                                    let response_text = serde_json::to_string(&response)?;
                                    if let Err(e) = write.send(Message::Text(response_text)).await {
                                        error!("Failed to send response to {}: {}", addr, e);
                                        return Ok(());
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("Invalid JSON from {}: {}", addr, e);
                                let notice = json!(["NOTICE", format!("Invalid JSON: {}", e)]);
                                let _ = write.send(Message::Text(notice.to_string())).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        debug!("Ping from {}", addr);
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            event = broadcast_rx.recv() => {
                match event {
                    Ok(stored) => {
                        // At most one EVENT per matching subscription; events
                        // covered by a subscription's backlog snapshot are
                        // filtered out by sequence
                        for sub_id in subscriptions.matches_any(&stored.event, stored.seq) {
                            let msg = json!(["EVENT", sub_id, &stored.event]);
                            if let Err(e) = write.send(Message::Text(msg.to_string())).await {
                                error!("Failed to send broadcast event to {}: {}", addr, e);
                                return Ok(());
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Broadcast receiver for {} lagged by {} events", addr, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }
        }
    }

    info!("Connection closed: {}", addr);
    Ok(())
}

/// Context for handling protocol messages
struct MessageContext<'a> {
    store: &'a RwLock<EventStore>,
    subscriptions: &'a mut SubscriptionManager,
    broadcast_tx: &'a broadcast::Sender<StoredEvent>,
    max_subscriptions: usize,
}

/// Handle a protocol message, returns the replies to send
async fn handle_message(msg: &Value, ctx: &mut MessageContext<'_>) -> Vec<Value> {
    let mut responses = Vec::new();

    let msg_array = match msg.as_array() {
        Some(arr) => arr,
        None => {
            responses.push(json!(["NOTICE", "Message must be an array"]));
            return responses;
        }
    };

    if msg_array.is_empty() {
        responses.push(json!(["NOTICE", "Empty message"]));
        return responses;
    }

    let msg_type = match msg_array[0].as_str() {
        Some(t) => t,
        None => {
            responses.push(json!(["NOTICE", "Invalid message type"]));
            return responses;
        }
    };

    match msg_type {
        "EVENT" => {
            // ["EVENT", <event JSON>]
            if msg_array.len() < 2 {
                responses.push(json!([
                    "NOTICE",
                    "invalid: EVENT message must have 2 elements"
                ]));
                return responses;
            }

            let event: Event = match serde_json::from_value(msg_array[1].clone()) {
                Ok(e) => e,
                Err(e) => {
                    warn!("Failed to parse event: {}", e);
                    responses.push(json!([
                        "NOTICE",
                        format!("invalid: failed to parse event: {}", e)
                    ]));
                    return responses;
                }
            };

            if let Err(e) = validation::validate_event(&event) {
                responses.push(json!(["OK", event.id.clone(), false, e.to_string()]));
                return responses;
            }

            let outcome = ctx.store.write().await.add(&event);

            // Duplicates and rejections must not reach subscribers again
            if let Some(seq) = outcome.seq {
                debug!("Stored event: {}", event.id);
                if let Err(e) = ctx.broadcast_tx.send(StoredEvent { seq, event }) {
                    debug!("No broadcast receivers: {}", e);
                }
            }

            responses.push(json!(["OK", outcome.id, outcome.accepted, outcome.message]));
        }
        "REQ" => {
            // ["REQ", <subscription_id>, <filters JSON>...]
            if msg_array.len() < 2 {
                responses.push(json!([
                    "NOTICE",
                    "invalid: REQ message must have at least 2 elements"
                ]));
                return responses;
            }

            let sub_id = match msg_array[1].as_str() {
                Some(id) => id,
                None => {
                    responses.push(json!(["NOTICE", "invalid: subscription ID must be string"]));
                    return responses;
                }
            };

            if let Err(e) = validation::validate_subscription_id(sub_id) {
                responses.push(json!(["NOTICE", e.to_string()]));
                return responses;
            }

            // Unparseable filters are dropped; an empty resulting list
            // keeps "match everything" semantics
            let mut filters = Vec::new();
            for filter_value in msg_array.iter().skip(2) {
                match serde_json::from_value::<Filter>(filter_value.clone()) {
                    Ok(f) => filters.push(f),
                    Err(e) => {
                        warn!("Dropping unparseable filter for {}: {}", sub_id, e);
                    }
                }
            }

            if ctx.subscriptions.get(sub_id).is_none()
                && ctx.subscriptions.len() >= ctx.max_subscriptions
            {
                responses.push(json!([
                    "NOTICE",
                    format!("rate limit: max {} subscriptions per connection", ctx.max_subscriptions)
                ]));
                return responses;
            }

            debug!(
                "Subscription requested: {} with {} filters",
                sub_id,
                filters.len()
            );

            // Backlog and sequence snapshot under one read lock, so a
            // concurrently stored event is either in the backlog or past
            // the snapshot, never both
            let (events, snapshot) = {
                let store = ctx.store.read().await;
                (store.query(&filters), store.last_seq())
            };

            // Replaces any prior subscription with the same id
            let mut subscription = Subscription::new(sub_id.to_string(), filters);
            subscription.after_seq = snapshot;
            ctx.subscriptions.add(subscription);

            debug!(
                "Found {} matching events for subscription {}",
                events.len(),
                sub_id
            );
            for event in events {
                responses.push(json!(["EVENT", sub_id, event]));
            }

            // Exactly one EOSE per REQ
            responses.push(json!(["EOSE", sub_id]));
        }
        "CLOSE" => {
            // ["CLOSE", <subscription_id>]
            if msg_array.len() != 2 {
                responses.push(json!([
                    "NOTICE",
                    "invalid: CLOSE message must have 2 elements"
                ]));
                return responses;
            }

            let sub_id = match msg_array[1].as_str() {
                Some(id) => id,
                None => {
                    responses.push(json!(["NOTICE", "invalid: subscription ID must be string"]));
                    return responses;
                }
            };

            if ctx.subscriptions.remove(sub_id) {
                debug!("Subscription closed: {}", sub_id);
            } else {
                debug!("Attempted to close non-existent subscription: {}", sub_id);
            }
            // No response for CLOSE
        }
        _ => {
            warn!("Unknown message type: {}", msg_type);
            responses.push(json!([
                "NOTICE",
                format!("Unknown message type: {}", msg_type)
            ]));
        }
    }

    responses
}
