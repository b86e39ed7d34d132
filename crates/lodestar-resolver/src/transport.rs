//! One-shot relay transport
//!
//! The resolver never holds a persistent relay connection: each query is
//! connect, REQ until EOSE, CLOSE, disconnect; each publish is connect,
//! EVENT, wait for OK, disconnect. Every operation is bounded by the
//! caller's timeout.

use crate::error::{ResolveError, Result};
use crate::message::{ClientMessage, Filter, RelayMessage};
use futures::{SinkExt, StreamExt};
use lodestar::Event;
use rand::RngCore;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

/// Result of publishing an event to one relay
#[derive(Debug, Clone)]
pub struct PublishConfirmation {
    /// Event ID that was published
    pub event_id: String,
    /// Whether the relay accepted the event
    pub accepted: bool,
    /// Message from the relay (empty if accepted)
    pub message: String,
}

/// Generate a random subscription ID
pub fn generate_subscription_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn validate_relay_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;
    if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
        return Err(ResolveError::InvalidUrl(format!(
            "URL must use ws:// or wss:// scheme, got: {}",
            parsed.scheme()
        )));
    }
    Ok(parsed)
}

/// Fetch all stored events matching the filters from one relay.
///
/// Sends a REQ and collects EVENTs until the relay's EOSE. The whole
/// operation, including connecting, is bounded by `wait`.
pub async fn fetch_events(url: &str, filters: &[Filter], wait: Duration) -> Result<Vec<Event>> {
    let parsed = validate_relay_url(url)?;
    match timeout(wait, fetch_events_inner(&parsed, filters)).await {
        Ok(result) => result,
        Err(_) => Err(ResolveError::Timeout(format!(
            "no EOSE from {} after {:?}",
            url, wait
        ))),
    }
}

async fn fetch_events_inner(url: &Url, filters: &[Filter]) -> Result<Vec<Event>> {
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| ResolveError::WebSocket(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    let sub_id = generate_subscription_id();
    let req = ClientMessage::Req {
        subscription_id: sub_id.clone(),
        filters: filters.to_vec(),
    }
    .to_json()
    .map_err(|e| ResolveError::Protocol(e.to_string()))?;
    write
        .send(Message::Text(req))
        .await
        .map_err(|e| ResolveError::WebSocket(e.to_string()))?;

    let mut events = Vec::new();
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match RelayMessage::from_json(&text) {
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                }) if subscription_id == sub_id => events.push(event),
                Ok(RelayMessage::Eose { subscription_id }) if subscription_id == sub_id => break,
                Ok(RelayMessage::Notice { message }) => {
                    debug!("Notice from {}: {}", url, message);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Unparseable message from {}: {}", url, e);
                }
            },
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => return Err(ResolveError::WebSocket(e.to_string())),
        }
    }

    let close = ClientMessage::Close {
        subscription_id: sub_id,
    }
    .to_json()
    .map_err(|e| ResolveError::Protocol(e.to_string()))?;
    let _ = write.send(Message::Text(close)).await;
    let _ = write.close().await;

    debug!("Fetched {} events from {}", events.len(), url);
    Ok(events)
}

/// Publish one event to one relay and wait for its OK.
pub async fn publish_event(
    url: &str,
    event: &Event,
    wait: Duration,
) -> Result<PublishConfirmation> {
    let parsed = validate_relay_url(url)?;
    match timeout(wait, publish_event_inner(&parsed, event)).await {
        Ok(result) => result,
        Err(_) => Err(ResolveError::Timeout(format!(
            "no OK from {} after {:?}",
            url, wait
        ))),
    }
}

async fn publish_event_inner(url: &Url, event: &Event) -> Result<PublishConfirmation> {
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| ResolveError::WebSocket(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    let msg = ClientMessage::Event(event.clone())
        .to_json()
        .map_err(|e| ResolveError::Protocol(e.to_string()))?;
    write
        .send(Message::Text(msg))
        .await
        .map_err(|e| ResolveError::WebSocket(e.to_string()))?;

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match RelayMessage::from_json(&text) {
                Ok(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message,
                }) if event_id == event.id => {
                    let _ = write.close().await;
                    return Ok(PublishConfirmation {
                        event_id,
                        accepted,
                        message,
                    });
                }
                Ok(RelayMessage::Notice { message }) => {
                    warn!("Notice from {} while publishing: {}", url, message);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Unparseable message from {}: {}", url, e);
                }
            },
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => return Err(ResolveError::WebSocket(e.to_string())),
        }
    }

    Err(ResolveError::Protocol(format!(
        "relay {} closed before acknowledging event {}",
        url, event.id
    )))
}
