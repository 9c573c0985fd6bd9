//! An in-process publish/subscribe bus keyed by topic.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A single message published on an [`EventBus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The topic the event was published under.
    pub topic: String,

    /// The event payload.
    pub data: Value,
}

/// A topic-keyed publish/subscribe bus.
///
/// Listeners register for one or more topics with [`EventBus::on`] and receive
/// every event published under any of them, in publish order, over an
/// unbounded channel. Cloning the bus produces another handle to the same
/// listener registry, so publishers and subscribers can share one bus across
/// tasks.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Event>>>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Event {
    /// Creates a new event for the given topic.
    pub fn new(topic: impl Into<String>, data: Value) -> Self {
        Self {
            topic: topic.into(),
            data,
        }
    }
}

impl EventBus {
    /// Creates a new bus with no registered listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for the given topics and returns the receiving
    /// half of its channel.
    ///
    /// The registration lasts until the receiver is dropped; there is no
    /// explicit unsubscribe.
    pub async fn on(&self, topics: &[&str]) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.listeners.lock().await;
        for topic in topics {
            listeners
                .entry((*topic).to_string())
                .or_default()
                .push(tx.clone());
        }

        rx
    }

    /// Publishes an event to every listener currently registered for the
    /// topic. Publishing to a topic nobody listens on is a no-op.
    ///
    /// Listeners whose receiving half has been dropped are pruned on the way
    /// through.
    pub async fn publish(&self, topic: &str, data: Value) {
        let mut listeners = self.listeners.lock().await;
        if let Some(senders) = listeners.get_mut(topic) {
            senders.retain(|tx| tx.send(Event::new(topic, data.clone())).is_ok());
        }
    }

    /// Serializes the payload and publishes it under the topic. A payload
    /// that fails to serialize is logged and dropped.
    pub async fn publish_serialize<T: Serialize>(&self, topic: &str, data: &T) {
        match serde_json::to_value(data) {
            Ok(value) => self.publish(topic, value).await,
            Err(err) => {
                tracing::warn!(topic, error = %err, "dropping event payload that failed to serialize")
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
