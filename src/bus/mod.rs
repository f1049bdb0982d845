//! Message bus connection and topology.
//!
//! [`Transport`] is the seam to the broker: it opens a [`Session`] with the
//! topology declared and hands back the stream of inbound deliveries.
//! [`Bus`] owns the connection state and the active session; nothing can be
//! published until it is [`ConnectionState::Ready`].

pub mod amqp;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio_retry::Retry;
use tracing::{info, warn};

use crate::consts::{
    DEFAULT_CONSUMER_TAG, DEFAULT_EXCHANGE, DEFAULT_QUEUE, DEFAULT_RESULT_ROUTING_KEY,
    DEFAULT_ROUTING_KEY,
};
use crate::events::{Event, EventBus};
use crate::message::OutboundMessage;
use crate::retry::RetryConfig;

/// Source error from a concrete transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the bus layer.
#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("failed to connect to '{uri}': {source}")]
    Connect {
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to set up channel: {0}")]
    Channel(#[source] BoxError),
    #[error("failed to publish: {0}")]
    Publish(#[source] BoxError),
    #[error("failed to acknowledge delivery {tag}: {source}")]
    Ack {
        tag: u64,
        #[source]
        source: BoxError,
    },
    #[error("failed to consume: {0}")]
    Consume(#[source] BoxError),
    #[error("failed to close connection: {0}")]
    Close(#[source] BoxError),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("bus is not ready")]
    NotReady,
}

/// Lifecycle of the bus connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
        })
    }
}

/// Exchange, queue and binding the worker relies on. The exchange is a
/// durable direct exchange and the queue is durable; neither auto-deletes.
///
/// The queue is bound with `routing_key` only. Everything the worker
/// publishes goes out under `result_routing_key`, so it never lands back
/// in the request queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub result_routing_key: String,
    pub consumer_tag: String,
}

impl Topology {
    /// Whether published messages would be routed into the request queue.
    pub fn loops_back(&self) -> bool {
        self.result_routing_key == self.routing_key
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE.to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            routing_key: DEFAULT_ROUTING_KEY.to_string(),
            result_routing_key: DEFAULT_RESULT_ROUTING_KEY.to_string(),
            consumer_tag: DEFAULT_CONSUMER_TAG.to_string(),
        }
    }
}

/// An inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

pub type Deliveries = BoxStream<'static, Result<Delivery, BusError>>;

/// An open broker session.
#[async_trait]
pub trait Session: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &OutboundMessage,
    ) -> Result<(), BusError>;

    async fn ack(&self, tag: u64) -> Result<(), BusError>;

    /// Flush and close the underlying connection.
    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}

/// Opens broker sessions. Could be RabbitMQ, an in-process queue, etc.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect, declare `topology` and start consuming its queue.
    async fn open(&self, topology: &Topology) -> Result<(Arc<dyn Session>, Deliveries), BusError>;

    /// Connect and declare the exchange without consuming anything.
    async fn open_publisher(&self, topology: &Topology) -> Result<Arc<dyn Session>, BusError>;
}

/// The connection-state object shared by the worker and every publisher.
pub struct Bus {
    transport: Arc<dyn Transport>,
    topology: Topology,
    retry: RetryConfig,
    events: Arc<EventBus>,
    state: Mutex<ConnectionState>,
    session: RwLock<Option<Arc<dyn Session>>>,
}

impl Bus {
    pub fn new(
        transport: Arc<dyn Transport>,
        topology: Topology,
        retry: RetryConfig,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            transport,
            topology,
            retry,
            events,
            state: Mutex::new(ConnectionState::Disconnected),
            session: RwLock::new(None),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = {
            let mut state = self.state.lock().unwrap();
            std::mem::replace(&mut *state, next) != next
        };
        if changed {
            info!(state = %next, "bus connection state changed");
            self.events.emit(Event::Connection(next));
        }
    }

    /// Open a session, retrying with backoff, and return its deliveries.
    /// On success the bus is `Ready`; when attempts run out it is left
    /// `Disconnected` and the last error is returned.
    pub async fn connect(&self) -> Result<Deliveries, BusError> {
        if self.topology.loops_back() {
            warn!(
                routing_key = %self.topology.routing_key,
                "result routing key matches the request binding; own results will be skipped"
            );
        }
        self.establish(|| self.transport.open(&self.topology)).await
    }

    /// Like [`Bus::connect`], but only for publishing: the request queue is
    /// left untouched.
    pub async fn connect_publisher(&self) -> Result<(), BusError> {
        self.establish(|| async move {
            let session = self.transport.open_publisher(&self.topology).await?;
            Ok((session, ()))
        })
        .await
    }

    async fn establish<T, F, Fut>(&self, mut open: F) -> Result<T, BusError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(Arc<dyn Session>, T), BusError>>,
    {
        self.set_state(ConnectionState::Connecting);

        let mut attempt = 0usize;
        let opened = Retry::spawn(self.retry.strategy(), || {
            attempt += 1;
            let attempt = attempt;
            let opening = open();
            async move {
                opening
                    .await
                    .inspect_err(|e| warn!(attempt, error = %e, "bus connection attempt failed"))
            }
        })
        .await;

        match opened {
            Ok((session, value)) => {
                *self.session.write().await = Some(session);
                self.set_state(ConnectionState::Ready);
                Ok(value)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Drop the active session. Publishing fails until the next `connect`.
    pub async fn disconnect(&self) {
        self.session.write().await.take();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Close the active session cleanly. A no-op when not connected.
    pub async fn close(&self) -> Result<(), BusError> {
        let session = self.session.write().await.take();
        self.set_state(ConnectionState::Disconnected);
        match session {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }

    async fn session(&self) -> Result<Arc<dyn Session>, BusError> {
        self.session.read().await.clone().ok_or(BusError::NotReady)
    }

    /// Publish to the topology's exchange under the result routing key.
    pub async fn publish(&self, message: &OutboundMessage) -> Result<(), BusError> {
        let session = self.session().await?;
        session
            .publish(
                &self.topology.exchange,
                &self.topology.result_routing_key,
                message,
            )
            .await
    }

    pub async fn ack(&self, tag: u64) -> Result<(), BusError> {
        self.session().await?.ack(tag).await
    }
}
