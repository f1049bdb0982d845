//! In-process transport for tests and local runs.
//!
//! Deliveries pushed with [`MemoryTransport::deliver`] are buffered until a
//! session is open. [`MemoryTransport::drop_connection`] ends the current
//! delivery stream the way a broker disconnect would.

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{BusError, Deliveries, Delivery, Session, Topology, Transport};
use crate::message::OutboundMessage;

/// A message captured by the in-memory session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub message: OutboundMessage,
}

#[derive(Default)]
struct State {
    topologies: Vec<Topology>,
    open_attempts: usize,
    failing_opens: usize,
    failing_publishes: bool,
    sender: Option<mpsc::UnboundedSender<Result<Delivery, BusError>>>,
    backlog: Vec<Delivery>,
    next_tag: u64,
    published: Vec<Published>,
    acked: Vec<u64>,
    closed: usize,
}

/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound message with the given headers. Returns its tag.
    pub fn deliver(&self, headers: HashMap<String, String>) -> u64 {
        self.deliver_message(headers, Vec::new())
    }

    /// Queue an inbound message with headers and a body. Returns its tag.
    pub fn deliver_message(&self, headers: HashMap<String, String>, body: Vec<u8>) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_tag += 1;
        let delivery = Delivery {
            tag: state.next_tag,
            headers,
            body,
        };
        let tag = delivery.tag;
        let undelivered = match &state.sender {
            Some(tx) => tx.unbounded_send(Ok(delivery)).err().map(|e| e.into_inner()),
            None => Some(Ok(delivery)),
        };
        if let Some(Ok(delivery)) = undelivered {
            state.backlog.push(delivery);
        }
        tag
    }

    /// End the current delivery stream, as a broker disconnect would.
    pub fn drop_connection(&self) {
        self.state.lock().unwrap().sender.take();
    }

    /// Make the next `count` opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.state.lock().unwrap().failing_opens = count;
    }

    /// Make every publish fail until switched back.
    pub fn fail_publishes(&self, fail: bool) {
        self.state.lock().unwrap().failing_publishes = fail;
    }

    pub fn open_attempts(&self) -> usize {
        self.state.lock().unwrap().open_attempts
    }

    pub fn topologies(&self) -> Vec<Topology> {
        self.state.lock().unwrap().topologies.clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.state.lock().unwrap().acked.clone()
    }

    /// Sessions closed through [`Session::close`].
    pub fn closed_sessions(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    fn try_open(&self, topology: &Topology) -> Result<MemorySession, BusError> {
        let mut state = self.state.lock().unwrap();
        state.open_attempts += 1;
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(BusError::Connect {
                uri: "memory://".to_string(),
                source: "connection refused".into(),
            });
        }
        state.topologies.push(topology.clone());
        Ok(MemorySession {
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, topology: &Topology) -> Result<(Arc<dyn Session>, Deliveries), BusError> {
        let session = self.try_open(topology)?;

        let mut state = self.state.lock().unwrap();
        let (tx, rx) = mpsc::unbounded();
        for delivery in state.backlog.drain(..) {
            // The receiver is alive in this scope, so sending cannot fail.
            let _ = tx.unbounded_send(Ok(delivery));
        }
        state.sender = Some(tx);

        Ok((Arc::new(session), rx.boxed()))
    }

    async fn open_publisher(&self, topology: &Topology) -> Result<Arc<dyn Session>, BusError> {
        Ok(Arc::new(self.try_open(topology)?))
    }
}

struct MemorySession {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Session for MemorySession {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &OutboundMessage,
    ) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_publishes {
            return Err(BusError::Publish("publish rejected".into()));
        }
        state.published.push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn ack(&self, tag: u64) -> Result<(), BusError> {
        self.state.lock().unwrap().acked.push(tag);
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        self.state.lock().unwrap().closed += 1;
        Ok(())
    }
}
