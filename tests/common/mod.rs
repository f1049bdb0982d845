#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reportd::builder::ReportBuilder;
use reportd::builder::command::{CommandBuilder, CommandConfig};
use reportd::bus::memory::MemoryTransport;
use reportd::bus::{Bus, BusError, Deliveries, Session, Topology, Transport};
use reportd::events::{Event, EventBus};
use reportd::message::OutboundMessage;
use reportd::request::RequestDefaults;
use reportd::retry::RetryConfig;
use reportd::worker::Worker;
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn bus_with(transport: Arc<dyn Transport>, topology: Topology, attempts: usize) -> Arc<Bus> {
    Arc::new(Bus::new(
        transport,
        topology,
        RetryConfig {
            max_attempts: Some(attempts),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
        },
        Arc::new(EventBus::default()),
    ))
}

pub fn memory_bus(transport: &MemoryTransport, attempts: usize) -> Arc<Bus> {
    bus_with(Arc::new(transport.clone()), Topology::default(), attempts)
}

/// A bus over a [`LoopbackTransport`] wrapping `transport`.
pub fn loopback_bus(transport: &MemoryTransport, topology: Topology) -> Arc<Bus> {
    bus_with(
        Arc::new(LoopbackTransport {
            inner: transport.clone(),
        }),
        topology,
        1,
    )
}

/// A topology whose results are published under the request binding.
pub fn looping_topology() -> Topology {
    let topology = Topology::default();
    Topology {
        result_routing_key: topology.routing_key.clone(),
        ..topology
    }
}

/// Behaves like a direct exchange: every publish whose routing key equals
/// the queue binding is delivered back into the request queue.
pub struct LoopbackTransport {
    pub inner: MemoryTransport,
}

impl LoopbackTransport {
    fn wrap(&self, session: Arc<dyn Session>, topology: &Topology) -> Arc<dyn Session> {
        Arc::new(LoopbackSession {
            session,
            queue: self.inner.clone(),
            binding: topology.routing_key.clone(),
        })
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(&self, topology: &Topology) -> Result<(Arc<dyn Session>, Deliveries), BusError> {
        let (session, deliveries) = self.inner.open(topology).await?;
        Ok((self.wrap(session, topology), deliveries))
    }

    async fn open_publisher(&self, topology: &Topology) -> Result<Arc<dyn Session>, BusError> {
        let session = self.inner.open_publisher(topology).await?;
        Ok(self.wrap(session, topology))
    }
}

struct LoopbackSession {
    session: Arc<dyn Session>,
    queue: MemoryTransport,
    binding: String,
}

#[async_trait]
impl Session for LoopbackSession {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &OutboundMessage,
    ) -> Result<(), BusError> {
        self.session.publish(exchange, routing_key, message).await?;
        if routing_key == self.binding {
            let headers = message.headers.clone().into_iter().collect();
            self.queue.deliver_message(headers, message.body.clone());
        }
        Ok(())
    }

    async fn ack(&self, tag: u64) -> Result<(), BusError> {
        self.session.ack(tag).await
    }

    async fn close(&self) -> Result<(), BusError> {
        self.session.close().await
    }
}

/// A builder that runs `script` through `sh -c`, with the real builder
/// arguments available as `$1..$3`.
pub fn script_builder(script: &str) -> CommandBuilder {
    CommandBuilder::new(CommandConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string(), "gitbook".to_string()],
        ..CommandConfig::default()
    })
}

/// Start a worker on its own task.
pub fn spawn_worker(bus: Arc<Bus>, builder: Arc<dyn ReportBuilder>) -> Arc<Worker> {
    let worker = Arc::new(Worker::new(bus, builder, RequestDefaults::default()));
    let running = Arc::clone(&worker);
    tokio::spawn(async move {
        let _ = running.run().await;
    });
    worker
}

/// Wait for the first event matching `pred`.
pub async fn wait_for(rx: &mut broadcast::Receiver<Event>, pred: impl Fn(&Event) -> bool) -> Event {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `check` until it holds.
pub async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}
