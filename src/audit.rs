//! Audit feed for the surrounding HTTP application.
//!
//! The HTTP layer calls [`Notify::notify`] with each request URL; the
//! notice is published on the report exchange in the background. Publishing
//! is best-effort: failures (including a bus that is not ready yet) are
//! logged at debug level and dropped.

use std::sync::Arc;
use tracing::debug;

use crate::bus::Bus;
use crate::message::OutboundMessage;

/// Something that wants to hear about every served HTTP request.
pub trait Notify: Send + Sync {
    /// Record that `url` was requested. Must return without waiting.
    fn notify(&self, url: &str);
}

/// Publishes `{"message": url}` notices on the bus.
#[derive(Clone)]
pub struct AuditNotifier {
    bus: Arc<Bus>,
}

impl AuditNotifier {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self { bus }
    }

    /// Publish a notice and wait for the result. Used by the `notify`
    /// subcommand; the HTTP path goes through [`Notify::notify`].
    pub async fn publish(&self, url: &str) -> Result<(), crate::bus::BusError> {
        let message = OutboundMessage::audit(url)?;
        self.bus.publish(&message).await
    }
}

impl Notify for AuditNotifier {
    /// Spawns onto the current Tokio runtime; outside of one the notice is dropped.
    fn notify(&self, url: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(url = %url, "no runtime, audit notice dropped");
            return;
        };
        let notifier = self.clone();
        let url = url.to_string();
        runtime.spawn(async move {
            if let Err(e) = notifier.publish(&url).await {
                debug!(url = %url, error = %e, "audit notice dropped");
            }
        });
    }
}
