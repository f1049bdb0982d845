//! Project-wide constants.

use std::time::Duration;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Direct exchange that carries report requests, results and audit notices.
pub const DEFAULT_EXCHANGE: &str = "my-first-exchange";

/// Durable queue the worker consumes report requests from.
pub const DEFAULT_QUEUE: &str = "first-queue-name";

/// Routing key binding the request queue to the exchange.
pub const DEFAULT_ROUTING_KEY: &str = "first-queue";

/// Routing key for results and audit notices. Must differ from
/// [`DEFAULT_ROUTING_KEY`] or the worker would consume its own output.
pub const DEFAULT_RESULT_ROUTING_KEY: &str = "report-results";

pub const DEFAULT_CONSUMER_TAG: &str = "reportd";

/// Broker host used when neither `--amqp-url` nor `RABBITMQ` is set.
pub const DEFAULT_AMQP_HOST: &str = "localhost";

pub const DEFAULT_AMQP_PORT: u16 = 5672;

/// Root directory every template is resolved under.
pub const DEFAULT_TEMPLATE_PATH: &str = "template/";

/// Output prefix used when a request carries no `outputPath` header.
pub const DEFAULT_OUTPUT_PATH: &str = "/tmp/";

/// External document builder.
pub const DEFAULT_BUILDER_PROGRAM: &str = "gitbook";

/// Upper bound on a single report build.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(300);

/// Captured builder output beyond this many bytes is truncated.
pub const MAX_OUTPUT_BYTES: usize = 50_000;

pub const DEFAULT_RECONNECT_ATTEMPTS: usize = 10;

pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

pub const DEFAULT_RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Expand a bare broker host into a full AMQP URI. Anything that already
/// carries a scheme is returned unchanged.
pub fn amqp_uri(host_or_uri: &str) -> String {
    let trimmed = host_or_uri.trim();
    if trimmed.contains("://") {
        return trimmed.to_string();
    }
    let host = if trimmed.is_empty() {
        DEFAULT_AMQP_HOST
    } else {
        trimmed
    };
    if host.contains(':') {
        format!("amqp://{host}/%2f")
    } else {
        format!("amqp://{host}:{DEFAULT_AMQP_PORT}/%2f")
    }
}
