//! Command-line and environment configuration.
//!
//! Every option can also be set through the environment variable named in
//! its `env` attribute. `RABBITMQ` accepts a bare host, as older
//! deployments pass it, or a full AMQP URI.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::builder::command::CommandConfig;
use crate::bus::Topology;
use crate::consts::{
    DEFAULT_AMQP_HOST, DEFAULT_BUILD_TIMEOUT, DEFAULT_BUILDER_PROGRAM, DEFAULT_CONSUMER_TAG,
    DEFAULT_EXCHANGE, DEFAULT_OUTPUT_PATH, DEFAULT_QUEUE, DEFAULT_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_BACKOFF, DEFAULT_RECONNECT_MAX_BACKOFF, DEFAULT_RESULT_ROUTING_KEY,
    DEFAULT_ROUTING_KEY, DEFAULT_TEMPLATE_PATH, MAX_OUTPUT_BYTES, amqp_uri,
};
use crate::request::RequestDefaults;
use crate::retry::RetryConfig;

#[derive(Parser, Debug)]
#[command(name = "reportd", version, about = "Report generation worker.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// RabbitMQ host or amqp:// URI
    #[arg(long, env = "RABBITMQ", default_value = DEFAULT_AMQP_HOST, global = true)]
    pub amqp_url: String,

    /// Direct exchange for requests, results and audit notices
    #[arg(long, env = "REPORTD_EXCHANGE", default_value = DEFAULT_EXCHANGE, global = true)]
    pub exchange: String,

    /// Queue consumed for report requests
    #[arg(long, env = "REPORTD_QUEUE", default_value = DEFAULT_QUEUE, global = true)]
    pub queue: String,

    /// Routing key binding the request queue
    #[arg(long, env = "REPORTD_ROUTING_KEY", default_value = DEFAULT_ROUTING_KEY, global = true)]
    pub routing_key: String,

    /// Routing key for published results and audit notices
    #[arg(long, env = "REPORTD_RESULT_ROUTING_KEY", default_value = DEFAULT_RESULT_ROUTING_KEY, global = true)]
    pub result_routing_key: String,

    /// Consumer tag announced to the broker
    #[arg(long, env = "REPORTD_CONSUMER_TAG", default_value = DEFAULT_CONSUMER_TAG)]
    pub consumer_tag: String,

    /// External document builder program
    #[arg(long, env = "REPORTD_BUILDER", default_value = DEFAULT_BUILDER_PROGRAM)]
    pub builder: String,

    /// Extra argument passed to the builder before its subcommand (repeatable)
    #[arg(long = "builder-arg", allow_hyphen_values = true)]
    pub builder_args: Vec<String>,

    /// Working directory for the builder process
    #[arg(short, long, env = "REPORTD_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Build timeout in seconds
    #[arg(long, env = "REPORTD_BUILD_TIMEOUT", default_value_t = DEFAULT_BUILD_TIMEOUT.as_secs())]
    pub build_timeout: u64,

    /// Template root for every build; request templatePath headers are ignored
    #[arg(long, env = "REPORTD_TEMPLATE_PATH", default_value = DEFAULT_TEMPLATE_PATH)]
    pub template_path: String,

    /// Output prefix used when a request has no outputPath header
    #[arg(long, env = "REPORTD_OUTPUT_PATH", default_value = DEFAULT_OUTPUT_PATH)]
    pub output_path: String,

    /// Connection attempts before giving up (0 = retry forever)
    #[arg(long, env = "REPORTD_RECONNECT_ATTEMPTS", default_value_t = DEFAULT_RECONNECT_ATTEMPTS, global = true)]
    pub reconnect_attempts: usize,

    /// Initial reconnect backoff in milliseconds
    #[arg(long, env = "REPORTD_RECONNECT_BACKOFF_MS", default_value_t = DEFAULT_RECONNECT_BACKOFF.as_millis() as u64, global = true)]
    pub reconnect_backoff_ms: u64,

    /// Upper bound on any single reconnect delay in milliseconds
    #[arg(long, env = "REPORTD_RECONNECT_MAX_BACKOFF_MS", default_value_t = DEFAULT_RECONNECT_MAX_BACKOFF.as_millis() as u64, global = true)]
    pub reconnect_max_backoff_ms: u64,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Consume report requests (default)
    Run,
    /// Publish a single audit notice and exit
    Notify {
        /// Request URL to announce
        url: String,
    },
}

/// Everything the worker needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub amqp_uri: String,
    pub topology: Topology,
    pub retry: RetryConfig,
    pub builder: CommandConfig,
    pub defaults: RequestDefaults,
}

impl Cli {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            amqp_uri: amqp_uri(&self.amqp_url),
            topology: Topology {
                exchange: self.exchange.clone(),
                queue: self.queue.clone(),
                routing_key: self.routing_key.clone(),
                result_routing_key: self.result_routing_key.clone(),
                consumer_tag: self.consumer_tag.clone(),
            },
            retry: RetryConfig {
                max_attempts: (self.reconnect_attempts > 0).then_some(self.reconnect_attempts),
                initial_backoff: Duration::from_millis(self.reconnect_backoff_ms),
                max_backoff: Duration::from_millis(self.reconnect_max_backoff_ms),
            },
            builder: CommandConfig {
                program: self.builder.clone(),
                args: self.builder_args.clone(),
                working_dir: self.work_dir.clone(),
                timeout: Duration::from_secs(self.build_timeout),
                max_output_bytes: MAX_OUTPUT_BYTES,
            },
            defaults: RequestDefaults {
                template_path: self.template_path.clone(),
                output_path: self.output_path.clone(),
            },
        }
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info,lapin=warn",
            1 => "debug,lapin=info",
            2 => "debug",
            _ => "trace",
        }
    }
}
