use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use reportd::audit::AuditNotifier;
use reportd::builder::command::CommandBuilder;
use reportd::bus::Bus;
use reportd::bus::amqp::AmqpTransport;
use reportd::config::{Cli, Command};
use reportd::consts::{AUTHOR, REPO};
use reportd::events::EventBus;
use reportd::worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli);

    let config = cli.worker_config();
    let bus = Arc::new(Bus::new(
        Arc::new(AmqpTransport::new(config.amqp_uri.clone())),
        config.topology.clone(),
        config.retry.clone(),
        Arc::new(EventBus::default()),
    ));

    match &cli.command {
        Some(Command::Notify { url }) => {
            bus.connect_publisher().await?;
            let published = AuditNotifier::new(Arc::clone(&bus)).publish(url).await;
            bus.close().await?;
            published?;
            info!(url = %url, "audit notice published");
            Ok(())
        }
        Some(Command::Run) | None => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                author = AUTHOR,
                repo = REPO,
                builder = %config.builder.program,
                exchange = %config.topology.exchange,
                queue = %config.topology.queue,
                "reportd starting"
            );

            let builder = Arc::new(CommandBuilder::new(config.builder));
            let worker = Worker::new(bus, builder, config.defaults);

            tokio::select! {
                result = worker.run() => {
                    if let Err(e) = &result {
                        error!(error = %format!("{e:#}"), "worker stopped");
                    }
                    result
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, shutting down");
                    Ok(())
                }
            }
        }
    }
}

fn setup_logging(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
