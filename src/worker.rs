use anyhow::{Context as _, Result};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::builder::{BuildJob, ReportBuilder};
use crate::bus::{Bus, Delivery};
use crate::events::Event;
use crate::message::{OutboundMessage, ResultMessage};
use crate::request::{ReportRequest, RequestDefaults};

/// Consumes report requests and publishes one result per request.
///
/// Requests are handled strictly one after another: decode, resolve the
/// template, build, encode, publish, acknowledge. Deliveries that are not
/// report requests, such as results routed back to the request queue, are
/// acknowledged and dropped without a build or a publish.
pub struct Worker {
    bus: Arc<Bus>,
    builder: Arc<dyn ReportBuilder>,
    defaults: RequestDefaults,
}

impl Worker {
    pub fn new(bus: Arc<Bus>, builder: Arc<dyn ReportBuilder>, defaults: RequestDefaults) -> Self {
        Self {
            bus,
            builder,
            defaults,
        }
    }

    /// Run until the bus cannot be (re)connected. Never returns `Ok`.
    pub async fn run(&self) -> Result<()> {
        loop {
            let mut deliveries = self
                .bus
                .connect()
                .await
                .context("giving up on bus connection")?;
            info!(queue = %self.bus.topology().queue, "consuming report requests");

            while let Some(item) = deliveries.next().await {
                match item {
                    Ok(delivery) => self.process(delivery).await,
                    Err(e) => {
                        warn!(error = %e, "delivery stream failed");
                        break;
                    }
                }
            }

            warn!("bus connection lost, reconnecting");
            self.bus.disconnect().await;
        }
    }

    /// Handle one delivery end to end. Errors are logged, never propagated.
    pub async fn process(&self, delivery: Delivery) {
        if !ReportRequest::is_request(&delivery.headers) {
            debug!(tag = delivery.tag, "skipping delivery that is not a report request");
            self.ack(delivery.tag).await;
            self.bus
                .events()
                .emit(Event::DeliverySkipped { tag: delivery.tag });
            return;
        }

        let request = ReportRequest::decode(&delivery.headers, &self.defaults);
        let result = self.handle(&request).await;

        match self.publish(&result).await {
            Ok(()) => {
                self.bus.events().emit(Event::ReportPublished {
                    questionnaire_id: request.questionnaire_id.clone(),
                    succeeded: result.is_success(),
                });
            }
            Err(e) => error!(error = %e, "failed to publish report result"),
        }

        self.ack(delivery.tag).await;
    }

    /// Build the report for `request` and encode the result.
    #[tracing::instrument(
        skip(self, request),
        fields(
            questionnaire_id = %request.questionnaire_id,
            survey_id = %request.survey_id,
            format = %request.format,
        )
    )]
    pub async fn handle(&self, request: &ReportRequest) -> ResultMessage {
        let template_root = Path::new(&self.defaults.template_path);
        if request.template_path != self.defaults.template_path {
            debug!(requested = %request.template_path, "ignoring requested templatePath");
        }
        let job = BuildJob::from_request(request, template_root);
        info!(template = %job.template_dir().display(), "building report");

        let outcome = self.builder.build(&job).await;
        match &outcome.error {
            None => info!("report built"),
            Some(e) => warn!(error = %e, stderr = %outcome.stderr, "report build failed"),
        }

        ResultMessage::encode(&outcome, request)
    }

    async fn publish(&self, result: &ResultMessage) -> Result<(), crate::bus::BusError> {
        let message = OutboundMessage::report(result)?;
        self.bus.publish(&message).await
    }

    async fn ack(&self, tag: u64) {
        if let Err(e) = self.bus.ack(tag).await {
            warn!(tag, error = %e, "failed to acknowledge delivery");
        }
    }
}
