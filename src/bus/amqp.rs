//! RabbitMQ transport built on [`lapin`].

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use super::{BusError, Deliveries, Delivery, Session, Topology, Transport};
use crate::message::OutboundMessage;

/// One report build in flight per consumer.
const PREFETCH_COUNT: u16 = 1;

/// Persistent delivery mode for published messages.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// AMQP reply code for a normal shutdown.
const REPLY_SUCCESS: u16 = 200;

/// Connects to a RabbitMQ broker.
pub struct AmqpTransport {
    uri: String,
}

impl AmqpTransport {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl AmqpTransport {
    /// Connect, open a channel and declare the exchange.
    async fn channel(&self, topology: &Topology) -> Result<(Connection, Channel), BusError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|e| BusError::Connect {
                uri: self.uri.clone(),
                source: e.into(),
            })?;
        info!("connected to RabbitMQ");

        let channel = connection.create_channel().await.map_err(channel_error)?;

        channel
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(channel_error)?;
        debug!(exchange = %topology.exchange, "exchange declared");

        Ok((connection, channel))
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn open(&self, topology: &Topology) -> Result<(Arc<dyn Session>, Deliveries), BusError> {
        let (connection, channel) = self.channel(topology).await?;

        channel
            .queue_declare(
                &topology.queue,
                QueueDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(channel_error)?;

        channel
            .queue_bind(
                &topology.queue,
                &topology.exchange,
                &topology.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(channel_error)?;
        debug!(
            queue = %topology.queue,
            routing_key = %topology.routing_key,
            "queue declared and bound"
        );

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(channel_error)?;

        let consumer = channel
            .basic_consume(
                &topology.queue,
                &topology.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(channel_error)?;

        let deliveries = consumer
            .map(|item| {
                item.map(|delivery| Delivery {
                    tag: delivery.delivery_tag,
                    headers: decode_headers(delivery.properties.headers().as_ref()),
                    body: delivery.data,
                })
                .map_err(|e| BusError::Consume(e.into()))
            })
            .boxed();

        let session = AmqpSession {
            connection,
            channel,
        };
        Ok((Arc::new(session), deliveries))
    }

    async fn open_publisher(&self, topology: &Topology) -> Result<Arc<dyn Session>, BusError> {
        let (connection, channel) = self.channel(topology).await?;
        Ok(Arc::new(AmqpSession {
            connection,
            channel,
        }))
    }
}

fn channel_error(e: lapin::Error) -> BusError {
    BusError::Channel(e.into())
}

struct AmqpSession {
    // Dropping the connection closes it; keep it alive with the session.
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl Session for AmqpSession {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &OutboundMessage,
    ) -> Result<(), BusError> {
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from("application/json"))
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_headers(encode_headers(&message.headers));

        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(e.into()))?
            .await
            .map_err(|e| BusError::Publish(e.into()))?;
        Ok(())
    }

    async fn ack(&self, tag: u64) -> Result<(), BusError> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(|e| BusError::Ack {
                tag,
                source: e.into(),
            })
    }

    async fn close(&self) -> Result<(), BusError> {
        self.channel
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(|e| BusError::Close(e.into()))?;
        self.connection
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(|e| BusError::Close(e.into()))?;
        debug!("connection closed");
        Ok(())
    }
}

/// Flatten AMQP headers to strings. Strings are decoded as UTF-8 (lossy),
/// numbers and booleans are stringified, anything else is dropped.
fn decode_headers(table: Option<&FieldTable>) -> HashMap<String, String> {
    let Some(table) = table else {
        return HashMap::new();
    };
    table
        .inner()
        .iter()
        .filter_map(|(key, value)| header_value(value).map(|v| (key.as_str().to_string(), v)))
        .collect()
}

fn header_value(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::LongString(s) => Some(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
        AMQPValue::Boolean(b) => Some(b.to_string()),
        AMQPValue::ShortShortInt(n) => Some(n.to_string()),
        AMQPValue::ShortShortUInt(n) => Some(n.to_string()),
        AMQPValue::ShortInt(n) => Some(n.to_string()),
        AMQPValue::ShortUInt(n) => Some(n.to_string()),
        AMQPValue::LongInt(n) => Some(n.to_string()),
        AMQPValue::LongUInt(n) => Some(n.to_string()),
        AMQPValue::LongLongInt(n) => Some(n.to_string()),
        _ => None,
    }
}

fn encode_headers(headers: &BTreeMap<String, String>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(
            ShortString::from(key.as_str()),
            AMQPValue::LongString(LongString::from(value.as_str())),
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_missing_headers_is_empty() {
        assert!(decode_headers(None).is_empty());
    }

    #[test]
    fn decode_string_and_numeric_headers() {
        let mut table = FieldTable::default();
        table.insert(
            "questionnaireID".into(),
            AMQPValue::LongString("survey:42".into()),
        );
        table.insert("format".into(), AMQPValue::ShortString("pdf".into()));
        table.insert("attempt".into(), AMQPValue::LongInt(3));
        table.insert("flag".into(), AMQPValue::Boolean(true));
        table.insert("nested".into(), AMQPValue::FieldTable(FieldTable::default()));

        let headers = decode_headers(Some(&table));

        assert_eq!(headers.len(), 4);
        assert_eq!(headers["questionnaireID"], "survey:42");
        assert_eq!(headers["format"], "pdf");
        assert_eq!(headers["attempt"], "3");
        assert_eq!(headers["flag"], "true");
    }

    #[test]
    fn encode_then_decode_keeps_result_fields() {
        let headers = BTreeMap::from([
            ("error".to_string(), "fail".to_string()),
            ("message".to_string(), "template missing".to_string()),
        ]);
        let table = encode_headers(&headers);
        let decoded = decode_headers(Some(&table));
        assert_eq!(decoded["error"], "fail");
        assert_eq!(decoded["message"], "template missing");
    }
}
