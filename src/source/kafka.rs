use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::KafkaError,
    Message, Offset, TopicPartitionList,
};
use tracing::{debug, info};

use super::{MessageLog, Position, RawMessage};
use crate::error::{CommitError, FetchError};
use crate::settings::Settings;

/// Kafka consumer group member subscribed to a single topic
pub struct KafkaLog {
    consumer: StreamConsumer,
}

impl KafkaLog {
    pub fn new(settings: &Settings) -> Result<KafkaLog, KafkaError> {
        let mut cfg = ClientConfig::new();
        for (k, v) in &settings.kafka_options {
            cfg.set(k, v);
        }
        let consumer: StreamConsumer = cfg
            .set("bootstrap.servers", &settings.kafka_brokers)
            .set("group.id", settings.group())
            .set("auto.offset.reset", &settings.auto_offset_reset)
            .set("enable.auto.commit", settings.auto_commit().to_string())
            .set("enable.partition.eof", "false")
            .create()?;
        consumer.subscribe(&[&settings.topic])?;
        info!(
            topic = %settings.topic,
            group = %settings.group(),
            auto_commit = settings.auto_commit(),
            "subscribed"
        );
        Ok(KafkaLog { consumer })
    }
}

/// Offsets to commit for the given positions. Kafka expects the offset of
/// the _next_ message, see https://docs.rs/rdkafka/latest/rdkafka/consumer/trait.Consumer.html#tymethod.commit
fn commit_list(positions: &[Position]) -> Result<TopicPartitionList, KafkaError> {
    let mut tpl = TopicPartitionList::new();
    for p in positions {
        tpl.add_partition_offset(&p.topic, p.partition, Offset::Offset(p.offset + 1))?;
    }
    Ok(tpl)
}

#[async_trait]
impl MessageLog for KafkaLog {
    async fn fetch(&self) -> Result<RawMessage, FetchError> {
        let msg = self.consumer.recv().await?;
        Ok(RawMessage {
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            position: Position {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
            },
        })
    }

    async fn commit(&self, positions: &[Position]) -> Result<(), CommitError> {
        if positions.is_empty() {
            return Ok(());
        }
        let tpl = commit_list(positions)?;
        self.consumer.commit(&tpl, CommitMode::Sync)?;
        debug!(partitions = tpl.count(), "committed offsets");
        Ok(())
    }

    async fn close(&self) {
        self.consumer.unsubscribe();
        info!("unsubscribed");
    }
}
