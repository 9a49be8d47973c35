use async_trait::async_trait;
use boxoffice_core::{CustomerId, DispatchError, DispatchResult, Messenger, SeatId, SeatLookup, ShowId};
use boxoffice_shared::{CustomerMessageEvent, SeatOccupancyEvent, CUSTOMER_MESSAGES_TOPIC, SEAT_OCCUPANCY_TOPIC};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                let partition = delivery.partition;
                let offset = delivery.offset;
                info!("Sent message to {}/{}: partition {} offset {}", topic, key, partition, offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Seat-lookup collaborator backed by the `seats.occupancy` topic.
/// Consumers deduplicate on the message key.
#[derive(Clone)]
pub struct KafkaSeatLookup {
    producer: EventProducer,
}

impl KafkaSeatLookup {
    pub fn new(producer: EventProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl SeatLookup for KafkaSeatLookup {
    async fn upsert(&self, show_id: ShowId, seat: SeatId, occupied: bool, key: &str) -> DispatchResult<()> {
        let event = SeatOccupancyEvent::new(show_id.0, seat.to_string(), occupied, key.to_string());
        let payload = event
            .to_payload()
            .map_err(|e| DispatchError::Downstream(e.to_string()))?;

        self.producer
            .publish(SEAT_OCCUPANCY_TOPIC, key, &payload)
            .await
            .map_err(|e| DispatchError::Downstream(e.to_string()))
    }
}

/// Messaging collaborator backed by the `customers.messages` topic.
#[derive(Clone)]
pub struct KafkaMessenger {
    producer: EventProducer,
}

impl KafkaMessenger {
    pub fn new(producer: EventProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl Messenger for KafkaMessenger {
    async fn deliver(&self, recipient: CustomerId, header: &str, body: &str, key: &str) -> DispatchResult<()> {
        let event = CustomerMessageEvent::new(recipient.0, header.to_string(), body.to_string(), key.to_string());
        let payload = event
            .to_payload()
            .map_err(|e| DispatchError::Downstream(e.to_string()))?;

        self.producer
            .publish(CUSTOMER_MESSAGES_TOPIC, key, &payload)
            .await
            .map_err(|e| DispatchError::Downstream(e.to_string()))
    }
}
