use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Event Envelope
// ============================================================================
//
// Wraps a domain event with the metadata observers need to order and
// attribute it. Generic over the event payload.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E> {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    /// Aggregate version after this event was committed
    pub sequence_number: i64,
    pub event_type: String,
    pub event_data: E,
    /// Who triggered this event
    pub user_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(aggregate_id: Uuid, sequence_number: i64, event_data: E) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_data,
            user_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Implemented by every domain event enum so envelopes can name their payload.
pub trait DomainEvent: Serialize + Clone + Send + Sync {
    fn event_type(&self) -> &'static str;
}
