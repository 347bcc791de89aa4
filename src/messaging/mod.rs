// ============================================================================
// Messaging - Order event publication
// ============================================================================
//
// The lifecycle hands committed events to an `EventPublisher`. Publication
// is fire-and-forget: it never blocks the caller and a failed delivery never
// undoes the order mutation that produced it.
//
// ============================================================================

use actix::Addr;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::actors::{NotificationHub, Publish};
use crate::core::EventEnvelope;
use crate::domain::order::{Order, OrderEvent, OrderStatus, Tracking};

pub const ORDER_CREATED: &str = "order-created";
pub const ORDER_UPDATED: &str = "order-updated";

/// Payload pushed to every subscriber of an order's channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    /// Channel event name (`order-created` / `order-updated`)
    pub event: &'static str,
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub tracking: Tracking,
    pub event_type: String,
    /// Order version after the change; strictly increasing per order
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
}

impl OrderUpdate {
    pub fn from_envelope(envelope: &EventEnvelope<OrderEvent>, order: &Order) -> Self {
        let event = match envelope.event_data {
            OrderEvent::Placed(_) => ORDER_CREATED,
            _ => ORDER_UPDATED,
        };
        Self {
            event,
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            tracking: order.tracking.clone(),
            event_type: envelope.event_type.clone(),
            sequence: envelope.sequence_number,
            timestamp: envelope.timestamp,
        }
    }
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, update: OrderUpdate);
}

/// Publishes through the notification hub actor's mailbox
#[derive(Clone)]
pub struct HubPublisher {
    hub: Addr<NotificationHub>,
}

impl HubPublisher {
    pub fn new(hub: Addr<NotificationHub>) -> Self {
        Self { hub }
    }
}

impl EventPublisher for HubPublisher {
    fn publish(&self, update: OrderUpdate) {
        if !self.hub.connected() {
            tracing::warn!(
                order_id = %update.order_id,
                event = update.event,
                "Notification hub is not running, dropping order update"
            );
            return;
        }
        self.hub.do_send(Publish(update));
    }
}
