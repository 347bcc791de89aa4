use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::DomainEvent;
use super::value_objects::{
    OrderStatus, PaymentStatus, ReturnDecision, TrackingInfo, TrackingUpdate,
};

// ============================================================================
// Order Events - Facts about the order lifecycle
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    StatusChanged(OrderStatusChanged),
    ReturnRequested(OrderReturnRequested),
    ReturnResolved(OrderReturnResolved),
    PaymentRecorded(OrderPaymentRecorded),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::ReturnRequested(_) => "OrderReturnRequested",
            OrderEvent::ReturnResolved(_) => "OrderReturnResolved",
            OrderEvent::PaymentRecorded(_) => "OrderPaymentRecorded",
        }
    }
}

/// Order Placed - stock reserved and order persisted
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub order_number: String,
    pub customer_id: Uuid,
    pub item_count: usize,
    pub total: Decimal,
}

/// Order Status Changed - forward step or cancellation
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub update: TrackingUpdate,
    pub tracking_info: Option<TrackingInfo>,
}

/// Order Return Requested - customer asked to return a delivered order
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderReturnRequested {
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// Order Return Resolved - operator decision on a pending return
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderReturnResolved {
    pub decision: ReturnDecision,
    pub processed_at: DateTime<Utc>,
    /// Present when the decision moved the order to `returned`
    pub update: Option<TrackingUpdate>,
}

/// Order Payment Recorded - outcome reported by the payment collaborator
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderPaymentRecorded {
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
