use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::Aggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::value_objects::*;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub version: i64,
    pub order_number: String,
    pub customer_id: Uuid,

    // Snapshot taken at creation, never recomputed
    pub items: Vec<OrderLine>,
    pub pricing: Pricing,

    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment: Payment,

    // Lifecycle
    pub status: OrderStatus,
    pub tracking: Tracking,
    pub notes: OrderNotes,
    pub return_request: ReturnRequest,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fully validated order that has not been given an order number yet.
///
/// The number is only attached when the store accepts the insert, so a
/// collision can be retried with a fresh candidate.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub items: Vec<OrderLine>,
    pub pricing: Pricing,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub notes: OrderNotes,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn with_order_number(&self, order_number: String) -> Order {
        Order {
            id: self.id,
            version: 1,
            order_number,
            customer_id: self.customer_id,
            items: self.items.clone(),
            pricing: self.pricing.clone(),
            shipping_address: self.shipping_address.clone(),
            billing_address: self
                .billing_address
                .clone()
                .unwrap_or_else(|| self.shipping_address.clone()),
            payment: Payment::pending(self.payment_method),
            status: OrderStatus::Pending,
            tracking: Tracking::default(),
            notes: self.notes.clone(),
            return_request: ReturnRequest::default(),
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

impl Order {
    pub fn placed_event(&self) -> OrderEvent {
        OrderEvent::Placed(OrderPlaced {
            order_number: self.order_number.clone(),
            customer_id: self.customer_id,
            item_count: self.items.len(),
            total: self.pricing.total,
        })
    }

    pub fn has_seller(&self, user_id: Uuid) -> bool {
        self.items.iter().any(|line| line.seller_id == user_id)
    }

    /// Sellers of at least one line, or administrators
    pub fn can_be_managed_by(&self, caller: &Caller) -> bool {
        caller.is_admin() || self.has_seller(caller.user_id)
    }

    /// Owner, seller of a line, or administrator
    pub fn is_visible_to(&self, caller: &Caller) -> bool {
        self.customer_id == caller.user_id || self.can_be_managed_by(caller)
    }

    pub fn is_digital(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|line| line.is_digital)
    }

    fn tracking_update(status: OrderStatus, info: Option<&TrackingInfo>, at: DateTime<Utc>) -> TrackingUpdate {
        let message = info
            .and_then(|i| i.message.clone())
            .unwrap_or_else(|| format!("Order {}", status));
        TrackingUpdate {
            status,
            message,
            location: info.and_then(|i| i.location.clone()),
            timestamp: at,
        }
    }

    fn check_return_request(&self, customer_id: Uuid) -> Result<(), OrderError> {
        if self.customer_id != customer_id {
            return Err(OrderError::NotAuthorized);
        }
        if self.status != OrderStatus::Delivered {
            return Err(OrderError::InvalidState(
                "Can only return delivered orders".to_string(),
            ));
        }
        if self.return_request.requested {
            return Err(OrderError::DuplicateRequest(self.id));
        }
        Ok(())
    }

    fn check_return_resolution(&self, decision: ReturnDecision) -> Result<(), OrderError> {
        if !self.return_request.requested {
            return Err(OrderError::InvalidState(
                "No return request to resolve".to_string(),
            ));
        }
        let current = self.return_request.status.unwrap_or(ReturnStatus::Pending);
        match (current, decision) {
            (ReturnStatus::Pending, _) => Ok(()),
            (ReturnStatus::Approved, ReturnDecision::Rejected | ReturnDecision::Completed) => Ok(()),
            _ => Err(OrderError::InvalidState(format!(
                "Return request is already {}",
                format!("{:?}", current).to_lowercase()
            ))),
        }
    }

    fn check_payment(&self, status: PaymentStatus) -> Result<(), OrderError> {
        let current = self.payment.status;
        let allowed = match status {
            PaymentStatus::Completed => {
                matches!(current, PaymentStatus::Pending | PaymentStatus::Failed)
                    && self.status != OrderStatus::Cancelled
            }
            PaymentStatus::Failed => current == PaymentStatus::Pending,
            PaymentStatus::Refunded => current == PaymentStatus::Completed,
            PaymentStatus::Pending => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(OrderError::InvalidState(format!(
                "Cannot record payment as {} while it is {}",
                format!("{:?}", status).to_lowercase(),
                format!("{:?}", current).to_lowercase()
            )))
        }
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Placed(_) => {
                // Creation is applied by NewOrder
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                if let Some(info) = &e.tracking_info {
                    if info.carrier.is_some() {
                        self.tracking.carrier = info.carrier.clone();
                    }
                    if info.tracking_number.is_some() {
                        self.tracking.tracking_number = info.tracking_number.clone();
                    }
                    if info.estimated_delivery.is_some() {
                        self.tracking.estimated_delivery = info.estimated_delivery;
                    }
                }
                if e.to == OrderStatus::Delivered {
                    self.tracking.actual_delivery = Some(e.update.timestamp);
                }
                self.tracking.updates.push(e.update.clone());
                self.updated_at = e.update.timestamp;
            }
            OrderEvent::ReturnRequested(e) => {
                self.return_request = ReturnRequest {
                    requested: true,
                    reason: Some(e.reason.clone()),
                    status: Some(ReturnStatus::Pending),
                    requested_at: Some(e.requested_at),
                    processed_at: None,
                };
                self.updated_at = e.requested_at;
            }
            OrderEvent::ReturnResolved(e) => {
                self.return_request.status = Some(e.decision.into());
                self.return_request.processed_at = Some(e.processed_at);
                if let Some(update) = &e.update {
                    self.status = update.status;
                    self.tracking.updates.push(update.clone());
                }
                self.updated_at = e.processed_at;
            }
            OrderEvent::PaymentRecorded(e) => {
                self.payment.status = e.status;
                if e.transaction_id.is_some() {
                    self.payment.transaction_id = e.transaction_id.clone();
                }
                if e.status == PaymentStatus::Completed {
                    self.payment.paid_at = Some(e.recorded_at);
                }
                self.updated_at = e.recorded_at;
            }
        }
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let now = Utc::now();

        match command {
            OrderCommand::TransitionStatus { to, tracking } => {
                if !self.status.can_transition_to(*to) {
                    return Err(OrderError::InvalidTransition {
                        from: self.status,
                        to: *to,
                    });
                }

                Ok(vec![OrderEvent::StatusChanged(OrderStatusChanged {
                    from: self.status,
                    to: *to,
                    update: Self::tracking_update(*to, tracking.as_ref(), now),
                    tracking_info: tracking.clone(),
                })])
            }

            OrderCommand::RequestReturn { customer_id, reason } => {
                self.check_return_request(*customer_id)?;

                Ok(vec![OrderEvent::ReturnRequested(OrderReturnRequested {
                    reason: reason.clone(),
                    requested_at: now,
                })])
            }

            OrderCommand::ResolveReturn { decision } => {
                self.check_return_resolution(*decision)?;

                let update = (*decision == ReturnDecision::Completed).then(|| TrackingUpdate {
                    status: OrderStatus::Returned,
                    message: "Order returned".to_string(),
                    location: None,
                    timestamp: now,
                });

                Ok(vec![OrderEvent::ReturnResolved(OrderReturnResolved {
                    decision: *decision,
                    processed_at: now,
                    update,
                })])
            }

            OrderCommand::RecordPayment { status, transaction_id } => {
                self.check_payment(*status)?;

                Ok(vec![OrderEvent::PaymentRecorded(OrderPaymentRecorded {
                    status: *status,
                    transaction_id: transaction_id.clone(),
                    recorded_at: now,
                })])
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
