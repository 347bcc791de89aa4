use uuid::Uuid;

use super::aggregate::Order;
use super::command_handler::OrderLifecycle;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::value_objects::{Caller, PaymentStatus, ReturnDecision};

// ============================================================================
// Returns and payment signals
// ============================================================================
//
// Post-delivery return requests from the customer, their resolution by an
// administrator, and the opaque payment outcome reported by operations.
//
// ============================================================================

fn require_admin(caller: &Caller) -> Result<(), OrderError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(OrderError::NotAuthorized)
    }
}

impl OrderLifecycle {
    /// Ownership is checked by the aggregate before the delivery state.
    pub async fn request_return(
        &self,
        order_id: Uuid,
        caller: &Caller,
        reason: String,
    ) -> Result<Order, OrderError> {
        let command = OrderCommand::RequestReturn {
            customer_id: caller.user_id,
            reason,
        };
        self.execute(order_id, caller, command, |_| Ok(())).await
    }

    pub async fn resolve_return(
        &self,
        order_id: Uuid,
        caller: &Caller,
        decision: ReturnDecision,
    ) -> Result<Order, OrderError> {
        require_admin(caller)?;
        self.execute(order_id, caller, OrderCommand::ResolveReturn { decision }, |_| Ok(()))
            .await
    }

    pub async fn record_payment(
        &self,
        order_id: Uuid,
        caller: &Caller,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> Result<Order, OrderError> {
        require_admin(caller)?;
        let command = OrderCommand::RecordPayment {
            status,
            transaction_id,
        };
        self.execute(order_id, caller, command, |_| Ok(())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::command_handler::tests::{checkout, harness, Harness};
    use crate::domain::order::{OrderStatus, ReturnStatus, Role};
    use crate::messaging::ORDER_UPDATED;
    use rust_decimal::Decimal;

    async fn placed(h: &Harness, customer: Uuid) -> Order {
        let a = h.stock(5, Decimal::new(20, 0)).await;
        h.lifecycle.place_order(checkout(customer, &[(&a, 1)])).await.unwrap()
    }

    async fn advance(h: &Harness, order: &Order, to: &[OrderStatus]) {
        let seller = Caller::new(order.items[0].seller_id, Role::Seller);
        for status in to {
            h.lifecycle
                .transition_status(order.id, &seller, *status, None)
                .await
                .unwrap();
        }
    }

    fn admin() -> Caller {
        Caller::new(Uuid::new_v4(), Role::Admin)
    }

    #[tokio::test]
    async fn test_return_only_after_delivery_and_only_once() {
        let h = harness();
        let customer = Uuid::new_v4();
        let owner = Caller::new(customer, Role::Customer);
        let order = placed(&h, customer).await;
        advance(&h, &order, &[OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped]).await;

        let early = h.lifecycle.request_return(order.id, &owner, "Too small".to_string()).await;
        assert!(matches!(early, Err(OrderError::InvalidState(_))));

        advance(&h, &order, &[OrderStatus::Delivered]).await;
        let requested = h
            .lifecycle
            .request_return(order.id, &owner, "Too small".to_string())
            .await
            .unwrap();
        assert!(requested.return_request.requested);
        assert_eq!(requested.return_request.status, Some(ReturnStatus::Pending));
        assert!(requested.return_request.requested_at.is_some());

        let again = h.lifecycle.request_return(order.id, &owner, "Still small".to_string()).await;
        assert!(matches!(again, Err(OrderError::DuplicateRequest(id)) if id == order.id));

        let last = h.publisher.updates().pop().unwrap();
        assert_eq!(last.event, ORDER_UPDATED);
        assert_eq!(last.event_type, "OrderReturnRequested");
    }

    #[tokio::test]
    async fn test_return_by_someone_else_not_authorized() {
        let h = harness();
        let order = placed(&h, Uuid::new_v4()).await;

        // Not delivered either, but ownership is reported first
        let stranger = Caller::new(Uuid::new_v4(), Role::Customer);
        let result = h.lifecycle.request_return(order.id, &stranger, "Mine now".to_string()).await;

        assert!(matches!(result, Err(OrderError::NotAuthorized)));
    }

    #[tokio::test]
    async fn test_completed_return_marks_order_returned() {
        let h = harness();
        let customer = Uuid::new_v4();
        let order = placed(&h, customer).await;
        advance(
            &h,
            &order,
            &[
                OrderStatus::Confirmed,
                OrderStatus::Processing,
                OrderStatus::Shipped,
                OrderStatus::Delivered,
            ],
        )
        .await;
        h.lifecycle
            .request_return(order.id, &Caller::new(customer, Role::Customer), "Broken".to_string())
            .await
            .unwrap();

        let seller = Caller::new(order.items[0].seller_id, Role::Seller);
        let denied = h.lifecycle.resolve_return(order.id, &seller, ReturnDecision::Approved).await;
        assert!(matches!(denied, Err(OrderError::NotAuthorized)));

        h.lifecycle
            .resolve_return(order.id, &admin(), ReturnDecision::Approved)
            .await
            .unwrap();
        let done = h
            .lifecycle
            .resolve_return(order.id, &admin(), ReturnDecision::Completed)
            .await
            .unwrap();

        assert_eq!(done.status, OrderStatus::Returned);
        assert_eq!(done.return_request.status, Some(ReturnStatus::Completed));
        assert!(done.return_request.processed_at.is_some());
        assert_eq!(done.tracking.updates.last().unwrap().status, OrderStatus::Returned);
    }

    #[tokio::test]
    async fn test_payment_signal_is_admin_only() {
        let h = harness();
        let customer = Uuid::new_v4();
        let order = placed(&h, customer).await;

        let owner = Caller::new(customer, Role::Customer);
        let denied = h
            .lifecycle
            .record_payment(order.id, &owner, PaymentStatus::Completed, None)
            .await;
        assert!(matches!(denied, Err(OrderError::NotAuthorized)));

        let paid = h
            .lifecycle
            .record_payment(order.id, &admin(), PaymentStatus::Completed, Some("txn_123".to_string()))
            .await
            .unwrap();
        assert_eq!(paid.payment.status, PaymentStatus::Completed);
        assert_eq!(paid.payment.transaction_id.as_deref(), Some("txn_123"));
        assert!(paid.payment.paid_at.is_some());
        assert_eq!(paid.status, OrderStatus::Pending);

        let invalid = h
            .lifecycle
            .record_payment(order.id, &admin(), PaymentStatus::Failed, None)
            .await;
        assert!(matches!(invalid, Err(OrderError::InvalidState(_))));
    }
}
