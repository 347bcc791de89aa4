use std::collections::HashMap;
use std::sync::Arc;

use actix::prelude::*;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::messaging::OrderUpdate;
use crate::metrics::Metrics;

// ============================================================================
// Notification Hub Actor - Per-order fan-out
// ============================================================================
//
// Owns the registry of per-order channels. Nothing else touches it; callers
// join, leave and publish through messages only.
//
// - Delivery is best-effort: no persistence, no replay
// - A subscriber whose buffer is full misses that update
// - A subscriber whose receiver was dropped is pruned on the next publish
// - Updates for one order reach each subscriber in publish order
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

/// Join an order's channel (`join-order`)
#[derive(Message)]
#[rtype(result = "Subscription")]
pub struct JoinOrder {
    pub order_id: Uuid,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct LeaveOrder {
    pub order_id: Uuid,
    pub subscriber_id: u64,
}

/// Fan an update out to the order's channel; replies with the delivery count
#[derive(Message)]
#[rtype(result = "usize")]
pub struct Publish(pub OrderUpdate);

#[derive(Message)]
#[rtype(result = "usize")]
pub struct SubscriberCount {
    pub order_id: Uuid,
}

pub struct Subscription {
    pub order_id: Uuid,
    pub subscriber_id: u64,
    pub receiver: mpsc::Receiver<OrderUpdate>,
}

// ============================================================================
// Notification Hub Actor
// ============================================================================

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<OrderUpdate>,
}

pub struct NotificationHub {
    channels: HashMap<Uuid, Vec<Subscriber>>,
    next_subscriber_id: u64,
    buffer: usize,
    metrics: Arc<Metrics>,
}

impl NotificationHub {
    pub fn new(buffer: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            channels: HashMap::new(),
            next_subscriber_id: 1,
            buffer: buffer.max(1),
            metrics,
        }
    }
}

impl Actor for NotificationHub {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(buffer = self.buffer, "NotificationHub started");
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Handler<JoinOrder> for NotificationHub {
    type Result = MessageResult<JoinOrder>;

    fn handle(&mut self, msg: JoinOrder, _: &mut Self::Context) -> Self::Result {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let subscriber_id = self.next_subscriber_id;
        self.next_subscriber_id += 1;

        self.channels
            .entry(msg.order_id)
            .or_default()
            .push(Subscriber { id: subscriber_id, sender });

        tracing::debug!(
            order_id = %msg.order_id,
            subscriber_id = subscriber_id,
            "Subscriber joined order channel"
        );

        MessageResult(Subscription {
            order_id: msg.order_id,
            subscriber_id,
            receiver,
        })
    }
}

impl Handler<LeaveOrder> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: LeaveOrder, _: &mut Self::Context) -> Self::Result {
        if let Some(subscribers) = self.channels.get_mut(&msg.order_id) {
            subscribers.retain(|s| s.id != msg.subscriber_id);
            if subscribers.is_empty() {
                self.channels.remove(&msg.order_id);
            }
        }
    }
}

impl Handler<Publish> for NotificationHub {
    type Result = usize;

    fn handle(&mut self, msg: Publish, _: &mut Self::Context) -> Self::Result {
        let update = msg.0;
        let Some(subscribers) = self.channels.get_mut(&update.order_id) else {
            tracing::trace!(order_id = %update.order_id, "No subscribers for order update");
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|subscriber| match subscriber.sender.try_send(update.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    order_id = %update.order_id,
                    subscriber_id = subscriber.id,
                    "Subscriber buffer full, dropping order update"
                );
                self.metrics.notifications_dropped.inc();
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if subscribers.is_empty() {
            self.channels.remove(&update.order_id);
        }

        self.metrics.notifications_delivered.inc_by(delivered as u64);
        tracing::debug!(
            order_id = %update.order_id,
            event = update.event,
            delivered = delivered,
            "Order update fanned out"
        );
        delivered
    }
}

impl Handler<SubscriberCount> for NotificationHub {
    type Result = usize;

    fn handle(&mut self, msg: SubscriberCount, _: &mut Self::Context) -> Self::Result {
        self.channels.get(&msg.order_id).map_or(0, Vec::len)
    }
}
