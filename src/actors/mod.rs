// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for asynchronous, concurrent operations.
//
// - notification_hub - per-order channel registry and fan-out
//
// Note: Order lifecycle logic runs in the command handler, NOT in actors.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

mod notification_hub;

pub use notification_hub::{
    JoinOrder, LeaveOrder, NotificationHub, Publish, SubscriberCount, Subscription,
};
