// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderLine, Pricing, OrderStatus, Tracking, ...)
// - Events (OrderPlaced, OrderStatusChanged, ...)
// - Commands (PlaceOrder, OrderCommand)
// - Errors (OrderError enum)
// - Aggregate (Order with the state machine)
// - Command Handler (OrderLifecycle)
// - Returns and payment signals
// - Queries (owner view, customer listing, public tracking)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod number;
pub mod command_handler;
pub mod returns;
pub mod queries;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::{NewOrder, Order};
pub use number::OrderNumberGenerator;
pub use command_handler::{LifecycleSettings, OrderLifecycle};
pub use queries::{OrderPage, OrderQueries, TrackingView};
