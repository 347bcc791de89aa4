// ============================================================================
// Core - Aggregate and Event Abstractions
// ============================================================================
//
// Generic building blocks shared by domain aggregates:
// - Aggregate: command validation and event application
// - EventEnvelope: event metadata handed to the notification layer
//
// No domain-specific code lives here.
//
// ============================================================================

pub mod aggregate;
pub mod event;

pub use aggregate::Aggregate;
pub use event::{DomainEvent, EventEnvelope};
