use uuid::Uuid;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Cart items are required")]
    EmptyCart,

    #[error("Invalid shipping address: missing {}", .0.join(", "))]
    InvalidAddress(Vec<String>),

    #[error("Invalid order request: {}", .0.join("; "))]
    InvalidRequest(Vec<String>),

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Product {0} is no longer available")]
    ProductInactive(Uuid),

    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: Uuid,
        available: u32,
        requested: u32,
    },

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    InvalidState(String),

    #[error("Return already requested for order {0}")]
    DuplicateRequest(Uuid),

    #[error("Order {0} was modified concurrently")]
    ConcurrentModification(Uuid),

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Could not allocate a unique order number after {0} attempts")]
    OrderNumberExhausted(u32),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Coarse classification used by the HTTP layer and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Authorization,
    Transient,
    Internal,
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyCart
            | OrderError::InvalidAddress(_)
            | OrderError::InvalidRequest(_)
            | OrderError::InvalidState(_) => ErrorKind::Validation,
            OrderError::ProductNotFound(_) | OrderError::OrderNotFound(_) => ErrorKind::NotFound,
            OrderError::ProductInactive(_)
            | OrderError::InsufficientStock { .. }
            | OrderError::InvalidTransition { .. }
            | OrderError::DuplicateRequest(_) => ErrorKind::Conflict,
            OrderError::NotAuthorized => ErrorKind::Authorization,
            OrderError::ConcurrentModification(_)
            | OrderError::UpstreamTimeout(_)
            | OrderError::UpstreamUnavailable(_) => ErrorKind::Transient,
            OrderError::OrderNumberExhausted(_) | OrderError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Every individual violation carried by a validation error
    pub fn violations(&self) -> Vec<String> {
        match self {
            OrderError::InvalidAddress(fields) => fields
                .iter()
                .map(|f| format!("shippingAddress.{} is required", f))
                .collect(),
            OrderError::InvalidRequest(errors) => errors.clone(),
            _ => Vec::new(),
        }
    }

    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::EmptyCart => "empty_cart",
            OrderError::InvalidAddress(_) => "invalid_address",
            OrderError::InvalidRequest(_) => "invalid_request",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::ProductInactive(_) => "product_inactive",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::NotAuthorized => "not_authorized",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::InvalidState(_) => "invalid_state",
            OrderError::DuplicateRequest(_) => "duplicate_request",
            OrderError::ConcurrentModification(_) => "concurrent_modification",
            OrderError::UpstreamTimeout(_) => "upstream_timeout",
            OrderError::UpstreamUnavailable(_) => "upstream_unavailable",
            OrderError::OrderNumberExhausted(_) => "order_number_exhausted",
            OrderError::Storage(_) => "storage",
        }
    }
}
