use serde::Deserialize;
use uuid::Uuid;

use super::value_objects::{
    Address, OrderStatus, PaymentMethod, PaymentStatus, ReturnDecision, TrackingInfo,
    VariantSelection,
};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

/// Checkout request. Prices are never taken from the client.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub customer_id: Uuid,
    pub items: Vec<CartItem>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub customer_note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    /// Signed so that zero and negative quantities can be reported as violations
    pub quantity: i64,
    #[serde(default)]
    pub variant: Option<VariantSelection>,
}

/// Commands against an existing order
#[derive(Debug, Clone)]
pub enum OrderCommand {
    TransitionStatus {
        to: OrderStatus,
        tracking: Option<TrackingInfo>,
    },
    RequestReturn {
        customer_id: Uuid,
        reason: String,
    },
    ResolveReturn {
        decision: ReturnDecision,
    },
    RecordPayment {
        status: PaymentStatus,
        transaction_id: Option<String>,
    },
}

impl OrderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::TransitionStatus { .. } => "transition_status",
            OrderCommand::RequestReturn { .. } => "request_return",
            OrderCommand::ResolveReturn { .. } => "resolve_return",
            OrderCommand::RecordPayment { .. } => "record_payment",
        }
    }
}
