use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::errors::ApiError;

use crate::domain::order::{
    Address, CartItem, Order, OrderPage, OrderStatus, PaymentMethod, PaymentStatus, PlaceOrder,
    ReturnDecision, TrackingInfo,
};
use crate::store::OrderFilter;

// ============================================================================
// Request bodies
// ============================================================================

/// Checkout body. Decoded field by field so that every malformed field is
/// reported in one response.
#[derive(Debug)]
pub struct CreateOrderRequest {
    pub items: Vec<CartItem>,
    /// Absent address is reported field by field like a partial one
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub customer_note: Option<String>,
}

impl CreateOrderRequest {
    pub fn parse(body: Value) -> Result<Self, ApiError> {
        let Value::Object(mut fields) = body else {
            return Err(ApiError::BadRequest(vec![
                "request body must be a JSON object".to_string(),
            ]));
        };
        let mut errors = Vec::new();

        let items = match fields.remove("items") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(raw)) => raw
                .into_iter()
                .enumerate()
                .filter_map(|(index, item)| decode(&format!("items[{}]", index), item, &mut errors))
                .collect(),
            Some(_) => {
                errors.push("items must be an array".to_string());
                Vec::new()
            }
        };
        let shipping_address = optional(&mut fields, "shippingAddress", &mut errors);
        let billing_address = optional(&mut fields, "billingAddress", &mut errors);
        let customer_note: Option<String> = optional(&mut fields, "customerNote", &mut errors);
        let payment_method = match fields.remove("paymentMethod") {
            None | Some(Value::Null) => {
                errors.push("paymentMethod is required".to_string());
                None
            }
            Some(raw) => decode("paymentMethod", raw, &mut errors),
        };

        match payment_method {
            Some(payment_method) if errors.is_empty() => Ok(Self {
                items,
                shipping_address,
                billing_address,
                payment_method,
                customer_note,
            }),
            _ => Err(ApiError::BadRequest(errors)),
        }
    }

    pub fn into_command(self, customer_id: Uuid) -> PlaceOrder {
        PlaceOrder {
            customer_id,
            items: self.items,
            shipping_address: self.shipping_address.unwrap_or_default(),
            billing_address: self.billing_address,
            payment_method: self.payment_method,
            customer_note: self.customer_note.filter(|note| !note.trim().is_empty()),
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, raw: Value, errors: &mut Vec<String>) -> Option<T> {
    serde_json::from_value(raw)
        .map_err(|e| errors.push(format!("{}: {}", path, e)))
        .ok()
}

fn optional<T: DeserializeOwned>(
    fields: &mut Map<String, Value>,
    name: &str,
    errors: &mut Vec<String>,
) -> Option<T> {
    match fields.remove(name) {
        None | Some(Value::Null) => None,
        Some(raw) => decode(name, raw, errors),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub tracking_info: Option<TrackingInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnRequestBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveReturnBody {
    pub status: ReturnDecision,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentBody {
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MyOrdersQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl MyOrdersQuery {
    pub fn filter(&self) -> OrderFilter {
        let defaults = OrderFilter::default();
        OrderFilter {
            status: self.status,
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit).min(100),
        }
    }
}

// ============================================================================
// Response shaping
// ============================================================================

/// Money is held at full precision and rounded to cents only for display.
pub fn present(mut order: Order) -> Order {
    order.pricing = order.pricing.rounded();
    order
}

pub fn present_page(mut page: OrderPage) -> OrderPage {
    page.orders = page.orders.into_iter().map(present).collect();
    page
}
