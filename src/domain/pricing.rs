use rust_decimal::Decimal;

use crate::domain::order::{OrderError, OrderLine, Pricing};

// ============================================================================
// Pricing Engine
// ============================================================================
//
// Pure function of the line snapshot and the configured policy. Values are
// kept at full decimal precision; rounding happens only for display
// (`Pricing::rounded`).
//
// ============================================================================

/// Flat shipping fee and flat tax rate applied to every order.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingPolicy {
    pub shipping_flat_rate: Decimal,
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            shipping_flat_rate: Decimal::new(599, 2),
            tax_rate: Decimal::new(10, 2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricingEngine {
    policy: PricingPolicy,
}

impl PricingEngine {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn compute(&self, items: &[OrderLine]) -> Result<Pricing, OrderError> {
        self.compute_with_discount(items, Decimal::ZERO)
    }

    pub fn compute_with_discount(
        &self,
        items: &[OrderLine],
        discount: Decimal,
    ) -> Result<Pricing, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let mut errors = Vec::new();
        for (index, line) in items.iter().enumerate() {
            if line.quantity == 0 {
                errors.push(format!("items[{}].quantity must be greater than 0", index));
            }
            if line.unit_price.is_sign_negative() {
                errors.push(format!("items[{}].unitPriceAtPurchase must not be negative", index));
            }
        }
        if discount.is_sign_negative() {
            errors.push("discount must not be negative".to_string());
        }
        if !errors.is_empty() {
            return Err(OrderError::InvalidRequest(errors));
        }

        let subtotal: Decimal = items.iter().map(OrderLine::line_total).sum();
        let shipping = self.policy.shipping_flat_rate;
        let tax = subtotal * self.policy.tax_rate;
        let gross = subtotal + shipping + tax;

        if discount > gross {
            return Err(OrderError::InvalidRequest(vec![format!(
                "discount {} exceeds order value {}",
                discount, gross
            )]));
        }

        Ok(Pricing {
            subtotal,
            shipping,
            tax,
            discount,
            total: gross - discount,
        })
    }
}
