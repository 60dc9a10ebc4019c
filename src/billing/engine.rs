//! Billing computation.

use thiserror::Error;
use uuid::Uuid;

use crate::billing::types::{Billing, Purchase};

/// Reasons a purchase cannot be billed. All of them are the caller's fault.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PurchaseError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("item_count must not be negative, got {0}")]
    NegativeItemCount(i64),

    #[error("cost_spend must be a finite number")]
    NonFiniteCost,

    #[error("billing amount overflows for cost_spend {cost_spend} and item_count {item_count}")]
    Overflow { cost_spend: f64, item_count: i64 },
}

/// Validate a purchase and compute `cost_spend * item_count`.
pub fn compute_billing(purchase: &Purchase) -> Result<Billing, PurchaseError> {
    let cost_spend = purchase
        .cost_spend
        .ok_or(PurchaseError::MissingField("cost_spend"))?;
    let item_count = purchase
        .item_count
        .ok_or(PurchaseError::MissingField("item_count"))?;

    if !cost_spend.is_finite() {
        return Err(PurchaseError::NonFiniteCost);
    }
    if item_count < 0 {
        return Err(PurchaseError::NegativeItemCount(item_count));
    }

    let billing_amount = cost_spend * item_count as f64;
    if !billing_amount.is_finite() {
        return Err(PurchaseError::Overflow {
            cost_spend,
            item_count,
        });
    }

    Ok(Billing {
        id: Uuid::new_v4(),
        username: purchase.username.clone(),
        email: purchase.email.clone(),
        cost_spend,
        item_count,
        billing_amount,
    })
}
