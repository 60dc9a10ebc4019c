//! Checkout request and response payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for `POST /checkout`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Price per item.
    #[serde(default)]
    pub cost_spend: Option<f64>,
    #[serde(default)]
    pub item_count: Option<i64>,
}

/// A completed checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Billing {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub cost_spend: f64,
    pub item_count: i64,
    pub billing_amount: f64,
}
