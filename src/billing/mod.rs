//! Checkout billing.

pub mod engine;
pub mod types;

pub use engine::{compute_billing, PurchaseError};
pub use types::{Billing, Purchase};
