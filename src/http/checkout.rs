//! `POST /checkout` handler.

use std::time::Instant;

use axum::{extract::rejection::JsonRejection, Json};

use crate::billing::{compute_billing, Billing, Purchase};
use crate::fields;
use crate::http::error::ApiError;
use crate::observability::metrics;
use crate::telemetry::{Level, Scope, UserContext};

const INVALID_PURCHASE: &str = "InvalidPurchase";

pub async fn checkout(
    scope: Scope,
    payload: Result<Json<Purchase>, JsonRejection>,
) -> Result<Json<Billing>, ApiError> {
    let start = Instant::now();
    let result = process(&scope, payload);
    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status().as_u16(),
    };
    metrics::record_checkout(status, start);
    result.map(Json)
}

fn process(scope: &Scope, payload: Result<Json<Purchase>, JsonRejection>) -> Result<Billing, ApiError> {
    let Json(purchase) = payload.map_err(|rejection| {
        scope.report_error(INVALID_PURCHASE, &rejection, None);
        ApiError::InvalidBody(rejection.body_text())
    })?;

    scope.log(
        Level::Debug,
        "Purchase received",
        Some(fields! {
            "username" => &purchase.username,
            "cost_spend" => purchase.cost_spend,
            "item_count" => purchase.item_count,
        }),
    );

    let billing = compute_billing(&purchase).map_err(|e| {
        scope.log(
            Level::Error,
            "Billing failed",
            Some(fields! {
                "username" => &purchase.username,
                "cost_spend" => purchase.cost_spend,
                "item_count" => purchase.item_count,
                "reason" => e.to_string(),
            }),
        );
        scope.report_error(
            INVALID_PURCHASE,
            &e,
            Some(fields! { "username" => &purchase.username }),
        );
        ApiError::from(e)
    })?;

    scope.label("ecommerce", true);
    scope.label("dollar_value", billing.cost_spend);
    scope.set_user(UserContext {
        id: Some(billing.id.to_string()),
        username: Some(billing.username.clone()),
        email: billing.email.clone(),
    });
    scope.set_custom("billing_amount", billing.billing_amount);

    if billing.billing_amount == 0.0 {
        scope.log(
            Level::Warning,
            "Checkout produced a zero billing amount",
            Some(fields! { "item_count" => billing.item_count, "cost_spend" => billing.cost_spend }),
        );
    }

    scope.capture_message(
        "Billing process for {} succeeded. Amount: {}",
        &[billing.id.to_string().into(), billing.billing_amount.into()],
    );
    scope.log(
        Level::Info,
        "Checkout completed",
        Some(fields! {
            "billing_id" => billing.id.to_string(),
            "billing_amount" => billing.billing_amount,
        }),
    );

    Ok(billing)
}
