//! Request correlation context.
//!
//! A [`CorrelationContext`] carries the transaction, trace and span ids for one
//! inbound request. Ids never change after creation; custom fields and labels
//! may only grow.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::telemetry::field::{FieldValue, Fields};

/// Information about the user on whose behalf a request runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Correlation ids and additive metadata for one logical operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationContext {
    transaction_id: String,
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
    #[serde(skip_serializing_if = "Fields::is_empty")]
    custom_fields: Fields,
    #[serde(skip_serializing_if = "Fields::is_empty")]
    labels: Fields,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<UserContext>,
}

impl CorrelationContext {
    /// Create a context with fresh transaction, trace and span ids.
    pub fn new() -> Self {
        Self {
            transaction_id: generate_span_id(),
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            parent_span_id: None,
            custom_fields: Fields::new(),
            labels: Fields::new(),
            user: None,
        }
    }

    /// Continue a trace started elsewhere, from a W3C `traceparent` header.
    ///
    /// Returns `None` when the header is malformed, uses an unknown version
    /// or carries all-zero ids.
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        if version != "00"
            || !is_lower_hex(trace_id, 32)
            || !is_lower_hex(parent_id, 16)
            || !is_lower_hex(flags, 2)
            || trace_id.bytes().all(|b| b == b'0')
            || parent_id.bytes().all(|b| b == b'0')
        {
            return None;
        }

        Some(Self {
            trace_id: trace_id.to_string(),
            parent_span_id: Some(parent_id.to_string()),
            ..Self::new()
        })
    }

    /// Derive a child context for a nested operation.
    ///
    /// The child shares the transaction and trace ids, gets a new span id and
    /// records the current span as its parent.
    pub fn with_span(&self) -> Self {
        Self {
            span_id: generate_span_id(),
            parent_span_id: Some(self.span_id.clone()),
            ..self.clone()
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    pub fn custom_fields(&self) -> &Fields {
        &self.custom_fields
    }

    pub fn labels(&self) -> &Fields {
        &self.labels
    }

    pub fn user(&self) -> Option<&UserContext> {
        self.user.as_ref()
    }

    /// Add a custom field. An existing key keeps its first value.
    ///
    /// Returns `true` if the field was added.
    pub fn insert_custom(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> bool {
        insert_absent(&mut self.custom_fields, key.into(), value.into())
    }

    /// Add a label. An existing key keeps its first value.
    pub fn insert_label(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> bool {
        insert_absent(&mut self.labels, key.into(), value.into())
    }

    /// Attach user information, replacing any earlier value.
    pub fn set_user(&mut self, user: UserContext) {
        self.user = Some(user);
    }

    /// Render this context as an outgoing `traceparent` header value.
    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_absent(map: &mut Fields, key: String, value: FieldValue) -> bool {
    match map.entry(key) {
        std::collections::btree_map::Entry::Occupied(_) => false,
        std::collections::btree_map::Entry::Vacant(slot) => {
            slot.insert(value.normalized());
            true
        }
    }
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// 128-bit trace id as 32 lowercase hex chars.
pub(crate) fn generate_trace_id() -> String {
    let id: u128 = rand::thread_rng().gen_range(1..=u128::MAX);
    format!("{id:032x}")
}

/// 64-bit span/transaction id as 16 lowercase hex chars.
pub(crate) fn generate_span_id() -> String {
    let id: u64 = rand::thread_rng().gen_range(1..=u64::MAX);
    format!("{id:016x}")
}
