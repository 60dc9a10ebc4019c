//! Request-scoped emitter.
//!
//! A [`Scope`] binds a [`Telemetry`] handle to the correlation context of one
//! request. Every log record and captured error produced through it carries a
//! snapshot of that context. Clones share the same context, so metadata added
//! by a handler is visible to the middleware that records the transaction.

use std::error::Error as StdError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::telemetry::context::{CorrelationContext, UserContext};
use crate::telemetry::field::{normalize_fields, FieldValue, Fields};
use crate::telemetry::record::{CapturedError, Level, LogRecord, TelemetryEvent, TransactionRecord};
use crate::telemetry::Telemetry;

/// Telemetry handle bound to one correlation context.
#[derive(Clone)]
pub struct Scope {
    telemetry: Telemetry,
    context: Arc<Mutex<CorrelationContext>>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope").field("context", &*self.lock()).finish()
    }
}

impl Scope {
    pub(crate) fn new(telemetry: Telemetry, context: CorrelationContext) -> Self {
        Self {
            telemetry,
            context: Arc::new(Mutex::new(context)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CorrelationContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Snapshot of the current context.
    pub fn context(&self) -> CorrelationContext {
        self.lock().clone()
    }

    pub fn transaction_id(&self) -> String {
        self.lock().transaction_id().to_string()
    }

    pub fn trace_id(&self) -> String {
        self.lock().trace_id().to_string()
    }

    pub fn span_id(&self) -> String {
        self.lock().span_id().to_string()
    }

    /// A scope for a nested operation: same transaction and trace, new span.
    ///
    /// The child gets its own copy of the context; later additions on either
    /// side are not shared.
    pub fn child_span(&self) -> Scope {
        Scope::new(self.telemetry.clone(), self.lock().with_span())
    }

    /// Attach a label to the transaction and to errors captured afterwards.
    pub fn label(&self, key: impl Into<String>, value: impl Into<FieldValue>) -> bool {
        self.lock().insert_label(key, value)
    }

    /// Attach custom context data. Existing keys are left unchanged.
    pub fn set_custom(&self, key: impl Into<String>, value: impl Into<FieldValue>) -> bool {
        self.lock().insert_custom(key, value)
    }

    pub fn set_user(&self, user: UserContext) {
        self.lock().set_user(user);
    }

    /// Emit a structured log record.
    ///
    /// Records below the configured minimum level are skipped before anything
    /// is built. Never fails.
    pub fn log(&self, level: Level, message: impl Into<String>, fields: Option<Fields>) {
        if !self.telemetry.is_enabled(level) {
            return;
        }

        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            logger: self.telemetry.service_name().to_string(),
            message: message.into(),
            fields: fields.map(normalize_fields).unwrap_or_default(),
            correlation: self.context(),
        };
        mirror_log(&record);
        self.telemetry.enqueue(TelemetryEvent::Log(record));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message, None);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Level::Warning, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message, None);
    }

    pub fn critical(&self, message: impl Into<String>) {
        self.log(Level::Critical, message, None);
    }

    /// Record an error occurrence. Does not affect how the caller handles it.
    pub fn capture_error(
        &self,
        error_kind: impl Into<String>,
        message: impl Into<String>,
        stack_summary: impl Into<String>,
        labels: Option<Fields>,
    ) {
        let captured = CapturedError::new(
            error_kind.into(),
            message.into(),
            stack_summary.into(),
            self.context(),
            labels.map(normalize_fields).unwrap_or_default(),
        );

        tracing::error!(
            transaction_id = %captured.correlation.transaction_id(),
            trace_id = %captured.correlation.trace_id(),
            span_id = %captured.correlation.span_id(),
            error_id = %captured.id,
            kind = %captured.error_kind,
            "{}",
            captured.message
        );
        self.telemetry.enqueue(TelemetryEvent::Error(captured));
    }

    /// Capture a Rust error value at the point of failure.
    ///
    /// The message is the error's `Display` output; the stack summary lists
    /// its `source()` chain, one cause per line.
    pub fn report_error(&self, kind: &str, error: &(dyn StdError + 'static), labels: Option<Fields>) {
        self.capture_error(kind, error.to_string(), source_chain(error), labels);
    }

    /// Emit a parameterised INFO message.
    ///
    /// Each `{}` in `template` is replaced by the next parameter. The raw
    /// template and parameters travel along as fields.
    pub fn capture_message(&self, template: &str, params: &[FieldValue]) {
        if !self.telemetry.is_enabled(Level::Info) {
            return;
        }
        let message = format_params(template, params);
        let mut fields = Fields::new();
        fields.insert("param_message".into(), FieldValue::from(template));
        fields.insert("params".into(), FieldValue::List(params.to_vec()));
        self.log(Level::Info, message, Some(fields));
    }

    /// Record the end of the inbound request this scope belongs to.
    pub fn finish_transaction(&self, name: impl Into<String>, status: u16, duration: Duration) {
        let record = TransactionRecord::new(name.into(), status, duration, self.context());
        tracing::debug!(
            transaction_id = %record.id,
            trace_id = %record.trace_id,
            name = %record.name,
            result = %record.result,
            duration_ms = record.duration_ms,
            "Transaction finished"
        );
        self.telemetry.enqueue(TelemetryEvent::Transaction(record));
    }
}

fn source_chain(error: &(dyn StdError + 'static)) -> String {
    std::iter::successors(error.source(), |e| (*e).source())
        .map(|cause| format!("caused by: {cause}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Substitute `{}` placeholders left to right. Missing parameters leave the
/// placeholder in place; extra parameters are ignored.
pub(crate) fn format_params(template: &str, params: &[FieldValue]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut params = params.iter();
    let mut rest = template;

    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match params.next() {
            Some(p) => out.push_str(&p.to_string()),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// Echo a record to the local subscriber with its correlation ids.
fn mirror_log(record: &LogRecord) {
    let ctx = &record.correlation;
    macro_rules! emit {
        ($lvl:ident) => {
            tracing::$lvl!(
                transaction_id = %ctx.transaction_id(),
                trace_id = %ctx.trace_id(),
                span_id = %ctx.span_id(),
                "{}",
                record.message
            )
        };
    }
    match record.level {
        Level::Debug => emit!(debug),
        Level::Info => emit!(info),
        Level::Warning => emit!(warn),
        Level::Error | Level::Critical => emit!(error),
    }
}
