//! Batch serialization.
//!
//! A batch is newline-delimited JSON: a metadata line describing the service,
//! followed by one line per event keyed by its kind.

use serde::Serialize;

use crate::telemetry::record::TelemetryEvent;

/// Service description sent at the head of every batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceMetadata {
    pub name: String,
    pub version: String,
    pub environment: String,
}

#[derive(Serialize)]
struct MetadataLine<'a> {
    metadata: MetadataBody<'a>,
}

#[derive(Serialize)]
struct MetadataBody<'a> {
    service: &'a ServiceMetadata,
}

/// Encodes batches of events into collector payloads.
#[derive(Debug, Clone)]
pub struct BatchEncoder {
    metadata: ServiceMetadata,
}

impl BatchEncoder {
    pub fn new(metadata: ServiceMetadata) -> Self {
        Self { metadata }
    }

    pub fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    /// Serialize one event as a single JSON line (without the trailing newline).
    pub fn encode_event(&self, event: &TelemetryEvent) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(event)
    }

    /// Serialize a whole batch.
    pub fn encode(&self, batch: &[TelemetryEvent]) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = serde_json::to_vec(&MetadataLine {
            metadata: MetadataBody { service: &self.metadata },
        })?;
        out.push(b'\n');

        for event in batch {
            out.extend(self.encode_event(event)?);
            out.push(b'\n');
        }
        Ok(out)
    }
}
