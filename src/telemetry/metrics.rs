//! Metric instrument factories for phrasegen.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("phrasegen")
}

/// Counter: work items that finished dispatch.
/// Labels: `outcome` ("completed" | "timeout" | "failed" | "cancelled").
pub fn items_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("phrasegen.items.dispatched")
        .with_description("Work items that finished dispatch, by outcome")
        .build()
}

/// Counter: output records produced by the generation service.
pub fn records_generated() -> Counter<u64> {
    meter()
        .u64_counter("phrasegen.records.generated")
        .with_description("Output records produced")
        .build()
}

/// Counter: lines written by a buffered writer.
/// Labels: `sink`.
pub fn lines_flushed() -> Counter<u64> {
    meter()
        .u64_counter("phrasegen.writer.lines_flushed")
        .with_description("Lines written to a buffered log")
        .build()
}

/// Histogram: generate call duration in milliseconds.
/// Labels: `outcome`.
pub fn generate_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("phrasegen.generate.duration_ms")
        .with_description("Generate call duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: LLM token usage.
/// Labels: `model`, `direction` ("input" | "output").
pub fn llm_tokens() -> Counter<u64> {
    meter()
        .u64_counter("phrasegen.llm.tokens")
        .with_description("LLM token usage")
        .build()
}
