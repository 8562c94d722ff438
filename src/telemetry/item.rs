//! Work item span helpers.

use tracing::Span;

/// Start a span covering one item's trip through the dispatcher.
///
/// The `item.outcome` field is declared empty and set by [`record_outcome`].
pub fn start_item_span(key: &str, rank: u32) -> Span {
    tracing::info_span!(
        "item.generate",
        "item.key" = key,
        "item.rank" = rank,
        "item.outcome" = tracing::field::Empty,
    )
}

/// Record how the item ended.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("item.outcome", outcome);
}
