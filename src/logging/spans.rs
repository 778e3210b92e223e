//! Structured spans for the alignment cascade
//!
//! One `alignment` span per call and one `strategy` span per executed strategy,
//! both carrying the call's `alignment_id` so interleaved batch logs can be
//! pulled apart again.

use crate::pipeline::{ImageSize, Offset, StrategyId, StrategyResult};
use std::time::Instant;
use tracing::{field, info_span, span::Entered, Span};
use uuid::Uuid;

/// Span covering one whole `align` call.
pub struct AlignmentSpan {
    span: Span,
    start_time: Instant,
}

impl AlignmentSpan {
    pub fn new(alignment_id: Uuid, reference: ImageSize, target: ImageSize, method: &str) -> Self {
        let span = info_span!(
            "alignment",
            alignment_id = %alignment_id,
            method = method,
            reference_size = %reference,
            target_size = %target,
            winner = field::Empty,
            offset_x = field::Empty,
            offset_y = field::Empty,
            elapsed_ms = field::Empty,
        );
        Self {
            span,
            start_time: Instant::now(),
        }
    }

    pub fn enter(&self) -> Entered<'_> {
        self.span.enter()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Record the winning strategy and the offset that will be applied.
    pub fn record_winner(&self, winner: StrategyId, offset: Offset, score: Option<f64>) {
        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        self.span.record("winner", winner.as_str());
        self.span.record("offset_x", offset.x);
        self.span.record("offset_y", offset.y);
        self.span.record("elapsed_ms", elapsed_ms);

        tracing::info!(
            parent: &self.span,
            winner = %winner,
            offset = %offset,
            score = score,
            elapsed_ms = elapsed_ms,
            "Alignment resolved"
        );
    }
}

/// Span for one strategy execution.
pub struct StrategySpan {
    span: Span,
    start_time: Instant,
}

impl StrategySpan {
    pub fn new(strategy: StrategyId, alignment_id: Uuid) -> Self {
        let span = info_span!(
            target: "ui_align::algorithms",
            "strategy",
            strategy = strategy.as_str(),
            alignment_id = %alignment_id,
            score = field::Empty,
            offset_x = field::Empty,
            offset_y = field::Empty,
            failed = field::Empty,
        );
        Self {
            span,
            start_time: Instant::now(),
        }
    }

    pub fn enter(&self) -> Entered<'_> {
        self.span.enter()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() * 1000.0
    }

    pub fn record_candidate(&self, result: &StrategyResult) {
        self.span.record("score", result.score);
        self.span.record("offset_x", result.offset.x);
        self.span.record("offset_y", result.offset.y);
        self.span.record("failed", false);
    }

    pub fn record_failure(&self) {
        self.span.record("failed", true);
    }
}
