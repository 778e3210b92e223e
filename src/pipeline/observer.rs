use crate::pipeline::{AttemptOutcome, StrategyAttempt, StrategyId};
use std::sync::Mutex;
use uuid::Uuid;

/// Receives one notification per strategy the cascade considered.
pub trait StrategyObserver: Send + Sync {
    fn on_attempt(&self, alignment_id: Uuid, attempt: &StrategyAttempt);
}

/// Default observer: one structured event per attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl StrategyObserver for TracingObserver {
    fn on_attempt(&self, alignment_id: Uuid, attempt: &StrategyAttempt) {
        let strategy = attempt.strategy.as_str();
        match &attempt.outcome {
            AttemptOutcome::Candidate {
                score,
                offset,
                improved,
            } => tracing::info!(
                target: "ui_align::algorithms",
                alignment_id = %alignment_id,
                strategy,
                score = *score,
                offset = %offset,
                improved = *improved,
                elapsed_ms = attempt.elapsed_ms,
                "Strategy produced a candidate"
            ),
            AttemptOutcome::Failed { reason } => tracing::warn!(
                target: "ui_align::algorithms",
                alignment_id = %alignment_id,
                strategy,
                reason = %reason,
                elapsed_ms = attempt.elapsed_ms,
                "Strategy failed"
            ),
            AttemptOutcome::Skipped { reason } => tracing::debug!(
                target: "ui_align::algorithms",
                alignment_id = %alignment_id,
                strategy,
                reason = %reason,
                "Strategy skipped"
            ),
        }
    }
}

/// Keeps every attempt in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    attempts: Mutex<Vec<(Uuid, StrategyAttempt)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<StrategyAttempt> {
        self.lock().iter().map(|(_, a)| a.clone()).collect()
    }

    pub fn attempts_for(&self, alignment_id: Uuid) -> Vec<StrategyAttempt> {
        self.lock()
            .iter()
            .filter(|(id, _)| *id == alignment_id)
            .map(|(_, a)| a.clone())
            .collect()
    }

    /// Strategies that actually ran, in order.
    pub fn executed(&self) -> Vec<StrategyId> {
        self.lock()
            .iter()
            .filter(|(_, a)| a.was_executed())
            .map(|(_, a)| a.strategy)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Uuid, StrategyAttempt)>> {
        // A panicking observer thread leaves the data intact.
        self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StrategyObserver for RecordingObserver {
    fn on_attempt(&self, alignment_id: Uuid, attempt: &StrategyAttempt) {
        self.lock().push((alignment_id, attempt.clone()));
    }
}

/// Forwards to several observers.
pub struct FanOutObserver(pub Vec<std::sync::Arc<dyn StrategyObserver>>);

impl StrategyObserver for FanOutObserver {
    fn on_attempt(&self, alignment_id: Uuid, attempt: &StrategyAttempt) {
        for observer in &self.0 {
            observer.on_attempt(alignment_id, attempt);
        }
    }
}
