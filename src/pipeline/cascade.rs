//! Cascade controller.
//!
//! The escalation policy is an ordered table of `(precondition, strategy)`
//! steps. Each precondition sees the image sizes, the requested method and the
//! running best candidate; when it returns a reason the step is skipped. A
//! strategy error never ends the cascade, it just means no candidate.

use crate::algorithms::{self, FeatureCandidate, FeatureParams};
use crate::config::{CascadeConfig, Config};
use crate::engine::{FeatureEngine, ImageEngine};
use crate::logging::StrategySpan;
use crate::pipeline::{
    AlignMethod, AlignOptions, AttemptOutcome, ImageSize, Offset, StrategyAttempt, StrategyId,
    StrategyObserver, StrategyResult,
};
use crate::Result;
use uuid::Uuid;

/// What a precondition gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct CascadeContext<'a> {
    pub method: AlignMethod,
    pub reference: ImageSize,
    pub target: ImageSize,
    pub best: Option<&'a StrategyResult>,
    pub thresholds: &'a CascadeConfig,
}

/// `Err(reason)` skips the step.
pub type Precondition = fn(&CascadeContext<'_>) -> std::result::Result<(), String>;

pub type StrategyFn<E> = fn(
    &E,
    &Config,
    &<E as ImageEngine>::Image,
    &<E as ImageEngine>::Image,
) -> Result<StrategyResult>;

pub struct CascadeStep<E: ImageEngine> {
    pub strategy: StrategyId,
    pub precondition: Precondition,
    pub run: StrategyFn<E>,
}

/// The translation-only steps in the order they are tried.
pub fn translation_steps<E: ImageEngine>() -> Vec<CascadeStep<E>> {
    vec![
        CascadeStep {
            strategy: StrategyId::TargetInReference,
            precondition: target_fits_reference,
            run: run_target_in_reference::<E>,
        },
        CascadeStep {
            strategy: StrategyId::ReferenceInTarget,
            precondition: reference_fits_target,
            run: run_reference_in_target::<E>,
        },
        CascadeStep {
            strategy: StrategyId::EdgeBased,
            precondition: edge_gate,
            run: run_edge_based::<E>,
        },
        CascadeStep {
            strategy: StrategyId::CroppedRegion,
            precondition: crop_gate,
            run: run_cropped_region::<E>,
        },
        CascadeStep {
            strategy: StrategyId::MultiScale,
            precondition: multiscale_gate,
            run: run_multi_scale::<E>,
        },
        CascadeStep {
            strategy: StrategyId::PhaseCorrelation,
            precondition: phase_requested_or_unresolved,
            run: run_correlation_fallback::<E>,
        },
    ]
}

fn run_target_in_reference<E: ImageEngine>(
    engine: &E,
    _: &Config,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    algorithms::target_in_reference(engine, reference, target)
}

fn run_reference_in_target<E: ImageEngine>(
    engine: &E,
    _: &Config,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    algorithms::reference_in_target(engine, reference, target)
}

fn run_edge_based<E: ImageEngine>(
    engine: &E,
    config: &Config,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    algorithms::edge_based(engine, &config.edge, reference, target)
}

fn run_cropped_region<E: ImageEngine>(
    engine: &E,
    config: &Config,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    algorithms::cropped_region(engine, &config.crop, reference, target)
}

fn run_multi_scale<E: ImageEngine>(
    engine: &E,
    config: &Config,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    algorithms::multi_scale(engine, &config.multiscale, reference, target)
}

fn run_correlation_fallback<E: ImageEngine>(
    engine: &E,
    _: &Config,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    algorithms::correlation_fallback(engine, reference, target)
}

fn target_fits_reference(ctx: &CascadeContext<'_>) -> std::result::Result<(), String> {
    if ctx.target.fits_within(ctx.reference) {
        Ok(())
    } else {
        Err(format!(
            "target {} does not fit inside reference {}",
            ctx.target, ctx.reference
        ))
    }
}

fn reference_fits_target(ctx: &CascadeContext<'_>) -> std::result::Result<(), String> {
    if ctx.reference.fits_within(ctx.target) {
        Ok(())
    } else {
        Err(format!(
            "reference {} does not fit inside target {}",
            ctx.reference, ctx.target
        ))
    }
}

/// Runs when nothing has been found yet or the best score is above `threshold`.
fn escalate_above(
    best: Option<&StrategyResult>,
    threshold: f64,
) -> std::result::Result<(), String> {
    match best {
        Some(best) if best.score <= threshold => Err(format!(
            "{} already scored {:.3} (escalation threshold {})",
            best.method, best.score, threshold
        )),
        _ => Ok(()),
    }
}

fn edge_gate(ctx: &CascadeContext<'_>) -> std::result::Result<(), String> {
    escalate_above(ctx.best, ctx.thresholds.edge_escalation_score)
}

fn crop_gate(ctx: &CascadeContext<'_>) -> std::result::Result<(), String> {
    escalate_above(ctx.best, ctx.thresholds.crop_escalation_score)
}

fn multiscale_gate(ctx: &CascadeContext<'_>) -> std::result::Result<(), String> {
    escalate_above(ctx.best, ctx.thresholds.multiscale_escalation_score)
}

fn phase_requested_or_unresolved(ctx: &CascadeContext<'_>) -> std::result::Result<(), String> {
    match ctx.best {
        Some(best) if ctx.method != AlignMethod::Phase => Err(format!(
            "{} already produced a candidate",
            best.method
        )),
        _ => Ok(()),
    }
}

/// Result of running every eligible step.
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub best: Option<StrategyResult>,
    /// Set only when the feature strategy short-circuited the cascade.
    pub feature: Option<FeatureCandidate>,
    pub attempts: Vec<StrategyAttempt>,
}

impl CascadeOutcome {
    /// Identity when nothing matched.
    pub fn offset(&self) -> Offset {
        self.best.map_or(Offset::ZERO, |b| b.offset)
    }

    pub fn winner(&self) -> StrategyId {
        self.best.map_or(StrategyId::None, |b| b.method)
    }

    pub fn score(&self) -> Option<f64> {
        self.best.map(|b| b.score)
    }
}

/// One cascade run for one image pair.
pub struct Cascade<'a, E: FeatureEngine> {
    engine: &'a E,
    config: &'a Config,
    observer: &'a dyn StrategyObserver,
    alignment_id: Uuid,
    attempts: Vec<StrategyAttempt>,
}

impl<'a, E: FeatureEngine> Cascade<'a, E> {
    pub fn new(
        engine: &'a E,
        config: &'a Config,
        observer: &'a dyn StrategyObserver,
        alignment_id: Uuid,
    ) -> Self {
        Self {
            engine,
            config,
            observer,
            alignment_id,
            attempts: Vec::new(),
        }
    }

    pub fn run(
        mut self,
        reference: &E::Image,
        target: &E::Image,
        options: &AlignOptions,
    ) -> CascadeOutcome {
        if options.method == AlignMethod::Opencv {
            if let Some(candidate) = self.try_feature(reference, target, options) {
                return CascadeOutcome {
                    best: Some(candidate.result),
                    feature: Some(candidate),
                    attempts: self.attempts,
                };
            }
        } else {
            self.record(
                StrategyId::FeatureHomography,
                AttemptOutcome::Skipped {
                    reason: format!("feature matching is opt-in, method is {}", options.method),
                },
                0.0,
            );
        }

        let reference_size = self.engine.dimensions(reference);
        let target_size = self.engine.dimensions(target);
        let mut best: Option<StrategyResult> = None;

        for step in translation_steps::<E>() {
            let ctx = CascadeContext {
                method: options.method,
                reference: reference_size,
                target: target_size,
                best: best.as_ref(),
                thresholds: &self.config.cascade,
            };
            if let Err(reason) = (step.precondition)(&ctx) {
                self.record(step.strategy, AttemptOutcome::Skipped { reason }, 0.0);
                continue;
            }

            let span = StrategySpan::new(step.strategy, self.alignment_id);
            let result = {
                let _guard = span.enter();
                (step.run)(self.engine, self.config, reference, target)
            };

            match result {
                Ok(candidate) if candidate.score.is_finite() => {
                    span.record_candidate(&candidate);
                    // Ties keep the earlier, cheaper strategy.
                    let improved = best.map_or(true, |b| candidate.score < b.score);
                    if improved {
                        best = Some(candidate);
                    }
                    self.record(
                        step.strategy,
                        AttemptOutcome::Candidate {
                            score: candidate.score,
                            offset: candidate.offset,
                            improved,
                        },
                        span.elapsed_ms(),
                    );
                }
                Ok(candidate) => {
                    span.record_failure();
                    self.record(
                        step.strategy,
                        AttemptOutcome::Failed {
                            reason: format!("non-finite score {}", candidate.score),
                        },
                        span.elapsed_ms(),
                    );
                }
                Err(e) => {
                    span.record_failure();
                    self.record(
                        step.strategy,
                        AttemptOutcome::Failed {
                            reason: format!("{:#}", e),
                        },
                        span.elapsed_ms(),
                    );
                }
            }
        }

        CascadeOutcome {
            best,
            feature: None,
            attempts: self.attempts,
        }
    }

    /// Returns the candidate only when it is confident enough to end the cascade.
    fn try_feature(
        &mut self,
        reference: &E::Image,
        target: &E::Image,
        options: &AlignOptions,
    ) -> Option<FeatureCandidate> {
        let params = FeatureParams::from_config(
            &self.config.feature,
            options.opencv_detector,
            options.threshold,
        );
        let span = StrategySpan::new(StrategyId::FeatureHomography, self.alignment_id);
        let result = {
            let _guard = span.enter();
            algorithms::feature_homography(self.engine, &params, reference, target)
        };

        let required = self.config.cascade.feature_short_circuit_confidence;
        match result {
            Ok(candidate) if candidate.confidence() > required => {
                span.record_candidate(&candidate.result);
                self.record(
                    StrategyId::FeatureHomography,
                    AttemptOutcome::Candidate {
                        score: candidate.result.score,
                        offset: candidate.result.offset,
                        improved: true,
                    },
                    span.elapsed_ms(),
                );
                Some(candidate)
            }
            Ok(candidate) => {
                span.record_failure();
                self.record(
                    StrategyId::FeatureHomography,
                    AttemptOutcome::Failed {
                        reason: format!(
                            "confidence {:.3} not above {}",
                            candidate.confidence(),
                            required
                        ),
                    },
                    span.elapsed_ms(),
                );
                None
            }
            Err(e) => {
                span.record_failure();
                self.record(
                    StrategyId::FeatureHomography,
                    AttemptOutcome::Failed {
                        reason: format!("{:#}", e),
                    },
                    span.elapsed_ms(),
                );
                None
            }
        }
    }

    fn record(&mut self, strategy: StrategyId, outcome: AttemptOutcome, elapsed_ms: f64) {
        let attempt = StrategyAttempt {
            strategy,
            outcome,
            elapsed_ms,
        };
        self.observer.on_attempt(self.alignment_id, &attempt);
        self.attempts.push(attempt);
    }
}
