use crate::config::Config;
use crate::engine::{FeatureEngine, OpenCvEngine};
use crate::error::AlignmentError;
use crate::logging::AlignmentSpan;
use crate::pipeline::cascade::{Cascade, CascadeOutcome};
use crate::pipeline::composite::{self, Placement};
use crate::pipeline::{AlignOptions, AlignmentOutcome, StrategyObserver, TracingObserver};
use crate::utils::read_dimensions;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Alignment engine entry point.
///
/// Holds no per-call state, so one instance can serve many workers at once.
pub struct Aligner<E: FeatureEngine = OpenCvEngine> {
    engine: E,
    config: Config,
    observer: Arc<dyn StrategyObserver>,
}

impl Aligner<OpenCvEngine> {
    /// OpenCV-backed aligner with default settings.
    pub fn new() -> Self {
        Self::with_engine(OpenCvEngine::default(), Config::default())
    }

    /// OpenCV-backed aligner; the edge detector picks up `config.edge` thresholds.
    pub fn from_config(config: Config) -> Result<Self, AlignmentError> {
        config.validate().map_err(AlignmentError::InvalidConfig)?;
        let engine = OpenCvEngine::new()
            .with_canny_thresholds(config.edge.canny_low, config.edge.canny_high);
        Ok(Self::with_engine(engine, config))
    }
}

impl Default for Aligner<OpenCvEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: FeatureEngine> Aligner<E> {
    pub fn with_engine(engine: E, config: Config) -> Self {
        Self {
            engine,
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StrategyObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Aligns `target_path` to `reference_path` and writes the result to `output_path`.
    ///
    /// Strategy failures only show up in `attempts`. Errors are limited to
    /// undecodable inputs and a failed final write.
    pub fn align(
        &self,
        reference_path: &Path,
        target_path: &Path,
        output_path: &Path,
        options: &AlignOptions,
    ) -> Result<AlignmentOutcome, AlignmentError> {
        let alignment_id = Uuid::new_v4();
        let reference_size = read_dimensions(reference_path)?;
        let target_size = read_dimensions(target_path)?;

        let span = AlignmentSpan::new(
            alignment_id,
            reference_size,
            target_size,
            options.method.as_str(),
        );
        let _guard = span.enter();
        tracing::info!(
            reference = %reference_path.display(),
            target = %target_path.display(),
            output = %output_path.display(),
            "Starting alignment"
        );

        let reference = self
            .engine
            .load(reference_path)
            .map_err(|e| AlignmentError::decode(reference_path, e))?;
        let target = self
            .engine
            .load(target_path)
            .map_err(|e| AlignmentError::decode(target_path, e))?;

        let outcome = self.run_cascade(alignment_id, &reference, &target, options);
        let offset = outcome.offset();
        let placement = match &outcome.feature {
            Some(candidate) => Placement::Warp {
                homography: &candidate.homography,
                offset,
            },
            None => Placement::Translate(offset),
        };
        let canvas = self.engine.dimensions(&reference);
        let matching_region =
            composite::compose(&self.engine, canvas, &target, placement, output_path)?;

        span.record_winner(outcome.winner(), offset, outcome.score());
        if outcome.best.is_none() {
            tracing::warn!("No strategy produced a candidate, using identity offset");
        }

        Ok(AlignmentOutcome {
            alignment_id,
            aligned_path: output_path.to_path_buf(),
            offset,
            matching_region,
            method: outcome.winner(),
            score: outcome.score(),
            transform: outcome.feature.map(|c| c.transform),
            attempts: outcome.attempts,
        })
    }

    /// Runs the strategy cascade on already decoded images.
    pub fn run_cascade(
        &self,
        alignment_id: Uuid,
        reference: &E::Image,
        target: &E::Image,
        options: &AlignOptions,
    ) -> CascadeOutcome {
        Cascade::new(&self.engine, &self.config, self.observer.as_ref(), alignment_id)
            .run(reference, target, options)
    }
}

/// Aligns one pair with a default OpenCV-backed [`Aligner`].
pub fn align_images(
    reference_path: &Path,
    target_path: &Path,
    output_path: &Path,
    options: &AlignOptions,
) -> Result<AlignmentOutcome, AlignmentError> {
    Aligner::new().align(reference_path, target_path, output_path, options)
}
