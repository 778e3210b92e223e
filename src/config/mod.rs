use crate::logging::LoggingConfig;
use crate::pipeline::DetectorKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cascade: CascadeConfig,
    pub edge: EdgeConfig,
    pub crop: CropConfig,
    pub multiscale: MultiScaleConfig,
    pub feature: FeatureConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

/// Escalation thresholds. Scores are strategy-specific error values, so each
/// gate is compared against whatever scale the current best came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub edge_escalation_score: f64,
    pub crop_escalation_score: f64,
    pub multiscale_escalation_score: f64,
    pub feature_short_circuit_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub canny_low: f64,
    pub canny_high: f64,
    pub downsample_factor: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Candidate `[width, height]` crops, tried in order.
    pub sizes: Vec<[u32; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiScaleConfig {
    pub scales: Vec<f64>,
    pub grid_step: u32,
    pub grid_margin: u32,
    /// Smaller/larger side ratio required on both axes before grid search.
    pub min_size_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub detector: DetectorKind,
    /// Fraction of distance-sorted matches kept.
    pub match_threshold: f64,
    pub min_matches: usize,
    pub ransac_reproj_threshold: f64,
    pub inlier_threshold: f64,
    pub max_features: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            edge_escalation_score: 1000.0,
            crop_escalation_score: 5000.0,
            multiscale_escalation_score: 1000.0,
            feature_short_circuit_confidence: 0.3,
        }
    }
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            downsample_factor: 4,
        }
    }
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            sizes: vec![[800, 600], [1000, 800], [1200, 900]],
        }
    }
}

impl Default for MultiScaleConfig {
    fn default() -> Self {
        Self {
            scales: vec![1.0, 0.5, 0.25],
            grid_step: 50,
            grid_margin: 200,
            min_size_ratio: 0.7,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::Orb,
            match_threshold: 0.7,
            min_matches: 4,
            ransac_reproj_threshold: 5.0,
            inlier_threshold: 5.0,
            max_features: 1000,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;

        if content.trim_start().starts_with('{') {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        format: ConfigFormat,
    ) -> anyhow::Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let cascade = &self.cascade;
        for (name, value) in [
            ("edge_escalation_score", cascade.edge_escalation_score),
            ("crop_escalation_score", cascade.crop_escalation_score),
            ("multiscale_escalation_score", cascade.multiscale_escalation_score),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(format!("cascade.{} must be a non-negative number", name));
            }
        }
        if !(0.0..=1.0).contains(&cascade.feature_short_circuit_confidence) {
            errors.push(
                "cascade.feature_short_circuit_confidence must be within [0, 1]".to_string(),
            );
        }

        if self.edge.downsample_factor == 0 {
            errors.push("edge.downsample_factor must be positive".to_string());
        }
        if self.edge.canny_low > self.edge.canny_high {
            errors.push("edge.canny_low must not exceed edge.canny_high".to_string());
        }

        if self.crop.sizes.iter().any(|[w, h]| *w == 0 || *h == 0) {
            errors.push("crop.sizes entries must be non-zero".to_string());
        }

        if self.multiscale.scales.iter().any(|s| !(*s > 0.0 && *s <= 1.0)) {
            errors.push("multiscale.scales must lie in (0, 1]".to_string());
        }
        if self.multiscale.grid_step == 0 {
            errors.push("multiscale.grid_step must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.multiscale.min_size_ratio) {
            errors.push("multiscale.min_size_ratio must be within [0, 1]".to_string());
        }

        if !(self.feature.match_threshold > 0.0 && self.feature.match_threshold <= 1.0) {
            errors.push("feature.match_threshold must lie in (0, 1]".to_string());
        }
        if self.feature.min_matches < 4 {
            errors.push("feature.min_matches must be at least 4".to_string());
        }
        if self.feature.inlier_threshold <= 0.0 || self.feature.ransac_reproj_threshold <= 0.0 {
            errors.push("feature thresholds must be positive".to_string());
        }

        if self.batch.concurrency == 0 {
            errors.push("batch.concurrency must be positive".to_string());
        }

        if let Err(e) = self.logging.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigFormat {
    Json,
    Toml,
}

/// A resolved configuration plus the reasons it fell back to defaults, if it did.
///
/// Loading happens before logging is initialised, so the reasons are kept
/// here and reported once a subscriber exists.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: Config,
    pub fallback_reasons: Vec<String>,
}

impl LoadedConfig {
    pub fn fell_back(&self) -> bool {
        !self.fallback_reasons.is_empty()
    }

    /// Emits one warning per fallback reason.
    pub fn report(&self, config_path: Option<&Path>) {
        if !self.fell_back() {
            return;
        }
        let path = config_path.map(|p| p.display().to_string()).unwrap_or_default();
        for reason in &self.fallback_reasons {
            tracing::warn!(path = %path, error = %reason, "Invalid configuration");
        }
        tracing::warn!(path = %path, "Using default configuration instead");
    }
}

pub fn load_config(config_path: Option<&Path>) -> LoadedConfig {
    let Some(path) = config_path else {
        return LoadedConfig::default();
    };
    match Config::load_from_file(path) {
        Ok(config) => match config.validate() {
            Ok(()) => LoadedConfig {
                config,
                fallback_reasons: Vec::new(),
            },
            Err(errors) => LoadedConfig {
                config: Config::default(),
                fallback_reasons: errors,
            },
        },
        Err(e) => LoadedConfig {
            config: Config::default(),
            fallback_reasons: vec![format!("failed to load config: {:#}", e)],
        },
    }
}

pub fn load_config_or_default(config_path: Option<&Path>) -> Config {
    let loaded = load_config(config_path);
    loaded.report(config_path);
    loaded.config
}
