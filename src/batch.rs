//! Bounded parallel alignment over many image pairs.
//!
//! A failed pair is recorded in the report and never stops the rest.

use crate::engine::FeatureEngine;
use crate::error::AlignmentError;
use crate::pipeline::{AlignOptions, Aligner, AlignmentOutcome};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One image pair to align.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignJob {
    pub reference: PathBuf,
    pub target: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub options: AlignOptions,
}

impl AlignJob {
    pub fn new(
        reference: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reference: reference.into(),
            target: target.into(),
            output: output.into(),
            options: AlignOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AlignOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug)]
pub struct BatchEntry {
    pub job: AlignJob,
    pub result: Result<AlignmentOutcome, AlignmentError>,
}

/// Serializable summary of a batch run, in job order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: f64,
    pub entries: Vec<BatchReportEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReportEntry {
    pub job: AlignJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AlignmentOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchReport {
    pub fn from_entries(entries: &[BatchEntry], elapsed_ms: f64) -> Self {
        let entries: Vec<BatchReportEntry> = entries
            .iter()
            .map(|entry| match &entry.result {
                Ok(outcome) => BatchReportEntry {
                    job: entry.job.clone(),
                    outcome: Some(outcome.clone()),
                    error: None,
                },
                Err(e) => BatchReportEntry {
                    job: entry.job.clone(),
                    outcome: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();
        let succeeded = entries.iter().filter(|e| e.outcome.is_some()).count();
        Self {
            total: entries.len(),
            succeeded,
            failed: entries.len() - succeeded,
            elapsed_ms,
            entries,
        }
    }
}

/// Reads a JSON array of [`AlignJob`]s.
pub fn load_manifest(path: &Path) -> anyhow::Result<Vec<AlignJob>> {
    let content = std::fs::read_to_string(path)?;
    let jobs: Vec<AlignJob> = serde_json::from_str(&content)?;
    Ok(jobs)
}

/// Aligns every job on a pool of `concurrency` workers.
///
/// Entries come back in job order. Only failing to build the pool is an error.
pub fn align_batch<E: FeatureEngine>(
    aligner: &Aligner<E>,
    jobs: Vec<AlignJob>,
    concurrency: usize,
) -> Result<Vec<BatchEntry>, AlignmentError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .thread_name(|i| format!("align-worker-{i}"))
        .build()
        .map_err(|e| AlignmentError::WorkerPool(e.to_string()))?;

    let start = Instant::now();
    tracing::info!(jobs = jobs.len(), concurrency, "Starting batch alignment");

    let entries: Vec<BatchEntry> = pool.install(|| {
        jobs.into_par_iter()
            .map(|job| {
                let result = aligner.align(&job.reference, &job.target, &job.output, &job.options);
                if let Err(ref e) = result {
                    tracing::warn!(
                        reference = %job.reference.display(),
                        target = %job.target.display(),
                        error = %e,
                        "Pair failed"
                    );
                }
                BatchEntry { job, result }
            })
            .collect()
    });

    let failed = entries.iter().filter(|e| e.result.is_err()).count();
    tracing::info!(
        total = entries.len(),
        failed,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Batch alignment finished"
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parsing_defaults_options() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("jobs.json");
        std::fs::write(
            &manifest,
            r#"[
                {"reference": "a.png", "target": "b.png", "output": "c.png"},
                {"reference": "d.png", "target": "e.png", "output": "f.png",
                 "options": {"method": "opencv", "opencvDetector": "akaze"}}
            ]"#,
        )
        .unwrap();

        let jobs = load_manifest(&manifest).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].options, AlignOptions::default());
        assert_eq!(jobs[1].options.method, crate::pipeline::AlignMethod::Opencv);
        assert_eq!(
            jobs[1].options.opencv_detector,
            Some(crate::pipeline::DetectorKind::Akaze)
        );
    }

    #[test]
    fn test_report_counts_failures() {
        let entries = vec![BatchEntry {
            job: AlignJob::new("a.png", "b.png", "c.png"),
            result: Err(AlignmentError::WorkerPool("boom".to_string())),
        }];
        let report = BatchReport::from_entries(&entries, 1.0);
        assert_eq!(report.total, 1);
        assert_eq!(report.failed, 1);
        assert!(report.entries[0].error.as_deref().unwrap().contains("boom"));
    }
}
