use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::Serialize;

use crate::classify::{ClassifierConfig, ConfusionCounts, Metrics};
use crate::cli::{EvaluateArgs, HitFormat};
use crate::model::{InputFile, IssueCounts};

pub(super) const METRICS_FILE: &str = "metrics.json";
pub(super) const CONFUSION_FILE: &str = "confusion.tsv";
pub(super) const CLASSIFICATIONS_FILE: &str = "classifications.tsv";
pub(super) const RUN_SUMMARY_FILE: &str = "evaluate_summary.json";

#[derive(Debug, Clone)]
pub(super) struct EvaluateConfig {
    pub(super) hits_path: PathBuf,
    pub(super) labels_path: PathBuf,
    pub(super) format: HitFormat,
    pub(super) classifier: ClassifierConfig,
    pub(super) output_dir: PathBuf,
}

impl EvaluateConfig {
    pub(super) fn from_args(args: &EvaluateArgs) -> Result<Self> {
        let threshold = args.e_value_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            bail!("e-value threshold must be a finite, non-negative number, got {threshold}");
        }

        let output_dir = args.output_dir.clone().unwrap_or_else(|| {
            args.hits
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });

        Ok(Self {
            hits_path: args.hits.clone(),
            labels_path: args.labels.clone(),
            format: args.format,
            classifier: ClassifierConfig {
                e_value_threshold: threshold,
                absent_label: args.absent_label,
                key: args.sequence_key,
            },
            output_dir,
        })
    }
}

/// Field order is part of the output contract; plotting reads it positionally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct MetricsReport {
    pub(super) true_positive: usize,
    pub(super) false_positive: usize,
    pub(super) true_negative: usize,
    pub(super) false_negative: usize,
    pub(super) evaluated: usize,
    pub(super) unlabeled: usize,
    pub(super) e_value_threshold: f64,
    pub(super) accuracy: f64,
    pub(super) precision: f64,
    pub(super) recall: f64,
    pub(super) f1: f64,
    pub(super) specificity: f64,
}

#[derive(Debug, Serialize)]
pub(super) struct EvaluateRunSummary {
    pub(super) manifest_version: u32,
    pub(super) run_id: String,
    pub(super) generated_at: String,
    pub(super) status: String,
    pub(super) format: String,
    pub(super) classifier: ClassifierConfig,
    pub(super) inputs: Vec<InputFile>,
    pub(super) hit_rows: usize,
    pub(super) comment_lines: usize,
    pub(super) labels: usize,
    pub(super) label_positives: usize,
    pub(super) counts: ConfusionCounts,
    pub(super) metrics: Metrics,
    pub(super) issues: IssueCounts,
    pub(super) warnings: Vec<String>,
    pub(super) outputs: Vec<String>,
}
