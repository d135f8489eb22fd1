use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::classify::{Classification, ConfusionCounts, IdentifierOutcome};
use crate::util::{write_json_pretty, write_lines};

use super::*;

pub(super) fn metrics_report(classification: &Classification, threshold: f64) -> MetricsReport {
    let counts = &classification.counts;
    let metrics = &classification.metrics;

    MetricsReport {
        true_positive: counts.true_positive,
        false_positive: counts.false_positive,
        true_negative: counts.true_negative,
        false_negative: counts.false_negative,
        evaluated: counts.total(),
        unlabeled: classification.unlabeled.len(),
        e_value_threshold: threshold,
        accuracy: metrics.accuracy,
        precision: metrics.precision,
        recall: metrics.recall,
        f1: metrics.f1,
        specificity: metrics.specificity,
    }
}

pub(super) fn confusion_rows(counts: &ConfusionCounts) -> Vec<String> {
    vec![
        "actual\tpredicted\tcount".to_string(),
        format!("negative\tnegative\t{}", counts.true_negative),
        format!("negative\tpositive\t{}", counts.false_positive),
        format!("positive\tnegative\t{}", counts.false_negative),
        format!("positive\tpositive\t{}", counts.true_positive),
    ]
}

pub(super) fn classification_rows(outcomes: &[IdentifierOutcome]) -> Vec<String> {
    let mut rows = Vec::with_capacity(outcomes.len() + 1);
    rows.push("identifier\tlabel\tbest_e_value\toutcome".to_string());

    for outcome in outcomes {
        let label = match outcome.label {
            Some(true) => "1",
            Some(false) => "0",
            None => "-",
        };
        let e_value = outcome
            .best_e_value
            .map(|value| format!("{value:e}"))
            .unwrap_or_else(|| "-".to_string());
        let decision = outcome
            .outcome
            .map(|value| value.as_str())
            .unwrap_or("excluded");

        rows.push(format!(
            "{}\t{}\t{}\t{}",
            outcome.identifier, label, e_value, decision
        ));
    }

    rows
}

pub(super) fn write_outputs(
    output_dir: &Path,
    classification: &Classification,
    threshold: f64,
) -> Result<Vec<PathBuf>> {
    let metrics_path = output_dir.join(METRICS_FILE);
    let confusion_path = output_dir.join(CONFUSION_FILE);
    let classifications_path = output_dir.join(CLASSIFICATIONS_FILE);

    write_json_pretty(&metrics_path, &metrics_report(classification, threshold))?;
    write_lines(&confusion_path, &confusion_rows(&classification.counts))?;
    write_lines(
        &classifications_path,
        &classification_rows(&classification.outcomes),
    )?;

    Ok(vec![metrics_path, confusion_path, classifications_path])
}
