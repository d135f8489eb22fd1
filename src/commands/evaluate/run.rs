use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::cli::EvaluateArgs;
use crate::hits::parse_hit_table;
use crate::labels::load_labels;
use crate::model::IssueCounts;
use crate::util::{
    describe_input, ensure_input_file, now_utc_string, read_text, utc_compact_string,
    write_json_pretty,
};

use super::*;

pub fn run(args: EvaluateArgs) -> Result<()> {
    let config = EvaluateConfig::from_args(&args)?;
    let summary = execute(&config)?;

    info!(
        true_positive = summary.counts.true_positive,
        false_positive = summary.counts.false_positive,
        true_negative = summary.counts.true_negative,
        false_negative = summary.counts.false_negative,
        accuracy = summary.metrics.accuracy,
        precision = summary.metrics.precision,
        recall = summary.metrics.recall,
        f1 = summary.metrics.f1,
        "validation performance"
    );
    info!(
        status = %summary.status,
        skipped_hit_rows = summary.issues.skipped_hit_rows,
        skipped_label_rows = summary.issues.skipped_label_rows,
        unlabeled_hit_identifiers = summary.issues.unlabeled_hit_identifiers,
        output_dir = %config.output_dir.display(),
        "evaluate completed"
    );

    Ok(())
}

pub(super) fn execute(config: &EvaluateConfig) -> Result<EvaluateRunSummary> {
    ensure_input_file("hit table", &config.hits_path)?;
    ensure_input_file("label", &config.labels_path)?;

    let run_id = format!("evaluate-{}", utc_compact_string(Utc::now()));
    let generated_at = now_utc_string();
    let inputs = vec![
        describe_input("hit_table", &config.hits_path)?,
        describe_input("labels", &config.labels_path)?,
    ];

    info!(
        hits = %config.hits_path.display(),
        labels = %config.labels_path.display(),
        format = config.format.as_str(),
        threshold = config.classifier.e_value_threshold,
        sequence_key = config.classifier.key.as_str(),
        absent_label = config.classifier.absent_label.as_str(),
        "evaluate requested"
    );

    let parsed = parse_hit_table(&read_text(&config.hits_path)?, config.format);
    for warning in &parsed.warnings {
        warn!(line = warning.line, reason = %warning.reason, "skipped malformed hit row");
    }

    debug!(
        data_lines = parsed.data_lines(),
        parsed = parsed.records.len(),
        skipped = parsed.warnings.len(),
        "parsed hit table"
    );

    let loaded = load_labels(&config.labels_path)?;
    for warning in &loaded.warnings {
        warn!(line = warning.line, reason = %warning.reason, "skipped label row");
    }
    if loaded.labels.is_empty() {
        warn!(path = %config.labels_path.display(), "label file contains no labels");
    }

    let classification = classify(&parsed.records, &loaded.labels, &config.classifier);
    let outputs = write_outputs(
        &config.output_dir,
        &classification,
        config.classifier.e_value_threshold,
    )?;

    let issues = IssueCounts {
        skipped_hit_rows: parsed.warnings.len(),
        skipped_label_rows: loaded.warnings.len(),
        unlabeled_hit_identifiers: classification.unlabeled.len(),
        labels_without_hits: classification.labels_without_hits,
        unresolved_lookups: 0,
    };

    let warnings: Vec<String> = parsed
        .warnings
        .iter()
        .map(|warning| format!("hit table line {}: {}", warning.line, warning.reason))
        .chain(
            loaded
                .warnings
                .iter()
                .map(|warning| format!("labels line {}: {}", warning.line, warning.reason)),
        )
        .chain(
            classification
                .unlabeled
                .iter()
                .map(|identifier| format!("no label for hit identifier {identifier}")),
        )
        .collect();

    let status = if warnings.is_empty() {
        "completed"
    } else {
        "completed_with_warnings"
    };

    let summary = EvaluateRunSummary {
        manifest_version: 1,
        run_id,
        generated_at,
        status: status.to_string(),
        format: config.format.as_str().to_string(),
        classifier: config.classifier,
        inputs,
        hit_rows: parsed.records.len(),
        comment_lines: parsed.comment_lines,
        labels: loaded.labels.len(),
        label_positives: loaded.labels.positives(),
        counts: classification.counts,
        metrics: classification.metrics,
        issues,
        warnings,
        outputs: outputs
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
    };

    let summary_path = config.output_dir.join(RUN_SUMMARY_FILE);
    write_json_pretty(&summary_path, &summary)?;
    info!(path = %summary_path.display(), "wrote evaluate summary");

    Ok(summary)
}
