use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::annotation::{AnnotationSource, UniprotClient};
use crate::cli::NoveltyArgs;
use crate::hits::{parse_hit_table, HitRecord};
use crate::model::IssueCounts;
use crate::novelty::{filter_novel, LookupState};
use crate::util::{
    describe_input, ensure_input_file, now_utc_string, read_text, utc_compact_string,
    write_json_pretty,
};

use super::*;

pub fn run(args: NoveltyArgs) -> Result<()> {
    let config = NoveltyRunConfig::from_args(&args)?;
    let source = UniprotClient::new(&config.uniprot)?;
    let summary = execute(&config, &source)?;

    info!(
        hit_rows = summary.counts.hit_rows,
        unique_identifiers = summary.counts.unique_identifiers,
        known = summary.counts.known,
        novel = summary.counts.novel,
        unresolved = summary.counts.unresolved,
        lookup_attempts = summary.counts.lookup_attempts,
        "novelty filtering"
    );
    info!(
        status = %summary.status,
        skipped_hit_rows = summary.issues.skipped_hit_rows,
        unresolved_lookups = summary.issues.unresolved_lookups,
        output_dir = %config.output_dir.display(),
        "novelty completed"
    );

    Ok(())
}

pub(super) fn execute<S>(config: &NoveltyRunConfig, source: &S) -> Result<NoveltyRunSummary>
where
    S: AnnotationSource + ?Sized,
{
    ensure_input_file("hit table", &config.hits_path)?;

    let run_id = format!("novelty-{}", utc_compact_string(Utc::now()));
    let generated_at = now_utc_string();
    let inputs = vec![describe_input("hit_table", &config.hits_path)?];

    info!(
        hits = %config.hits_path.display(),
        format = config.format.as_str(),
        workers = config.novelty.workers,
        max_attempts = config.novelty.retry.max_attempts,
        "novelty requested"
    );

    let parsed = parse_hit_table(&read_text(&config.hits_path)?, config.format);
    for warning in &parsed.warnings {
        warn!(line = warning.line, reason = %warning.reason, "skipped malformed hit row");
    }

    let (records, rows_above_threshold) = within_threshold(parsed.records, config.e_value_threshold);
    if rows_above_threshold > 0 {
        info!(
            rows_above_threshold,
            threshold = config.e_value_threshold,
            "dropped hits above e-value threshold"
        );
    }

    let report = filter_novel(&records, source, &config.novelty)?;
    let outputs = write_outputs(&config.output_dir, &report)?;

    let issues = IssueCounts {
        skipped_hit_rows: parsed.warnings.len(),
        unresolved_lookups: report.counts.unresolved,
        ..IssueCounts::default()
    };

    let warnings: Vec<String> = parsed
        .warnings
        .iter()
        .map(|warning| format!("hit table line {}: {}", warning.line, warning.reason))
        .chain(report.entries.iter().filter_map(|entry| match &entry.state {
            LookupState::Unresolved { reason, attempts } => Some(format!(
                "lookup for {} unresolved after {} attempt(s): {}",
                entry.hit.identifier, attempts, reason
            )),
            _ => None,
        }))
        .collect();

    let status = if warnings.is_empty() {
        "completed"
    } else {
        "completed_with_warnings"
    };

    let summary = NoveltyRunSummary {
        manifest_version: 1,
        run_id,
        generated_at,
        status: status.to_string(),
        format: config.format.as_str().to_string(),
        e_value_threshold: config.e_value_threshold,
        novelty: config.novelty,
        uniprot: config.uniprot.clone(),
        inputs,
        comment_lines: parsed.comment_lines,
        rows_above_threshold,
        counts: report.counts,
        issues,
        warnings,
        outputs: outputs
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
    };

    let summary_path = config.output_dir.join(RUN_SUMMARY_FILE);
    write_json_pretty(&summary_path, &summary)?;
    info!(path = %summary_path.display(), "wrote novelty summary");

    Ok(summary)
}

pub(super) fn within_threshold(
    records: Vec<HitRecord>,
    threshold: Option<f64>,
) -> (Vec<HitRecord>, usize) {
    let Some(threshold) = threshold else {
        return (records, 0);
    };

    let total = records.len();
    let kept: Vec<HitRecord> = records
        .into_iter()
        .filter(|record| record.e_value <= threshold)
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}
