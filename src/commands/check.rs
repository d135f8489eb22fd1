use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::CheckArgs;
use crate::hits::{sequence_name, split_coordinate_suffix};
use crate::labels::parse_labels;
use crate::util::{now_utc_string, write_json_pretty};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ExpectedFormat {
    Stockholm,
    Fasta,
    Labels,
}

struct HeaderPatterns {
    stockholm: Regex,
}

impl HeaderPatterns {
    fn compile() -> Result<Self> {
        Ok(Self {
            stockholm: Regex::new(r"^# STOCKHOLM 1\.\d+\s*$")
                .context("failed to compile Stockholm header regex")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct FileCheck {
    role: String,
    path: String,
    result: String,
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
struct InputCheckReport {
    manifest_version: u32,
    generated_at: String,
    status: String,
    strict: bool,
    checks: Vec<FileCheck>,
    seed_sequences: usize,
    validation_sequences: usize,
    labels: usize,
    seed_validation_overlap: Vec<String>,
    sequences_without_label: Vec<String>,
    labels_without_sequence: Vec<String>,
    issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SequenceRef {
    name: String,
    accession: Option<String>,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let patterns = HeaderPatterns::compile()?;
    let report = build_report(&args, &patterns)?;

    for check in &report.checks {
        if check.result == "pass" {
            info!(role = %check.role, path = %check.path, "input ok");
        } else {
            warn!(
                role = %check.role,
                path = %check.path,
                detail = %check.detail.clone().unwrap_or_default(),
                "input check failed"
            );
        }
    }
    for issue in &report.issues {
        warn!(issue = %issue, "input issue");
    }

    if let Some(path) = &args.report_path {
        write_json_pretty(path, &report)?;
        info!(path = %path.display(), "wrote input check report");
    }

    info!(
        status = %report.status,
        seed_sequences = report.seed_sequences,
        validation_sequences = report.validation_sequences,
        labels = report.labels,
        overlap = report.seed_validation_overlap.len(),
        "input check completed"
    );

    if report.status == "failed" {
        bail!("input checks failed; see warnings above");
    }
    Ok(())
}

fn build_report(args: &CheckArgs, patterns: &HeaderPatterns) -> Result<InputCheckReport> {
    let seed = check_file("seed alignment", &args.seed, ExpectedFormat::Stockholm, patterns);
    let fasta = check_file(
        "validation fasta",
        &args.validation_fasta,
        ExpectedFormat::Fasta,
        patterns,
    );
    let labels = check_file("labels", &args.labels, ExpectedFormat::Labels, patterns);

    let mut report = InputCheckReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        status: "passed".to_string(),
        strict: args.strict,
        checks: Vec::new(),
        seed_sequences: 0,
        validation_sequences: 0,
        labels: 0,
        seed_validation_overlap: Vec::new(),
        sequences_without_label: Vec::new(),
        labels_without_sequence: Vec::new(),
        issues: Vec::new(),
    };

    let (seed, fasta, labels) = match (seed, fasta, labels) {
        (Ok((seed_check, seed_text)), Ok((fasta_check, fasta_text)), Ok((label_check, label_text))) => {
            report.checks = vec![seed_check, fasta_check, label_check];
            (seed_text, fasta_text, label_text)
        }
        (seed, fasta, labels) => {
            report.checks = [seed, fasta, labels]
                .into_iter()
                .map(|result| result.map(|(check, _)| check).unwrap_or_else(|check| check))
                .collect();
            report.status = "failed".to_string();
            return Ok(report);
        }
    };

    let seed_refs = seed_sequence_refs(&seed);
    let fasta_ids = fasta_identifiers(&fasta);
    let fasta_refs: Vec<SequenceRef> = fasta_ids
        .iter()
        .map(|identifier| sequence_ref(identifier))
        .collect();
    let loaded = parse_labels(&labels);

    report.seed_sequences = seed_refs.len();
    report.validation_sequences = fasta_ids.len();
    report.labels = loaded.labels.len();
    report.seed_validation_overlap = overlapping_sequences(&seed_refs, &fasta_refs);

    let fasta_set: BTreeSet<&str> = fasta_ids.iter().map(String::as_str).collect();
    report.sequences_without_label = fasta_set
        .iter()
        .filter(|identifier| !loaded.labels.contains(identifier))
        .map(|identifier| identifier.to_string())
        .collect();
    report.labels_without_sequence = loaded
        .labels
        .identifiers()
        .filter(|identifier| !fasta_set.contains(identifier))
        .map(ToOwned::to_owned)
        .collect();

    for warning in &loaded.warnings {
        report
            .issues
            .push(format!("labels line {}: {}", warning.line, warning.reason));
    }
    if !report.seed_validation_overlap.is_empty() {
        report.issues.push(format!(
            "{} validation sequence(s) also occur in the seed alignment",
            report.seed_validation_overlap.len()
        ));
    }
    if !report.sequences_without_label.is_empty() {
        report.issues.push(format!(
            "{} validation sequence(s) have no label",
            report.sequences_without_label.len()
        ));
    }
    if !report.labels_without_sequence.is_empty() {
        report.issues.push(format!(
            "{} label(s) refer to sequences missing from the validation fasta",
            report.labels_without_sequence.len()
        ));
    }

    if !report.issues.is_empty() {
        report.status = if args.strict {
            "failed".to_string()
        } else {
            "passed_with_warnings".to_string()
        };
    }

    Ok(report)
}

fn check_file(
    role: &str,
    path: &Path,
    format: ExpectedFormat,
    patterns: &HeaderPatterns,
) -> std::result::Result<(FileCheck, String), FileCheck> {
    let failed = |detail: String| FileCheck {
        role: role.to_string(),
        path: path.display().to_string(),
        result: "failed".to_string(),
        detail: Some(detail),
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => return Err(failed(format!("cannot read file: {err}"))),
    };
    if text.trim().is_empty() {
        return Err(failed("file is empty".to_string()));
    }

    let first_line = text.lines().next().unwrap_or_default();
    match format {
        ExpectedFormat::Stockholm if !patterns.stockholm.is_match(first_line) => {
            return Err(failed(format!(
                "not in Stockholm format; first line is `{}`",
                first_line.trim()
            )));
        }
        ExpectedFormat::Fasta if !first_line.starts_with('>') => {
            return Err(failed(format!(
                "not in FASTA format; first line is `{}`",
                first_line.trim()
            )));
        }
        ExpectedFormat::Fasta => {
            if let Some((index, _)) = text
                .lines()
                .enumerate()
                .find(|(_, line)| line.starts_with("#=GF") || line.starts_with("# STOCKHOLM"))
            {
                return Err(failed(format!(
                    "Stockholm markup at line {}; only plain FASTA is allowed",
                    index + 1
                )));
            }
        }
        _ => {}
    }

    Ok((
        FileCheck {
            role: role.to_string(),
            path: path.display().to_string(),
            result: "pass".to_string(),
            detail: None,
        },
        text,
    ))
}

fn seed_sequence_refs(text: &str) -> Vec<SequenceRef> {
    let mut refs = Vec::<SequenceRef>::new();
    let mut seen = BTreeSet::<String>::new();

    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (identifier, accession) = if line.starts_with("#=GS") {
            let Some(identifier) = fields.get(1) else {
                continue;
            };
            let accession = fields
                .iter()
                .position(|field| *field == "AC")
                .and_then(|index| fields.get(index + 1))
                .map(|value| value.split('.').next().unwrap_or_default().to_string());
            (*identifier, accession)
        } else if line.starts_with('#') || line.starts_with("//") || fields.is_empty() {
            continue;
        } else {
            (fields[0], None)
        };

        let name = split_coordinate_suffix(identifier).0.to_string();
        if seen.insert(name.clone()) {
            refs.push(SequenceRef { name, accession });
        } else if let Some(accession) = accession {
            if let Some(existing) = refs.iter_mut().find(|existing| existing.name == name) {
                existing.accession.get_or_insert(accession);
            }
        }
    }

    refs
}

fn fasta_identifiers(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix('>'))
        .filter_map(|header| header.split_whitespace().next())
        .map(ToOwned::to_owned)
        .collect()
}

fn sequence_ref(identifier: &str) -> SequenceRef {
    let parsed = sequence_name(identifier);
    SequenceRef {
        name: parsed.name.to_string(),
        accession: parsed.accession.map(ToOwned::to_owned),
    }
}

fn overlapping_sequences(seed: &[SequenceRef], validation: &[SequenceRef]) -> Vec<String> {
    let seed_names: BTreeSet<&str> = seed.iter().map(|item| item.name.as_str()).collect();
    let seed_accessions: BTreeSet<&str> = seed
        .iter()
        .filter_map(|item| item.accession.as_deref())
        .collect();

    validation
        .iter()
        .filter(|item| {
            seed_names.contains(item.name.as_str())
                || item
                    .accession
                    .as_deref()
                    .map(|accession| seed_accessions.contains(accession))
                    .unwrap_or(false)
        })
        .map(|item| item.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
