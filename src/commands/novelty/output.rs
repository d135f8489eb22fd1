use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::novelty::{CandidateStatus, LookupState, NoveltyCandidate, NoveltyEntry, NoveltyReport};
use crate::util::write_lines;

use super::*;

pub(super) fn candidate_lines(candidates: &[NoveltyCandidate]) -> Vec<String> {
    candidates
        .iter()
        .map(|candidate| match candidate.status {
            CandidateStatus::Novel => candidate.identifier.clone(),
            CandidateStatus::Unresolved => format!("{}\tunresolved", candidate.identifier),
        })
        .collect()
}

pub(super) fn verdict_rows(entries: &[NoveltyEntry]) -> Vec<String> {
    let mut rows = Vec::with_capacity(entries.len() + 1);
    rows.push("identifier\tstatus\taccession\tattempts\tevidence".to_string());

    for entry in entries {
        let (accession, evidence) = match &entry.state {
            LookupState::Resolved { verdict, .. } => (
                verdict.accession.as_deref().unwrap_or("-"),
                if verdict.evidence.is_empty() {
                    "-"
                } else {
                    verdict.evidence.as_str()
                },
            ),
            LookupState::Unresolved { reason, .. } => ("-", reason.as_str()),
            LookupState::Pending => ("-", "-"),
        };

        rows.push(format!(
            "{}\t{}\t{}\t{}\t{}",
            entry.hit.identifier,
            entry.state.status(),
            accession,
            entry.state.attempts(),
            sanitize_field(evidence)
        ));
    }

    rows
}

// Evidence comes from free-text annotation and may carry tabs or newlines.
fn sanitize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

pub(super) fn write_outputs(output_dir: &Path, report: &NoveltyReport) -> Result<Vec<PathBuf>> {
    let candidates_path = output_dir.join(CANDIDATES_FILE);
    let verdicts_path = output_dir.join(VERDICTS_FILE);

    write_lines(&candidates_path, &candidate_lines(&report.candidates))?;
    write_lines(&verdicts_path, &verdict_rows(&report.entries))?;

    Ok(vec![candidates_path, verdicts_path])
}
