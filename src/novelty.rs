use std::collections::HashMap;

use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::annotation::{AnnotationSource, AnnotationVerdict, LookupError};
use crate::hits::{sequence_name, split_uniprot_header, HitRecord, SequenceName};
use crate::retry::{retry_with_backoff, RetryOutcome, RetryPolicy};

pub const MAX_WORKERS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NoveltyConfig {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub strip_coordinates: bool,
    pub include_unresolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniqueHit {
    pub identifier: String,
    pub accession: Option<String>,
    pub score: f64,
    pub e_value: f64,
    pub first_line: usize,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LookupState {
    Pending,
    Resolved {
        verdict: AnnotationVerdict,
        attempts: u32,
    },
    Unresolved {
        reason: String,
        attempts: u32,
    },
}

impl LookupState {
    fn settle(outcome: RetryOutcome<AnnotationVerdict, LookupError>) -> Self {
        match outcome {
            RetryOutcome::Succeeded { value, attempts } => Self::Resolved {
                verdict: value,
                attempts,
            },
            RetryOutcome::Failed {
                error,
                attempts,
                exhausted,
            } => Self::Unresolved {
                reason: if exhausted {
                    format!("retries exhausted: {error}")
                } else {
                    error.to_string()
                },
                attempts,
            },
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Pending => 0,
            Self::Resolved { attempts, .. } | Self::Unresolved { attempts, .. } => *attempts,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved { verdict, .. } if verdict.is_known => "known",
            Self::Resolved { .. } => "novel",
            Self::Unresolved { .. } => "unresolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoveltyEntry {
    pub hit: UniqueHit,
    pub state: LookupState,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Novel,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoveltyCandidate {
    pub identifier: String,
    pub status: CandidateStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoveltyCounts {
    pub hit_rows: usize,
    pub unique_identifiers: usize,
    pub known: usize,
    pub novel: usize,
    pub unresolved: usize,
    pub lookup_attempts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoveltyReport {
    pub entries: Vec<NoveltyEntry>,
    pub candidates: Vec<NoveltyCandidate>,
    pub counts: NoveltyCounts,
}

pub fn novelty_identifier(target_id: &str, strip_coordinates: bool) -> SequenceName<'_> {
    if strip_coordinates {
        return sequence_name(target_id);
    }
    match split_uniprot_header(target_id) {
        Some((accession, name)) => SequenceName {
            name,
            accession: Some(accession),
        },
        None => SequenceName {
            name: target_id,
            accession: None,
        },
    }
}

// One entry per identifier in order of first appearance; the first row's
// score and e-value are kept.
pub fn dedup_hits(records: &[HitRecord], strip_coordinates: bool) -> Vec<UniqueHit> {
    let mut position = HashMap::<&str, usize>::with_capacity(records.len());
    let mut unique = Vec::<UniqueHit>::new();

    for record in records {
        let parsed = novelty_identifier(&record.target_id, strip_coordinates);
        match position.get(parsed.name) {
            Some(&index) => {
                let existing = &mut unique[index];
                existing.occurrences += 1;
                if existing.accession.is_none() {
                    existing.accession = parsed.accession.map(ToOwned::to_owned);
                }
            }
            None => {
                position.insert(parsed.name, unique.len());
                unique.push(UniqueHit {
                    identifier: parsed.name.to_string(),
                    accession: parsed.accession.map(ToOwned::to_owned),
                    score: record.score,
                    e_value: record.e_value,
                    first_line: record.line,
                    occurrences: 1,
                });
            }
        }
    }

    unique
}

pub fn resolve_identifier<S>(
    source: &S,
    identifier: &str,
    accession: Option<&str>,
    policy: &RetryPolicy,
) -> LookupState
where
    S: AnnotationSource + ?Sized,
{
    let outcome = retry_with_backoff(policy, |attempt| {
        debug!(identifier, accession, attempt, "annotation lookup");
        source.lookup(identifier, accession)
    });
    LookupState::settle(outcome)
}

pub fn filter_novel<S>(
    records: &[HitRecord],
    source: &S,
    config: &NoveltyConfig,
) -> Result<NoveltyReport>
where
    S: AnnotationSource + ?Sized,
{
    let mut entries: Vec<NoveltyEntry> = dedup_hits(records, config.strip_coordinates)
        .into_iter()
        .map(|hit| NoveltyEntry {
            hit,
            state: LookupState::Pending,
        })
        .collect();

    let workers = config.workers.clamp(1, MAX_WORKERS);
    info!(
        hit_rows = records.len(),
        unique_identifiers = entries.len(),
        workers,
        "resolving annotations"
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("hmmeval-lookup-{index}"))
        .build()
        .context("failed to build lookup worker pool")?;

    // Each worker owns the slot of the entry it resolves, so input order survives.
    pool.install(|| {
        entries.par_iter_mut().for_each(|entry| {
            entry.state = resolve_identifier(
                source,
                &entry.hit.identifier,
                entry.hit.accession.as_deref(),
                &config.retry,
            );
            match &entry.state {
                LookupState::Unresolved { reason, attempts } => warn!(
                    identifier = %entry.hit.identifier,
                    attempts,
                    reason = %reason,
                    "annotation lookup unresolved"
                ),
                state => debug!(
                    identifier = %entry.hit.identifier,
                    status = state.status(),
                    "annotation lookup settled"
                ),
            }
        });
    });

    Ok(summarize(records.len(), entries, config.include_unresolved))
}

fn summarize(hit_rows: usize, entries: Vec<NoveltyEntry>, include_unresolved: bool) -> NoveltyReport {
    let mut counts = NoveltyCounts {
        hit_rows,
        unique_identifiers: entries.len(),
        ..NoveltyCounts::default()
    };
    let mut candidates = Vec::new();

    for entry in &entries {
        counts.lookup_attempts += u64::from(entry.state.attempts());

        let status = match &entry.state {
            LookupState::Resolved { verdict, .. } if verdict.is_known => {
                counts.known += 1;
                None
            }
            LookupState::Resolved { .. } => {
                counts.novel += 1;
                Some(CandidateStatus::Novel)
            }
            // Pending cannot survive a completed pass; report it as unresolved rather than drop it.
            LookupState::Unresolved { .. } | LookupState::Pending => {
                counts.unresolved += 1;
                include_unresolved.then_some(CandidateStatus::Unresolved)
            }
        };

        if let Some(status) = status {
            candidates.push(NoveltyCandidate {
                identifier: entry.hit.identifier.clone(),
                status,
            });
        }
    }

    NoveltyReport {
        entries,
        candidates,
        counts,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    enum Script {
        Known,
        Novel,
        FailThen(u32, bool),
        Missing,
    }

    struct ScriptedSource {
        scripts: HashMap<&'static str, Script>,
        calls: Mutex<HashMap<String, u32>>,
        accessions: Mutex<HashMap<String, Option<String>>>,
    }

    impl ScriptedSource {
        fn new(scripts: Vec<(&'static str, Script)>) -> Self {
            Self {
                scripts: scripts.into_iter().collect(),
                calls: Mutex::new(HashMap::new()),
                accessions: Mutex::new(HashMap::new()),
            }
        }

        fn calls_for(&self, identifier: &str) -> u32 {
            self.calls
                .lock()
                .unwrap()
                .get(identifier)
                .copied()
                .unwrap_or(0)
        }

        fn total_calls(&self) -> u32 {
            self.calls.lock().unwrap().values().sum()
        }
    }

    impl AnnotationSource for ScriptedSource {
        fn lookup(
            &self,
            identifier: &str,
            accession: Option<&str>,
        ) -> Result<AnnotationVerdict, LookupError> {
            self.accessions
                .lock()
                .unwrap()
                .insert(identifier.to_string(), accession.map(ToOwned::to_owned));
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(identifier.to_string()).or_insert(0);
                *count += 1;
                *count
            };

            let verdict = |is_known: bool| AnnotationVerdict {
                identifier: identifier.to_string(),
                is_known,
                evidence: if is_known { "keyword:Kunitz".to_string() } else { String::new() },
                accession: Some(format!("ACC_{identifier}")),
            };

            match self.scripts.get(identifier) {
                Some(Script::Known) => Ok(verdict(true)),
                Some(Script::Novel) => Ok(verdict(false)),
                Some(Script::FailThen(failures, _)) if call <= *failures => {
                    Err(LookupError::Transient("timed out".to_string()))
                }
                Some(Script::FailThen(_, is_known)) => Ok(verdict(*is_known)),
                Some(Script::Missing) | None => Err(LookupError::NotFound),
            }
        }
    }

    fn hit(target: &str, score: f64, line: usize) -> HitRecord {
        HitRecord {
            query_id: "kunitz".to_string(),
            target_id: target.to_string(),
            score,
            e_value: 1e-10,
            start: None,
            end: None,
            line,
        }
    }

    fn config(workers: usize, max_attempts: u32) -> NoveltyConfig {
        NoveltyConfig {
            workers,
            retry: RetryPolicy::immediate(max_attempts),
            strip_coordinates: true,
            include_unresolved: true,
        }
    }

    fn candidate_ids(report: &NoveltyReport) -> Vec<&str> {
        report
            .candidates
            .iter()
            .map(|candidate| candidate.identifier.as_str())
            .collect()
    }

    #[test]
    fn duplicate_identifiers_are_looked_up_once_in_first_seen_order() {
        let records = vec![hit("A", 1.0, 1), hit("B", 2.0, 2), hit("A", 3.0, 3), hit("C", 4.0, 4)];
        let source = ScriptedSource::new(vec![
            ("A", Script::Known),
            ("B", Script::Novel),
            ("C", Script::FailThen(2, false)),
        ]);

        let report = filter_novel(&records, &source, &config(1, 3)).unwrap();

        assert_eq!(candidate_ids(&report), vec!["B", "C"]);
        assert!(report
            .candidates
            .iter()
            .all(|candidate| candidate.status == CandidateStatus::Novel));
        assert_eq!(source.calls_for("A"), 1);
        assert_eq!(source.calls_for("B"), 1);
        assert_eq!(source.calls_for("C"), 3);
        assert_eq!(report.counts.unique_identifiers, 3);
        assert_eq!(report.counts.hit_rows, 4);
        assert_eq!(report.counts.lookup_attempts, 5);
        assert_eq!(report.entries[0].hit.occurrences, 2);
        assert_eq!(report.entries[0].hit.score, 1.0);
    }

    #[test]
    fn exhausted_and_missing_lookups_stay_visible() {
        let records = vec![hit("A", 1.0, 1), hit("GONE", 1.0, 2), hit("FLAKY", 1.0, 3)];
        let source = ScriptedSource::new(vec![
            ("A", Script::Novel),
            ("GONE", Script::Missing),
            ("FLAKY", Script::FailThen(10, false)),
        ]);

        let report = filter_novel(&records, &source, &config(2, 3)).unwrap();

        assert_eq!(candidate_ids(&report), vec!["A", "GONE", "FLAKY"]);
        assert_eq!(report.candidates[1].status, CandidateStatus::Unresolved);
        assert_eq!(report.counts.unresolved, 2);
        assert_eq!(source.calls_for("GONE"), 1);
        assert_eq!(source.calls_for("FLAKY"), 3);

        match &report.entries[2].state {
            LookupState::Unresolved { reason, attempts } => {
                assert_eq!(*attempts, 3);
                assert!(reason.starts_with("retries exhausted"));
            }
            other => panic!("unexpected state {other:?}"),
        }

        let omitted = filter_novel(
            &records,
            &source,
            &NoveltyConfig {
                include_unresolved: false,
                ..config(2, 3)
            },
        )
        .unwrap();
        assert_eq!(candidate_ids(&omitted), vec!["A"]);
        assert_eq!(omitted.counts.unresolved, 2);
    }

    #[test]
    fn parallel_workers_preserve_first_seen_order() {
        let names: Vec<String> = (0..200).map(|index| format!("SEQ{index:03}_HUMAN")).collect();
        let mut records = Vec::new();
        for (index, name) in names.iter().enumerate() {
            records.push(hit(&format!("{name}/1-60"), 10.0, index * 2 + 1));
            records.push(hit(&format!("{name}/70-130"), 9.0, index * 2 + 2));
        }
        let scripts = names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let leaked: &'static str = Box::leak(name.clone().into_boxed_str());
                let script = if index % 3 == 0 { Script::Known } else { Script::Novel };
                (leaked, script)
            })
            .collect();
        let source = ScriptedSource::new(scripts);

        let report = filter_novel(&records, &source, &config(8, 3)).unwrap();

        let expected: Vec<&str> = names
            .iter()
            .enumerate()
            .filter(|(index, _)| index % 3 != 0)
            .map(|(_, name)| name.as_str())
            .collect();
        assert_eq!(candidate_ids(&report), expected);
        assert_eq!(source.total_calls(), 200);
        assert_eq!(report.counts.known + report.counts.novel, 200);
    }

    #[test]
    fn coordinates_are_kept_when_requested() {
        let records = vec![hit("APLP2_HUMAN/309-361", 1.0, 1), hit("APLP2_HUMAN/400-450", 1.0, 2)];
        assert_eq!(dedup_hits(&records, true).len(), 1);
        assert_eq!(dedup_hits(&records, false).len(), 2);
        assert_eq!(dedup_hits(&records, true)[0].identifier, "APLP2_HUMAN");
    }

    #[test]
    fn uniprot_headers_and_coordinate_suffixes_share_one_identifier() {
        let records = vec![
            hit("BPT1_BOVIN/36-88", 80.0, 1),
            hit("sp|P00974|BPT1_BOVIN", 85.0, 2),
            hit("tr|A0A0B4J2F0|PIOS1_HUMAN", 20.0, 3),
        ];

        let unique = dedup_hits(&records, true);

        let ids: Vec<&str> = unique.iter().map(|hit| hit.identifier.as_str()).collect();
        assert_eq!(ids, vec!["BPT1_BOVIN", "PIOS1_HUMAN"]);
        assert_eq!(unique[0].occurrences, 2);
        assert_eq!(unique[0].accession.as_deref(), Some("P00974"));
        assert_eq!(unique[0].score, 80.0);
        assert_eq!(unique[1].accession.as_deref(), Some("A0A0B4J2F0"));

        let kept = dedup_hits(&records, false);
        let ids: Vec<&str> = kept.iter().map(|hit| hit.identifier.as_str()).collect();
        assert_eq!(ids, vec!["BPT1_BOVIN/36-88", "BPT1_BOVIN", "PIOS1_HUMAN"]);
    }

    #[test]
    fn header_accession_reaches_the_annotation_source() {
        let records = vec![hit("sp|P00974|BPT1_BOVIN", 85.0, 1), hit("SPIT1_HUMAN", 70.0, 2)];
        let source = ScriptedSource::new(vec![
            ("BPT1_BOVIN", Script::Known),
            ("SPIT1_HUMAN", Script::Novel),
        ]);

        let report = filter_novel(&records, &source, &config(2, 3)).unwrap();

        assert_eq!(candidate_ids(&report), vec!["SPIT1_HUMAN"]);
        assert_eq!(source.calls_for("BPT1_BOVIN"), 1);
        assert_eq!(source.calls_for("sp|P00974|BPT1_BOVIN"), 0);
        let accessions = source.accessions.lock().unwrap();
        assert_eq!(accessions["BPT1_BOVIN"].as_deref(), Some("P00974"));
        assert_eq!(accessions["SPIT1_HUMAN"], None);
    }
}
