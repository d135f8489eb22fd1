use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::cli::{AbsentLabelPolicy, SequenceKey};
use crate::hits::HitRecord;
use crate::labels::LabelMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassifierConfig {
    pub e_value_threshold: f64,
    pub absent_label: AbsentLabelPolicy,
    pub key: SequenceKey,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    TruePositive,
    FalsePositive,
    TrueNegative,
    FalseNegative,
}

impl Outcome {
    pub fn decide(predicted: bool, actual: bool) -> Self {
        match (predicted, actual) {
            (true, true) => Self::TruePositive,
            (true, false) => Self::FalsePositive,
            (false, true) => Self::FalseNegative,
            (false, false) => Self::TrueNegative,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TruePositive => "true_positive",
            Self::FalsePositive => "false_positive",
            Self::TrueNegative => "true_negative",
            Self::FalseNegative => "false_negative",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounts {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionCounts {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::TruePositive => self.true_positive += 1,
            Outcome::FalsePositive => self.false_positive += 1,
            Outcome::TrueNegative => self.true_negative += 1,
            Outcome::FalseNegative => self.false_negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub specificity: f64,
}

impl Metrics {
    pub fn from_counts(counts: &ConfusionCounts) -> Self {
        let precision = ratio(
            counts.true_positive,
            counts.true_positive + counts.false_positive,
        );
        let recall = ratio(
            counts.true_positive,
            counts.true_positive + counts.false_negative,
        );
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: ratio(
                counts.true_positive + counts.true_negative,
                counts.total(),
            ),
            precision,
            recall,
            f1,
            specificity: ratio(
                counts.true_negative,
                counts.true_negative + counts.false_positive,
            ),
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifierOutcome {
    pub identifier: String,
    pub label: Option<bool>,
    pub best_e_value: Option<f64>,
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub counts: ConfusionCounts,
    pub metrics: Metrics,
    pub outcomes: Vec<IdentifierOutcome>,
    pub unlabeled: Vec<String>,
    pub labels_without_hits: usize,
}

/// Best hit per identifier: lowest e-value, then highest score, then earliest line.
pub fn best_hits(records: &[HitRecord], key: SequenceKey) -> BTreeMap<&str, &HitRecord> {
    let mut best = BTreeMap::<&str, &HitRecord>::new();

    for record in records {
        let identifier = record.sequence_id(key);
        let replace = best
            .get(identifier)
            .map(|current| is_better_hit(record, current))
            .unwrap_or(true);
        if replace {
            best.insert(identifier, record);
        }
    }

    best
}

fn is_better_hit(candidate: &HitRecord, current: &HitRecord) -> bool {
    candidate
        .e_value
        .total_cmp(&current.e_value)
        .then_with(|| current.score.total_cmp(&candidate.score))
        .is_lt()
}

pub fn classify(
    records: &[HitRecord],
    labels: &LabelMap,
    config: &ClassifierConfig,
) -> Classification {
    let best = best_hits(records, config.key);

    let identifiers: BTreeSet<&str> = labels
        .identifiers()
        .chain(best.keys().copied())
        .collect();

    let mut counts = ConfusionCounts::default();
    let mut outcomes = Vec::with_capacity(identifiers.len());
    let mut unlabeled = Vec::new();
    let mut labels_without_hits = 0usize;

    for identifier in identifiers {
        let label = labels.get(identifier);
        let best_e_value = best.get(identifier).map(|record| record.e_value);
        let predicted = best_e_value
            .map(|e_value| e_value <= config.e_value_threshold)
            .unwrap_or(false);

        if best_e_value.is_none() {
            labels_without_hits += 1;
        }

        let actual = match (label, config.absent_label) {
            (Some(value), _) => Some(value),
            (None, policy) => {
                warn!(
                    identifier,
                    policy = policy.as_str(),
                    "hit identifier has no ground-truth label"
                );
                unlabeled.push(identifier.to_string());
                match policy {
                    AbsentLabelPolicy::Negative => Some(false),
                    AbsentLabelPolicy::Exclude => None,
                }
            }
        };

        let outcome = actual.map(|actual| Outcome::decide(predicted, actual));
        if let Some(outcome) = outcome {
            counts.record(outcome);
            debug!(identifier, outcome = outcome.as_str(), "classified");
        }

        outcomes.push(IdentifierOutcome {
            identifier: identifier.to_string(),
            label,
            best_e_value,
            outcome,
        });
    }

    if labels_without_hits > 0 {
        warn!(
            labels_without_hits,
            "labeled identifiers absent from the hit table"
        );
    }

    Classification {
        metrics: Metrics::from_counts(&counts),
        counts,
        outcomes,
        unlabeled,
        labels_without_hits,
    }
}
