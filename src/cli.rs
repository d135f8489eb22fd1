use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "hmmeval",
    version,
    about = "Validation and novelty filtering for profile-HMM domain searches"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check seed, validation and label inputs before a search run.
    Check(CheckArgs),
    /// Score a validation hit table against ground-truth labels.
    Evaluate(EvaluateArgs),
    /// Flag reference-search hits that are not yet annotated with the family.
    Novelty(NoveltyArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitFormat {
    Tblout,
    Domtblout,
}

impl HitFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tblout => "tblout",
            Self::Domtblout => "domtblout",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKey {
    Target,
    Query,
}

impl SequenceKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Query => "query",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentLabelPolicy {
    Negative,
    Exclude,
}

impl AbsentLabelPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Exclude => "exclude",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[arg(long, default_value = "data/kunitz_seed.sto")]
    pub seed: PathBuf,

    #[arg(long, default_value = "data/validation.fasta")]
    pub validation_fasta: PathBuf,

    #[arg(long, default_value = "data/validation_labels.txt")]
    pub labels: PathBuf,

    #[arg(long, default_value_t = false)]
    pub strict: bool,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub hits: PathBuf,

    #[arg(long, default_value = "data/validation_labels.txt")]
    pub labels: PathBuf,

    #[arg(long, value_enum, default_value_t = HitFormat::Tblout)]
    pub format: HitFormat,

    #[arg(long, default_value_t = 1e-5)]
    pub e_value_threshold: f64,

    #[arg(long, value_enum, default_value_t = SequenceKey::Target)]
    pub sequence_key: SequenceKey,

    #[arg(long, value_enum, default_value_t = AbsentLabelPolicy::Negative)]
    pub absent_label: AbsentLabelPolicy,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct NoveltyArgs {
    /// Hit table to filter; when absent the newest `run_*` under
    /// `--results-root` is used.
    #[arg(long)]
    pub hits: Option<PathBuf>,

    #[arg(long, default_value = "results")]
    pub results_root: PathBuf,

    #[arg(long, default_value = "hmmsearch_swissprot.tbl")]
    pub hits_file_name: String,

    #[arg(long, value_enum, default_value_t = HitFormat::Tblout)]
    pub format: HitFormat,

    #[arg(long)]
    pub e_value_threshold: Option<f64>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    #[arg(long, default_value_t = 500)]
    pub initial_backoff_ms: u64,

    #[arg(long, default_value_t = 8000)]
    pub max_backoff_ms: u64,

    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,

    #[arg(long, default_value_t = 200)]
    pub min_request_interval_ms: u64,

    #[arg(long, default_value = "https://rest.uniprot.org")]
    pub uniprot_base_url: String,

    #[arg(long, default_value = "Kunitz")]
    pub family_keyword: String,

    #[arg(long, default_value = "PF00014")]
    pub pfam_accession: String,

    #[arg(long, default_value_t = false)]
    pub keep_coordinates: bool,

    #[arg(long, default_value_t = false)]
    pub omit_unresolved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_options_parse_and_name_themselves_consistently() {
        let cli = Cli::try_parse_from([
            "hmmeval",
            "evaluate",
            "--hits",
            "results/run_20250711_1015/hmmsearch_validation.tbl",
            "--sequence-key",
            "query",
            "--absent-label",
            "exclude",
        ])
        .unwrap();

        let Commands::Evaluate(args) = cli.command else {
            panic!("expected evaluate");
        };
        assert_eq!(args.sequence_key, SequenceKey::Query);
        assert_eq!(args.absent_label, AbsentLabelPolicy::Exclude);
        assert_eq!(args.e_value_threshold, 1e-5);
        assert_eq!(args.format, HitFormat::Tblout);

        for key in [SequenceKey::Target, SequenceKey::Query] {
            assert_eq!(
                serde_json::to_value(key).unwrap(),
                serde_json::Value::from(key.as_str())
            );
        }
        assert_eq!(
            serde_json::to_value(HitFormat::Domtblout).unwrap(),
            serde_json::Value::from(HitFormat::Domtblout.as_str())
        );
    }
}
