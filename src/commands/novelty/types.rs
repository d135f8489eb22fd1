use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::Serialize;

use crate::annotation::{FamilyCriteria, UniprotConfig};
use crate::cli::{HitFormat, NoveltyArgs};
use crate::model::{InputFile, IssueCounts};
use crate::novelty::{NoveltyConfig, NoveltyCounts};
use crate::retry::RetryPolicy;
use crate::util::latest_run_dir;

pub(super) const CANDIDATES_FILE: &str = "novel_candidates.txt";
pub(super) const VERDICTS_FILE: &str = "novelty_verdicts.tsv";
pub(super) const RUN_SUMMARY_FILE: &str = "novelty_summary.json";

#[derive(Debug, Clone)]
pub(super) struct NoveltyRunConfig {
    pub(super) hits_path: PathBuf,
    pub(super) format: HitFormat,
    pub(super) e_value_threshold: Option<f64>,
    pub(super) output_dir: PathBuf,
    pub(super) novelty: NoveltyConfig,
    pub(super) uniprot: UniprotConfig,
}

impl NoveltyRunConfig {
    pub(super) fn from_args(args: &NoveltyArgs) -> Result<Self> {
        if let Some(threshold) = args
            .e_value_threshold
            .filter(|threshold| !threshold.is_finite() || *threshold < 0.0)
        {
            bail!("e-value threshold must be a finite, non-negative number, got {threshold}");
        }
        if args.max_attempts == 0 {
            bail!("--max-attempts must be at least 1");
        }

        let hits_path = match &args.hits {
            Some(path) => path.clone(),
            None => latest_run_dir(&args.results_root)?.join(&args.hits_file_name),
        };
        let output_dir = args
            .output_dir
            .clone()
            .unwrap_or_else(|| parent_or_current(&hits_path));

        Ok(Self {
            hits_path,
            format: args.format,
            e_value_threshold: args.e_value_threshold,
            output_dir,
            novelty: NoveltyConfig {
                workers: args.workers,
                retry: RetryPolicy {
                    max_attempts: args.max_attempts,
                    initial_backoff_ms: args.initial_backoff_ms,
                    max_backoff_ms: args.max_backoff_ms,
                },
                strip_coordinates: !args.keep_coordinates,
                include_unresolved: !args.omit_unresolved,
            },
            uniprot: UniprotConfig {
                base_url: args.uniprot_base_url.clone(),
                timeout_ms: args.timeout_ms,
                min_request_interval_ms: args.min_request_interval_ms,
                criteria: FamilyCriteria {
                    keyword: args.family_keyword.clone(),
                    pfam_accession: args.pfam_accession.clone(),
                },
            },
        })
    }
}

fn parent_or_current(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Serialize)]
pub(super) struct NoveltyRunSummary {
    pub(super) manifest_version: u32,
    pub(super) run_id: String,
    pub(super) generated_at: String,
    pub(super) status: String,
    pub(super) format: String,
    pub(super) e_value_threshold: Option<f64>,
    pub(super) novelty: NoveltyConfig,
    pub(super) uniprot: UniprotConfig,
    pub(super) inputs: Vec<InputFile>,
    pub(super) comment_lines: usize,
    pub(super) rows_above_threshold: usize,
    pub(super) counts: NoveltyCounts,
    pub(super) issues: IssueCounts,
    pub(super) warnings: Vec<String>,
    pub(super) outputs: Vec<String>,
}
