use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputFile {
    pub role: String,
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueCounts {
    pub skipped_hit_rows: usize,
    pub skipped_label_rows: usize,
    pub unlabeled_hit_identifiers: usize,
    pub labels_without_hits: usize,
    pub unresolved_lookups: usize,
}
