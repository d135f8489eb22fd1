mod rate_limit;
mod uniprot;

use serde::Serialize;
use thiserror::Error;

use crate::retry::Retryable;

pub use rate_limit::RateLimiter;
pub use uniprot::{FamilyCriteria, UniprotClient, UniprotConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationVerdict {
    pub identifier: String,
    pub is_known: bool,
    pub evidence: String,
    pub accession: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("transient lookup failure: {0}")]
    Transient(String),
    #[error("identifier not found in annotation source")]
    NotFound,
    #[error("annotation source rejected the request: {0}")]
    Rejected(String),
}

impl Retryable for LookupError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub trait AnnotationSource: Send + Sync {
    // `accession` is set when the hit table already names the entry.
    fn lookup(
        &self,
        identifier: &str,
        accession: Option<&str>,
    ) -> Result<AnnotationVerdict, LookupError>;
}
