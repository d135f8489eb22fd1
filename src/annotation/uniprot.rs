use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{AnnotationSource, AnnotationVerdict, LookupError, RateLimiter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyCriteria {
    pub keyword: String,
    pub pfam_accession: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UniprotConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub min_request_interval_ms: u64,
    pub criteria: FamilyCriteria,
}

pub struct UniprotClient {
    client: Client,
    base_url: String,
    criteria: FamilyCriteria,
    limiter: RateLimiter,
}

impl UniprotClient {
    pub fn new(config: &UniprotConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(concat!("hmmeval/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build UniProt HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            criteria: config.criteria.clone(),
            limiter: RateLimiter::new(Duration::from_millis(config.min_request_interval_ms)),
        })
    }

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, LookupError> {
        self.limiter.acquire();

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|err| LookupError::Transient(err.to_string()))?;

        classify_status(response.status())?;

        response
            .json::<Value>()
            .map_err(|err| LookupError::Transient(format!("unreadable response body: {err}")))
    }

    #[instrument(skip(self))]
    fn resolve_accession(&self, entry_name: &str) -> Result<String, LookupError> {
        let url = format!("{}/uniprotkb/search", self.base_url);
        let query = [
            ("query", format!("mnemonic:{entry_name}")),
            ("fields", "accession".to_string()),
            ("format", "json".to_string()),
        ];
        let body = self.get_json(&url, &query)?;

        let accession = first_accession(&body).ok_or(LookupError::NotFound)?;
        debug!(accession = %accession, "resolved accession");
        Ok(accession)
    }

    #[instrument(skip(self))]
    fn fetch_entry(&self, accession: &str) -> Result<Value, LookupError> {
        let url = format!("{}/uniprotkb/{}.json", self.base_url, accession);
        self.get_json(&url, &[])
    }
}

impl AnnotationSource for UniprotClient {
    fn lookup(
        &self,
        identifier: &str,
        accession: Option<&str>,
    ) -> Result<AnnotationVerdict, LookupError> {
        let accession = match accession {
            Some(accession) => accession.to_string(),
            None => self.resolve_accession(identifier)?,
        };
        let entry = self.fetch_entry(&accession)?;
        let evidence = family_evidence(&entry, &self.criteria);

        Ok(AnnotationVerdict {
            identifier: identifier.to_string(),
            is_known: evidence.is_some(),
            evidence: evidence.unwrap_or_default(),
            accession: Some(accession),
        })
    }
}

fn classify_status(status: StatusCode) -> Result<(), LookupError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::NOT_FOUND {
        Err(LookupError::NotFound)
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Err(LookupError::Transient(format!("HTTP {status}")))
    } else {
        Err(LookupError::Rejected(format!("HTTP {status}")))
    }
}

fn first_accession(body: &Value) -> Option<String> {
    body["results"]
        .as_array()?
        .iter()
        .find_map(|result| result["primaryAccession"].as_str())
        .map(ToOwned::to_owned)
}

/// Describes the first piece of entry annotation that matches `criteria`.
///
/// Accepts both the current entry JSON (`keywords[].name`,
/// `uniProtKBCrossReferences`) and the legacy one (`keywords[].value`,
/// `dbReferences`).
pub(crate) fn family_evidence(entry: &Value, criteria: &FamilyCriteria) -> Option<String> {
    let keyword = criteria.keyword.as_str();

    let feature_match = array_items(entry, "features").find_map(|feature| {
        let description = feature["description"].as_str()?;
        description
            .contains(keyword)
            .then(|| format!("feature:{description}"))
    });
    if feature_match.is_some() {
        return feature_match;
    }

    let keyword_match = array_items(entry, "keywords").find_map(|item| {
        let value = item["name"].as_str().or_else(|| item["value"].as_str())?;
        value.contains(keyword).then(|| format!("keyword:{value}"))
    });
    if keyword_match.is_some() {
        return keyword_match;
    }

    array_items(entry, "uniProtKBCrossReferences")
        .chain(array_items(entry, "dbReferences"))
        .find_map(|reference| {
            let database = reference["database"]
                .as_str()
                .or_else(|| reference["type"].as_str())?;
            let id = reference["id"].as_str()?;
            (database == "Pfam" && id == criteria.pfam_accession).then(|| format!("pfam:{id}"))
        })
}

fn array_items<'a>(entry: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
    entry[field].as_array().into_iter().flatten()
}
