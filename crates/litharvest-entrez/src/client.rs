//! E-utilities client: paged id search and batch record fetch

use litharvest_core::{FetchError, fetch_text, http_client};
use serde::Deserialize;

use crate::source::Source;

/// Default E-utilities endpoint
pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// One page of search results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    /// Total match count for the query (not the page length)
    pub count: usize,
    /// Raw identifiers on this page, in service order
    pub ids: Vec<String>,
}

/// The external catalog interface the pipeline consumes.
///
/// One implementation speaks to the live service; tests substitute a
/// deterministic mock. The pipeline never reaches below this boundary.
pub trait Catalog: Send + Sync {
    /// Total match count for a query (no ids retrieved).
    fn search_count(&self, source: Source, term: &str) -> Result<usize, FetchError>;

    /// One page of identifiers, honoring the retstart/retmax contract.
    fn search_page(
        &self,
        source: Source,
        term: &str,
        retstart: usize,
        retmax: usize,
    ) -> Result<SearchPage, FetchError>;

    /// Raw XML payload for a batch of identifiers.
    fn fetch_batch(&self, source: Source, ids: &[String]) -> Result<String, FetchError>;
}

/// Client for the NCBI E-utilities endpoints.
///
/// Holds no per-request state; each worker constructs one at startup and
/// keeps it for the pool's lifetime.
#[derive(Debug, Clone)]
pub struct EntrezClient {
    base_url: String,
    email: String,
    api_key: Option<String>,
}

const TOOL_NAME: &str = "litharvest";

impl EntrezClient {
    pub fn new(base_url: &str, email: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Identification params the service asks every client to send
    fn ident_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("tool", TOOL_NAME.to_string()),
            ("email", self.email.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    fn esearch(
        &self,
        source: Source,
        term: &str,
        retstart: usize,
        retmax: usize,
    ) -> Result<SearchPage, FetchError> {
        let url = format!("{}/esearch.fcgi", self.base_url);
        let req = http_client()
            .get(&url)
            .query(&[
                ("db", source.db_name()),
                ("term", term),
                ("retmode", "json"),
            ])
            .query(&[("retstart", retstart), ("retmax", retmax)])
            .query(&self.ident_params());

        let body = fetch_text(req)?;
        parse_esearch_json(&body)
    }
}

impl Catalog for EntrezClient {
    fn search_count(&self, source: Source, term: &str) -> Result<usize, FetchError> {
        Ok(self.esearch(source, term, 0, 0)?.count)
    }

    fn search_page(
        &self,
        source: Source,
        term: &str,
        retstart: usize,
        retmax: usize,
    ) -> Result<SearchPage, FetchError> {
        self.esearch(source, term, retstart, retmax)
    }

    fn fetch_batch(&self, source: Source, ids: &[String]) -> Result<String, FetchError> {
        let url = format!("{}/efetch.fcgi", self.base_url);
        let joined = ids
            .iter()
            .map(|id| source.fetch_id(id))
            .collect::<Vec<_>>()
            .join(",");

        // POST: batches of several hundred ids exceed any sane URL length
        let mut form = vec![
            ("db", source.db_name().to_string()),
            ("id", joined),
            ("rettype", "xml".to_string()),
            ("retmode", "xml".to_string()),
        ];
        for (k, v) in self.ident_params() {
            form.push((k, v));
        }

        fetch_text(http_client().post(&url).form(&form))
    }
}

#[derive(Deserialize)]
struct EsearchEnvelope {
    esearchresult: EsearchResult,
}

#[derive(Deserialize)]
struct EsearchResult {
    count: String,
    #[serde(default)]
    idlist: Vec<String>,
}

/// Parse the esearch JSON envelope into a [`SearchPage`].
fn parse_esearch_json(body: &str) -> Result<SearchPage, FetchError> {
    let envelope: EsearchEnvelope = serde_json::from_str(body)
        .map_err(|e| FetchError::Decode(format!("esearch response: {e}")))?;
    let count = envelope
        .esearchresult
        .count
        .parse::<usize>()
        .map_err(|e| FetchError::Decode(format!("esearch count: {e}")))?;

    Ok(SearchPage {
        count,
        ids: envelope.esearchresult.idlist,
    })
}
