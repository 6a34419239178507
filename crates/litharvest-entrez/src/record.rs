//! Uniform record view over both catalogs' parsers
//!
//! The pipeline stores parsed fields opaquely; only the canonical
//! identifier is interpreted (for provenance lookup and resume-skip).

use anyhow::Result;

use crate::source::Source;
use crate::{pmc, pubmed};

/// One parsed record: canonical identifier plus opaque structured fields.
#[derive(Debug)]
pub struct ParsedRecord {
    pub identifier: String,
    pub fields: serde_json::Value,
}

/// Parse a raw efetch payload into records for the given source.
pub fn parse_records(source: Source, xml: &str) -> Result<Vec<ParsedRecord>> {
    let records = match source {
        Source::Pubmed => pubmed::parse_abstract_set(xml)?
            .into_iter()
            .map(|r| {
                Ok(ParsedRecord {
                    identifier: source.normalize_id(&r.pmid),
                    fields: serde_json::to_value(&r)?,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Source::Pmc => pmc::parse_article_set(xml)?
            .into_iter()
            .map(|r| {
                Ok(ParsedRecord {
                    identifier: r.pmc_id.clone(),
                    fields: serde_json::to_value(&r)?,
                })
            })
            .collect::<Result<Vec<_>>>()?,
    };
    Ok(records)
}
