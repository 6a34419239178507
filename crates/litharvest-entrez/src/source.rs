//! External catalog sources and identifier normalization

use serde::{Deserialize, Serialize};

/// The two external literature catalogs harvested by the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// PubMed abstracts
    Pubmed,
    /// PMC open-access full text
    Pmc,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Pubmed, Source::Pmc];

    /// Parse CLI/config string into enum
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "pubmed" => Some(Self::Pubmed),
            "pmc" => Some(Self::Pmc),
            _ => None,
        }
    }

    /// E-utilities `db` parameter
    pub fn db_name(self) -> &'static str {
        match self {
            Self::Pubmed => "pubmed",
            Self::Pmc => "pmc",
        }
    }

    /// Canonical textual form of a raw identifier from this source.
    ///
    /// PMC accessions carry an uppercase `PMC` prefix; esearch returns them
    /// bare or mixed-case depending on the endpoint, so both spellings of
    /// the same record must collapse to one key in the dedup index.
    /// PubMed identifiers are bare digit strings.
    pub fn normalize_id(self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            Self::Pubmed => trimmed.to_string(),
            Self::Pmc => {
                let rest = trimmed
                    .strip_prefix("PMC")
                    .or_else(|| trimmed.strip_prefix("pmc"))
                    .or_else(|| trimmed.strip_prefix("Pmc"))
                    .unwrap_or(trimmed);
                format!("PMC{rest}")
            }
        }
    }

    /// Strip the canonical prefix back off for an efetch id parameter.
    pub fn fetch_id<'a>(self, id: &'a str) -> &'a str {
        match self {
            Self::Pubmed => id,
            Self::Pmc => id.strip_prefix("PMC").unwrap_or(id),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.db_name())
    }
}
