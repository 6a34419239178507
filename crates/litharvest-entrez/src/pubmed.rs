//! PubMed abstract XML parser using quick-xml
//!
//! Streaming parser for the `PubmedArticleSet` payload returned by efetch.

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;

use crate::xml::{parse_month, read_text, read_text_content};

/// Parsed PubMed abstract record
#[derive(Debug, Default, Serialize)]
pub struct PubmedRecord {
    pub pmid: String,
    pub pmc_id: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub authors: Vec<String>,
    pub pub_year: Option<i32>,
    pub pub_month: Option<i32>,
    pub pub_day: Option<i32>,
    pub mesh_terms: Vec<String>,
    pub keywords: Vec<String>,
}

impl PubmedRecord {
    /// A record without a PMID cannot be attributed and is dropped.
    pub fn is_valid(&self) -> bool {
        !self.pmid.is_empty()
    }
}

/// Parse all articles from a `PubmedArticleSet` payload.
pub fn parse_abstract_set(xml: &str) -> Result<Vec<PubmedRecord>> {
    let mut reader = Reader::from_str(xml);

    let mut records = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"PubmedArticle" => {
                match parse_record(&mut reader) {
                    Ok(record) if record.is_valid() => records.push(record),
                    Ok(_) => log::debug!("skipping article without PMID"),
                    Err(e) => log::debug!("failed to parse article: {e}"),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e).context("PubMed XML parse error"),
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn parse_record(reader: &mut Reader<&[u8]>) -> Result<PubmedRecord> {
    let mut record = PubmedRecord::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"MedlineCitation" => parse_citation(reader, &mut record)?,
                b"PubmedData" => parse_pubmed_data(reader, &mut record)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"PubmedArticle" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(record)
}

fn parse_citation(reader: &mut Reader<&[u8]>, record: &mut PubmedRecord) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                // CommentsCorrections also nests PMID elements; first wins
                b"PMID" if record.pmid.is_empty() => record.pmid = read_text(reader)?,
                b"Article" => parse_article_element(reader, record)?,
                b"MeshHeadingList" => parse_mesh_list(reader, record)?,
                b"KeywordList" => parse_keyword_list(reader, record)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"MedlineCitation" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_article_element(reader: &mut Reader<&[u8]>, record: &mut PubmedRecord) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Journal" => parse_journal(reader, record)?,
                b"ArticleTitle" => {
                    record.title = Some(read_text_content(reader, b"ArticleTitle")?);
                }
                b"Abstract" => record.abstract_text = Some(parse_abstract(reader)?),
                b"AuthorList" => parse_author_list(reader, record)?,
                b"ELocationID" => {
                    // DOI lives here when ArticleIdList omits it
                    let is_doi = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"EIdType" && &*a.value == b"doi"
                    });
                    let text = read_text(reader)?;
                    if is_doi && record.doi.is_none() && !text.is_empty() {
                        record.doi = Some(text);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Article" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_journal(reader: &mut Reader<&[u8]>, record: &mut PubmedRecord) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Title" => record.journal = Some(read_text(reader)?),
                b"PubDate" => parse_pub_date(reader, record)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Journal" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_pub_date(reader: &mut Reader<&[u8]>, record: &mut PubmedRecord) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Year" => record.pub_year = read_text(reader)?.parse().ok(),
                b"Month" => record.pub_month = parse_month(&read_text(reader)?),
                b"Day" => record.pub_day = read_text(reader)?.parse().ok(),
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"PubDate" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_abstract(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut parts = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"AbstractText" => {
                parts.push(read_text_content(reader, b"AbstractText")?);
            }
            Event::End(e) if e.name().as_ref() == b"Abstract" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(parts.join(" "))
}

fn parse_author_list(reader: &mut Reader<&[u8]>, record: &mut PubmedRecord) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"Author" => {
                if let Some(name) = parse_author(reader)? {
                    record.authors.push(name);
                }
            }
            Event::End(e) if e.name().as_ref() == b"AuthorList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Returns "LastName ForeName", falling back to initials.
fn parse_author(reader: &mut Reader<&[u8]>) -> Result<Option<String>> {
    let mut last_name = String::new();
    let mut fore_name = String::new();
    let mut initials = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"LastName" => last_name = read_text(reader)?,
                b"ForeName" => fore_name = read_text(reader)?,
                b"Initials" => initials = read_text(reader)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Author" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if last_name.is_empty() {
        return Ok(None);
    }
    let given = if fore_name.is_empty() {
        &initials
    } else {
        &fore_name
    };
    Ok(Some(format!("{last_name} {given}").trim().to_string()))
}

fn parse_mesh_list(reader: &mut Reader<&[u8]>, record: &mut PubmedRecord) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"DescriptorName" => {
                let term = read_text(reader)?;
                if !term.is_empty() {
                    record.mesh_terms.push(term);
                }
            }
            Event::End(e) if e.name().as_ref() == b"MeshHeadingList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_keyword_list(reader: &mut Reader<&[u8]>, record: &mut PubmedRecord) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"Keyword" => {
                let kw = read_text(reader)?;
                if !kw.is_empty() {
                    record.keywords.push(kw);
                }
            }
            Event::End(e) if e.name().as_ref() == b"KeywordList" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_pubmed_data(reader: &mut Reader<&[u8]>, record: &mut PubmedRecord) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"ArticleId" => {
                let id_type: Option<Vec<u8>> = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"IdType")
                    .map(|a| a.value.to_vec());
                let text = read_text(reader)?;
                if text.is_empty() {
                    continue;
                }
                match id_type.as_deref() {
                    Some(b"doi") if record.doi.is_none() => record.doi = Some(text),
                    Some(b"pmc") if record.pmc_id.is_none() => record.pmc_id = Some(text),
                    _ => {}
                }
            }
            Event::End(e) if e.name().as_ref() == b"PubmedData" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}
