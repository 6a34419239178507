//! PMC full-text XML parser using quick-xml
//!
//! Streaming parser for the `pmc-articleset` payload returned by efetch.
//! Front matter (ids, title, abstract, authors) plus the flattened body
//! text; figures, tables, and reference lists are not materialized.

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

use crate::source::Source;
use crate::xml::{normalize_ws, parse_month, read_text, read_text_content};

/// Parsed PMC full-text record
#[derive(Debug, Default, Serialize)]
pub struct PmcRecord {
    pub pmc_id: String,
    pub pmid: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub authors: Vec<String>,
    pub pub_year: Option<i32>,
    pub pub_month: Option<i32>,
    pub pub_day: Option<i32>,
    pub keywords: Vec<String>,
    pub article_type: Option<String>,
    pub body_text: Option<String>,
}

impl PmcRecord {
    /// A record without an accession cannot be attributed and is dropped.
    pub fn is_valid(&self) -> bool {
        !self.pmc_id.is_empty()
    }
}

/// Parse all articles from a `pmc-articleset` payload.
pub fn parse_article_set(xml: &str) -> Result<Vec<PmcRecord>> {
    let mut reader = Reader::from_str(xml);

    let mut records = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"article" => {
                let article_type = attr_value(&e, b"article-type");
                match parse_article(&mut reader, article_type) {
                    Ok(record) if record.is_valid() => records.push(record),
                    Ok(_) => log::debug!("skipping article without PMC accession"),
                    Err(e) => log::debug!("failed to parse article: {e}"),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e).context("PMC XML parse error"),
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn parse_article(reader: &mut Reader<&[u8]>, article_type: Option<String>) -> Result<PmcRecord> {
    let mut record = PmcRecord {
        article_type,
        ..PmcRecord::default()
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"front" => parse_front(reader, &mut record)?,
                b"body" => record.body_text = Some(parse_body(reader)?),
                // Skip back matter: reference lists repeat titles and ids
                b"back" => skip_element(reader, b"back")?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"article" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(record)
}

fn parse_front(reader: &mut Reader<&[u8]>, record: &mut PmcRecord) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"article-id" => {
                    let id_type = attr_value(&e, b"pub-id-type");
                    let text = read_text(reader)?;
                    if text.is_empty() {
                        continue;
                    }
                    match id_type.as_deref() {
                        Some("pmc" | "pmcid") if record.pmc_id.is_empty() => {
                            record.pmc_id = Source::Pmc.normalize_id(&text);
                        }
                        Some("pmid") if record.pmid.is_none() => record.pmid = Some(text),
                        Some("doi") if record.doi.is_none() => record.doi = Some(text),
                        _ => {}
                    }
                }
                b"journal-title" if record.journal.is_none() => {
                    record.journal = Some(read_text(reader)?);
                }
                b"article-title" if record.title.is_none() => {
                    record.title = Some(read_text_content(reader, b"article-title")?);
                }
                b"abstract" if record.abstract_text.is_none() => {
                    record.abstract_text = Some(parse_abstract(reader)?);
                }
                b"contrib" => {
                    if attr_value(&e, b"contrib-type").as_deref() == Some("author") {
                        if let Some(name) = parse_contrib_name(reader)? {
                            record.authors.push(name);
                        }
                    }
                }
                b"pub-date" if record.pub_year.is_none() => {
                    parse_pub_date(reader, record)?;
                }
                b"kwd" => {
                    let kw = read_text(reader)?;
                    if !kw.is_empty() {
                        record.keywords.push(kw);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"front" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Returns "Surname Given-Names" from a `<contrib>` element.
fn parse_contrib_name(reader: &mut Reader<&[u8]>) -> Result<Option<String>> {
    let mut surname = String::new();
    let mut given = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"surname" => surname = read_text(reader)?,
                b"given-names" => given = read_text(reader)?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"contrib" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if surname.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!("{surname} {given}").trim().to_string()))
}

fn parse_pub_date(reader: &mut Reader<&[u8]>, record: &mut PmcRecord) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"year" => record.pub_year = read_text(reader)?.parse().ok(),
                b"month" => record.pub_month = parse_month(&read_text(reader)?),
                b"day" => record.pub_day = read_text(reader)?.parse().ok(),
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"pub-date" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Abstract content: paragraph children joined, bare text kept.
fn parse_abstract(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut parts = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"p" => {
                let text = read_text_content(reader, b"p")?;
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Event::Text(e) => {
                let text = normalize_ws(&e.unescape()?);
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Event::End(e) if e.name().as_ref() == b"abstract" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(parts.join(" "))
}

/// Flatten body paragraphs into one whitespace-normalized string.
fn parse_body(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut parts = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"p" => {
                let text = read_text_content(reader, b"p")?;
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Event::End(e) if e.name().as_ref() == b"body" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(parts.join(" "))
}

fn skip_element(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && e.name().as_ref() == end_tag {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version="1.0"?>
<pmc-articleset>
  <article article-type="research-article">
    <front>
      <journal-meta>
        <journal-title>Orphanet Reports</journal-title>
      </journal-meta>
      <article-meta>
        <article-id pub-id-type="pmc">9991234</article-id>
        <article-id pub-id-type="pmid">38012345</article-id>
        <article-id pub-id-type="doi">10.1000/or.2024.17</article-id>
        <title-group>
          <article-title>Natural history of <italic>TTN</italic> myopathy</article-title>
        </title-group>
        <contrib-group>
          <contrib contrib-type="author">
            <name><surname>Lee</surname><given-names>Min</given-names></name>
          </contrib>
          <contrib contrib-type="editor">
            <name><surname>Editor</surname><given-names>E</given-names></name>
          </contrib>
        </contrib-group>
        <pub-date pub-type="epub"><day>3</day><month>11</month><year>2023</year></pub-date>
        <abstract><p>Background text.</p><p>Conclusion text.</p></abstract>
        <kwd-group><kwd>myopathy</kwd><kwd>titin</kwd></kwd-group>
      </article-meta>
    </front>
    <body>
      <sec><title>Intro</title><p>First paragraph.</p></sec>
      <sec><p>Second <italic>paragraph</italic>.</p></sec>
    </body>
    <back>
      <ref-list>
        <ref><element-citation><article-title>Cited title</article-title></element-citation></ref>
      </ref-list>
    </back>
  </article>
</pmc-articleset>"#;

    #[test]
    fn parses_identifiers_normalized() {
        let records = parse_article_set(SAMPLE_XML).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.pmc_id, "PMC9991234");
        assert_eq!(r.pmid.as_deref(), Some("38012345"));
        assert_eq!(r.doi.as_deref(), Some("10.1000/or.2024.17"));
    }

    #[test]
    fn title_flattens_markup() {
        let records = parse_article_set(SAMPLE_XML).unwrap();
        assert_eq!(
            records[0].title.as_deref(),
            Some("Natural history of TTN myopathy")
        );
    }

    #[test]
    fn only_authors_collected() {
        let records = parse_article_set(SAMPLE_XML).unwrap();
        assert_eq!(records[0].authors, vec!["Lee Min"]);
    }

    #[test]
    fn abstract_paragraphs_joined() {
        let records = parse_article_set(SAMPLE_XML).unwrap();
        assert_eq!(
            records[0].abstract_text.as_deref(),
            Some("Background text. Conclusion text.")
        );
    }

    #[test]
    fn body_paragraphs_joined() {
        let records = parse_article_set(SAMPLE_XML).unwrap();
        assert_eq!(
            records[0].body_text.as_deref(),
            Some("First paragraph. Second paragraph.")
        );
    }

    #[test]
    fn back_matter_does_not_leak_into_title() {
        let records = parse_article_set(SAMPLE_XML).unwrap();
        assert!(!records[0].title.as_deref().unwrap().contains("Cited"));
    }

    #[test]
    fn pub_date_and_keywords() {
        let records = parse_article_set(SAMPLE_XML).unwrap();
        let r = &records[0];
        assert_eq!(r.pub_year, Some(2023));
        assert_eq!(r.pub_month, Some(11));
        assert_eq!(r.pub_day, Some(3));
        assert_eq!(r.keywords, vec!["myopathy", "titin"]);
        assert_eq!(r.article_type.as_deref(), Some("research-article"));
    }

    #[test]
    fn article_without_accession_dropped() {
        let xml = r#"<pmc-articleset><article><front><article-meta>
            <article-id pub-id-type="doi">10.1/x</article-id>
            </article-meta></front></article></pmc-articleset>"#;
        assert!(parse_article_set(xml).unwrap().is_empty());
    }

    #[test]
    fn empty_set() {
        assert!(parse_article_set("<pmc-articleset/>").unwrap().is_empty());
    }
}
