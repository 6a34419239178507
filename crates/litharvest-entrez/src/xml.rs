//! Shared quick-xml helpers for the record parsers
//!
//! Readers run without text trimming so spacing around inline markup
//! (`<i>`, `<sup>`, ...) survives; helpers collapse whitespace once at
//! the element boundary instead.

use anyhow::Result;
use quick_xml::Reader;
use quick_xml::events::Event;

/// Collapse whitespace runs and trim the ends.
pub(crate) fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Raw text up to the next end tag, descending into nested markup.
fn collect_raw(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::End(_) => break,
            Event::Start(_) => text.push_str(&collect_raw(reader)?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Whitespace-normalized text content until the next end tag.
pub(crate) fn read_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    Ok(normalize_ws(&collect_raw(reader)?))
}

/// Whitespace-normalized content of a specific element, tracking depth so
/// nested tags with the same name do not end the scan early.
pub(crate) fn read_text_content(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
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

    Ok(normalize_ws(&text))
}

/// Numeric month from either a number or an English abbreviation.
pub(crate) fn parse_month(s: &str) -> Option<i32> {
    match s.parse::<i32>() {
        Ok(n) => Some(n),
        Err(_) => match s.to_lowercase().as_str() {
            "jan" => Some(1),
            "feb" => Some(2),
            "mar" => Some(3),
            "apr" => Some(4),
            "may" => Some(5),
            "jun" => Some(6),
            "jul" => Some(7),
            "aug" => Some(8),
            "sep" => Some(9),
            "oct" => Some(10),
            "nov" => Some(11),
            "dec" => Some(12),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_inside(xml: &str, tag: &[u8]) -> Reader<&'static [u8]> {
        let leaked: &'static str = Box::leak(xml.to_string().into_boxed_str());
        let mut reader = Reader::from_str(leaked);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).unwrap() {
                Event::Start(e) if e.name().as_ref() == tag => break,
                Event::Eof => panic!("tag not found"),
                _ => {}
            }
            buf.clear();
        }
        reader
    }

    #[test]
    fn parse_month_numeric() {
        assert_eq!(parse_month("3"), Some(3));
        assert_eq!(parse_month("12"), Some(12));
    }

    #[test]
    fn parse_month_abbreviation() {
        assert_eq!(parse_month("Jan"), Some(1));
        assert_eq!(parse_month("dec"), Some(12));
    }

    #[test]
    fn parse_month_invalid() {
        assert_eq!(parse_month("Janvier"), None);
        assert_eq!(parse_month(""), None);
    }

    #[test]
    fn read_text_keeps_spacing_around_markup() {
        let mut reader = reader_inside("<t>alpha <i>beta</i> gamma</t>", b"t");
        assert_eq!(read_text(&mut reader).unwrap(), "alpha beta gamma");
    }

    #[test]
    fn read_text_no_space_injected_inside_words() {
        let mut reader = reader_inside("<t>anti-<i>x</i>ray</t>", b"t");
        assert_eq!(read_text(&mut reader).unwrap(), "anti-xray");
    }

    #[test]
    fn read_text_content_handles_nested_same_names() {
        let mut reader = reader_inside("<p>outer <p>inner</p> tail</p>", b"p");
        assert_eq!(
            read_text_content(&mut reader, b"p").unwrap(),
            "outer inner tail"
        );
    }

    #[test]
    fn read_text_collapses_newlines() {
        let mut reader = reader_inside("<t>\n  spread\n  over lines\n</t>", b"t");
        assert_eq!(read_text(&mut reader).unwrap(), "spread over lines");
    }
}
