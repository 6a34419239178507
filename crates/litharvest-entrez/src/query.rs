//! Search-term variants for one subject
//!
//! Disease names come from curated lists full of punctuation the catalogs
//! choke on (commas, parentheses, slashes). Each subject gets an ordered
//! list of query variants, tried strictly in order; the first variant with
//! a nonzero match count is adopted.

/// Strip characters outside word/space/hyphen/dot and collapse whitespace.
pub fn clean_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' {
            cleaned.push(c);
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ordered query variants for a subject, most precise first:
///
/// 1. the cleaned name, quoted (exact phrase)
/// 2. the cleaned name, unquoted (all terms, any position)
/// 3. for names of four or more words, the first three keywords ANDed
///    (long compound names often over-constrain the phrase search)
pub fn search_variants(name: &str) -> Vec<String> {
    let cleaned = clean_name(name);
    if cleaned.is_empty() {
        // Nothing searchable survives cleaning; fall back to the raw name
        return vec![name.trim().to_string()];
    }

    let mut variants = vec![format!("\"{cleaned}\"")];
    if cleaned.contains(' ') {
        variants.push(cleaned.clone());
    }

    let words: Vec<&str> = cleaned.split(' ').collect();
    if words.len() >= 4 {
        variants.push(words[..3].join(" AND "));
    }

    variants
}
