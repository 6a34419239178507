//! Flat CSV export derived from the batch record documents
//!
//! Always regenerated from the JSON on disk, never an independent source
//! of truth.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

const HEADER: &[&str] = &[
    "identifier",
    "source",
    "subjects",
    "title",
    "journal",
    "year",
    "doi",
    "authors",
    "abstract",
];

/// Abstracts longer than this are truncated in the tabular view
const ABSTRACT_LIMIT: usize = 1000;

/// Write one CSV row per record across all batch documents in
/// `records_dir`. Returns the number of rows written.
pub fn export_csv(records_dir: &Path, out_path: &Path) -> Result<usize> {
    let mut batch_files: Vec<_> = std::fs::read_dir(records_dir)
        .with_context(|| format!("cannot read {}", records_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    batch_files.sort();

    let mut out = std::io::BufWriter::new(
        std::fs::File::create(out_path)
            .with_context(|| format!("cannot create {}", out_path.display()))?,
    );
    writeln!(out, "{}", HEADER.join(","))?;

    let mut rows = 0;
    for path in &batch_files {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let doc: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("malformed batch document {}", path.display()))?;

        let source = doc["source"].as_str().unwrap_or_default().to_string();
        let Some(records) = doc["records"].as_array() else {
            continue;
        };

        for record in records {
            let fields = &record["fields"];
            let row = [
                text(&record["identifier"]),
                source.clone(),
                join_strings(&record["provenance"]),
                text(&fields["title"]),
                text(&fields["journal"]),
                text(&fields["pub_year"]),
                text(&fields["doi"]),
                join_strings(&fields["authors"]),
                truncate(&text(&fields["abstract_text"]), ABSTRACT_LIMIT),
            ];
            let line: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
            writeln!(out, "{}", line.join(","))?;
            rows += 1;
        }
    }

    out.flush()?;
    log::info!("exported {rows} rows to {}", out_path.display());
    Ok(rows)
}

fn text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn join_strings(value: &serde_json::Value) -> String {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_default()
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let cut: String = s.chars().take(limit).collect();
        format!("{cut}...")
    }
}

/// Quote a field when it contains a delimiter, quote, or newline.
fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_batch(dir: &Path, name: &str, records: serde_json::Value) {
        let doc = serde_json::json!({
            "source": "pmc",
            "batch_index": 1,
            "records": records,
        });
        std::fs::write(dir.join(name), serde_json::to_string(&doc).unwrap()).unwrap();
    }

    #[test]
    fn exports_one_row_per_record() {
        let dir = tempfile::tempdir().unwrap();
        write_batch(
            dir.path(),
            "pmc_batch_00001.json",
            serde_json::json!([
                {
                    "identifier": "PMC1",
                    "provenance": ["Disease-A", "Disease-B"],
                    "fields": {
                        "title": "A title, with comma",
                        "journal": "J",
                        "pub_year": 2024,
                        "doi": "10.1/x",
                        "authors": ["Smith Jane"],
                        "abstract_text": "Short."
                    }
                },
                {
                    "identifier": "PMC2",
                    "provenance": [],
                    "fields": {}
                }
            ]),
        );

        let out = dir.path().join("export.csv");
        let rows = export_csv(dir.path(), &out).unwrap();
        assert_eq!(rows, 2);

        let content = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("identifier,source,subjects"));
        assert!(lines[1].contains("\"A title, with comma\""));
        assert!(lines[1].contains("Disease-A; Disease-B"));
    }

    #[test]
    fn csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn truncates_long_abstracts() {
        let long = "x".repeat(2000);
        let truncated = truncate(&long, ABSTRACT_LIMIT);
        assert_eq!(truncated.chars().count(), ABSTRACT_LIMIT + 3);
    }

    #[test]
    fn ignores_non_json_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), "ignore me").unwrap();
        write_batch(dir.path(), "b.json", serde_json::json!([]));

        let out = dir.path().join("export.csv");
        assert_eq!(export_csv(dir.path(), &out).unwrap(), 0);
    }
}
