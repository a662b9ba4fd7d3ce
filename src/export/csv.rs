//! CSV export of accepted records, plus helpers for inspecting and pruning
//! previously written files.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::{DataFormat, Domain};
use crate::error::ExportError;
use crate::records::Record;

/// Suffixed names tried after the timestamped one is taken.
const MAX_NAME_ATTEMPTS: usize = 8;

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "responses";

/// Creates `path`, or `{stem}_{id}.csv` beside it when `path` already
/// exists. Never truncates an existing file.
fn create_unique(path: &Path) -> Result<(PathBuf, File), ExportError> {
    let open = |candidate: &Path| OpenOptions::new().write(true).create_new(true).open(candidate);

    match open(path) {
        Ok(file) => return Ok((path.to_path_buf(), file)),
        Err(err) if err.kind() != io::ErrorKind::AlreadyExists => return Err(err.into()),
        Err(_) => {}
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("export")
        .to_string();
    let mut last_err = None;
    for _ in 0..MAX_NAME_ATTEMPTS {
        let id = Uuid::new_v4().simple().to_string();
        let candidate = path.with_file_name(format!("{}_{}.csv", stem, &id[..8]));
        match open(&candidate) {
            Ok(file) => {
                tracing::debug!(path = %candidate.display(), "Export name taken, using suffixed name");
                return Ok((candidate, file));
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => last_err = Some(err),
            Err(err) => return Err(err.into()),
        }
    }
    Err(last_err
        .unwrap_or_else(|| io::Error::from(io::ErrorKind::AlreadyExists))
        .into())
}

/// Summary of an exported CSV file.
#[derive(Debug, Clone, Serialize)]
pub struct FileStats {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Data rows, excluding the header.
    pub record_count: usize,
    pub modified: DateTime<Utc>,
}

/// Writes record sets as CSV files under one directory.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    output_dir: PathBuf,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

impl CsvExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `{dir}/{domain}_{format}_{YYYYmmdd_HHMMSS}.csv`
    pub fn output_path(&self, domain: Domain, format: DataFormat) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let name = sanitize_filename(&format!("{}_{}_{}.csv", domain, format, stamp));
        self.output_dir.join(name)
    }

    /// Writes `records` with a header row and returns the file path.
    ///
    /// # Errors
    ///
    /// `NoRecords` for empty input, `FormatMismatch` if any record is not
    /// of `format`, or an IO error.
    pub fn write(
        &self,
        records: &[Record],
        domain: Domain,
        format: DataFormat,
    ) -> Result<PathBuf, ExportError> {
        if records.is_empty() {
            return Err(ExportError::NoRecords);
        }
        if let Some(other) = records.iter().find(|r| r.format() != format) {
            return Err(ExportError::FormatMismatch {
                expected: format.to_string(),
                found: other.format().to_string(),
            });
        }

        fs::create_dir_all(&self.output_dir)?;
        let (path, mut file) = create_unique(&self.output_path(domain, format))?;

        let mut out = String::new();
        push_row(&mut out, format.fields().iter().copied());
        for record in records {
            let columns = record.columns();
            push_row(&mut out, columns.iter().map(String::as_str));
        }

        file.write_all(out.as_bytes())?;
        file.flush()?;

        tracing::info!(
            path = %path.display(),
            records = records.len(),
            domain = %domain,
            format = %format,
            "Exported records to CSV"
        );

        Ok(path)
    }

    /// Deletes `.csv` files in the output directory last modified more than
    /// `days` days ago. Returns how many were removed.
    pub fn cleanup_older_than(&self, days: u32) -> Result<usize, ExportError> {
        if !self.output_dir.exists() {
            return Ok(0);
        }

        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
        let mut removed = 0;

        for entry in fs::read_dir(&self.output_dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let modified: DateTime<Utc> = fs::metadata(&path)?.modified()?.into();
            if modified < cutoff {
                fs::remove_file(&path)?;
                tracing::debug!(path = %path.display(), "Removed old export");
                removed += 1;
            }
        }

        tracing::info!(dir = %self.output_dir.display(), removed, days, "Cleanup complete");
        Ok(removed)
    }
}

/// Size, row count and modification time of an exported file.
pub fn file_stats(path: impl AsRef<Path>) -> Result<FileStats, ExportError> {
    let path = path.as_ref();
    let text = read_existing(path)?;
    let rows = parse_csv(&text).map_err(|reason| malformed(path, reason))?;
    let metadata = fs::metadata(path)?;

    Ok(FileStats {
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        record_count: rows.len().saturating_sub(1),
        modified: metadata.modified()?.into(),
    })
}

/// Returns up to `n` data rows keyed by header name.
pub fn read_sample(
    path: impl AsRef<Path>,
    n: usize,
) -> Result<Vec<BTreeMap<String, String>>, ExportError> {
    let path = path.as_ref();
    let text = read_existing(path)?;
    let mut rows = parse_csv(&text)
        .map_err(|reason| malformed(path, reason))?
        .into_iter();

    let header = match rows.next() {
        Some(header) => header,
        None => return Ok(Vec::new()),
    };

    rows.take(n)
        .enumerate()
        .map(|(i, row)| {
            if row.len() != header.len() {
                return Err(malformed(
                    path,
                    format!(
                        "row {} has {} fields, header has {}",
                        i + 1,
                        row.len(),
                        header.len()
                    ),
                ));
            }
            Ok(header.iter().cloned().zip(row).collect())
        })
        .collect()
}

/// Replaces anything other than ASCII alphanumerics, `-`, `_` and `.` with
/// `_`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "export".to_string()
    } else {
        cleaned.to_string()
    }
}

fn read_existing(path: &Path) -> Result<String, ExportError> {
    if !path.is_file() {
        return Err(ExportError::NotFound(path.display().to_string()));
    }
    Ok(fs::read_to_string(path)?)
}

fn malformed(path: &Path, reason: String) -> ExportError {
    ExportError::MalformedCsv {
        file: path.display().to_string(),
        reason,
    }
}

fn push_row<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let row: Vec<String> = fields.map(quote_field).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

/// RFC 4180 quoting: fields containing a comma, quote or line break are
/// wrapped in quotes with embedded quotes doubled.
fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parses RFC 4180 text into rows. Accepts both `\r\n` and `\n` endings.
fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qna(question: &str) -> Record {
        Record::Qna {
            question: question.to_string(),
            answer: "Lenders weigh income, debt and credit history, \"among others\".".to_string(),
            context: "Consumer lending\nretail banking".to_string(),
        }
    }

    #[test]
    fn test_quote_field() {
        assert_eq!(quote_field("plain"), "plain");
        assert_eq!(quote_field("a,b"), "\"a,b\"");
        assert_eq!(quote_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(quote_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_parse_csv_handles_quotes_and_newlines() {
        let rows = parse_csv("a,b\r\n\"x,1\",\"line\nbreak \"\"q\"\"\"\r\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["x,1", "line\nbreak \"q\""]);
        assert!(parse_csv("a,\"open").is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("finance_qna_20250101.csv"), "finance_qna_20250101.csv");
        assert_eq!(sanitize_filename("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_filename("  "), "export");
    }

    #[test]
    fn test_output_path_naming() {
        let exporter = CsvExporter::new("/tmp/out");
        let path = exporter.output_path(Domain::Finance, DataFormat::RagChunks);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("finance_rag_chunks_"));
        assert!(name.ends_with(".csv"));
        // finance_rag_chunks_ + YYYYmmdd_HHMMSS + .csv
        assert_eq!(name.len(), "finance_rag_chunks_".len() + 15 + 4);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path());
        let records = vec![qna("How do lenders assess a mortgage application?"), qna("What is APR?")];

        let path = exporter
            .write(&records, Domain::Finance, DataFormat::Qna)
            .unwrap();

        let stats = file_stats(&path).unwrap();
        assert_eq!(stats.record_count, 2);
        assert!(stats.size_bytes > 0);

        let sample = read_sample(&path, 1).unwrap();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0]["question"], "How do lenders assess a mortgage application?");
        assert_eq!(sample[0]["context"], "Consumer lending\nretail banking");
        assert!(sample[0]["answer"].contains("\"among others\""));
    }

    #[test]
    fn test_existing_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("finance_qna_20250101_120000.csv");
        fs::write(&taken, "question,answer,context\r\n").unwrap();

        let (path, mut file) = create_unique(&taken).unwrap();
        file.write_all(b"new").unwrap();

        assert_ne!(path, taken);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("finance_qna_20250101_120000_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(fs::read_to_string(&taken).unwrap(), "question,answer,context\r\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_back_to_back_writes_keep_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path());

        let first = exporter
            .write(&[qna("What is APR?")], Domain::Finance, DataFormat::Qna)
            .unwrap();
        let second = exporter
            .write(&[qna("What is a credit score?")], Domain::Finance, DataFormat::Qna)
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(read_sample(&first, 5).unwrap()[0]["question"], "What is APR?");
        assert_eq!(
            read_sample(&second, 5).unwrap()[0]["question"],
            "What is a credit score?"
        );
    }

    #[test]
    fn test_rag_metadata_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path());
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), serde_json::json!("handbook"));
        let record = Record::RagChunk {
            content: "Chunk body".to_string(),
            metadata,
            summary: "Short".to_string(),
        };

        let path = exporter
            .write(&[record], Domain::Education, DataFormat::RagChunks)
            .unwrap();
        let sample = read_sample(&path, 5).unwrap();
        assert_eq!(sample[0]["metadata"], r#"{"source":"handbook"}"#);
    }

    #[test]
    fn test_write_rejects_empty_and_mismatched() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path());

        assert!(matches!(
            exporter.write(&[], Domain::Law, DataFormat::Qna),
            Err(ExportError::NoRecords)
        ));
        assert!(matches!(
            exporter.write(&[qna("Is this valid?")], Domain::Law, DataFormat::FineTuning),
            Err(ExportError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            file_stats("/definitely/not/here.csv"),
            Err(ExportError::NotFound(_))
        ));
    }

    #[test]
    fn test_cleanup_keeps_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("recent.csv"), "a\r\n1\r\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();
        let exporter = CsvExporter::new(dir.path());

        assert_eq!(exporter.cleanup_older_than(7).unwrap(), 0);
        assert!(dir.path().join("recent.csv").exists());

        // A missing directory is not an error.
        let missing = CsvExporter::new(dir.path().join("absent"));
        assert_eq!(missing.cleanup_older_than(0).unwrap(), 0);
    }
}
