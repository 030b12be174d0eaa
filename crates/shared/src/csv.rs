//! Minimal RFC 4180 CSV reader and writer.
//!
//! Handles quoted fields containing commas, escaped quotes (`""`) and
//! embedded newlines, CRLF or LF record separators, and a leading UTF-8 BOM
//! as written by spreadsheet exports.

use std::collections::HashMap;
use thiserror::Error;

const UTF8_BOM: char = '\u{feff}';

/// Errors produced while reading CSV input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    #[error("CSV input is empty")]
    Empty,

    #[error("Unclosed quoted field starting on line {line}")]
    UnclosedQuote { line: usize },

    #[error("Unexpected quote inside unquoted field on line {line}")]
    UnexpectedQuote { line: usize },

    #[error("Unexpected character after closing quote on line {line}")]
    TrailingCharacters { line: usize },

    #[error("Record {record} has {found} fields, expected {expected}")]
    FieldCountMismatch {
        record: usize,
        expected: usize,
        found: usize,
    },
}

/// Removes a leading UTF-8 byte order mark, if present.
pub fn strip_bom(input: &str) -> &str {
    input.strip_prefix(UTF8_BOM).unwrap_or(input)
}

/// Parses CSV text into records of fields.
///
/// Blank lines are skipped. A trailing record separator does not produce an
/// empty record.
pub fn parse_records(input: &str) -> Result<Vec<Vec<String>>, CsvError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_quoted = false;
    let mut line = 1usize;
    let mut quote_line = 1usize;
    let mut chars = strip_bom(input).chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() && !field_quoted => {
                in_quotes = true;
                field_quoted = true;
                quote_line = line;
            }
            '"' if field_quoted => return Err(CsvError::TrailingCharacters { line }),
            '"' => return Err(CsvError::UnexpectedQuote { line }),
            ',' => {
                record.push(std::mem::take(&mut field));
                field_quoted = false;
            }
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                finish_record(&mut records, &mut record, &mut field, field_quoted);
                field_quoted = false;
                line += 1;
            }
            _ if field_quoted => return Err(CsvError::TrailingCharacters { line }),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CsvError::UnclosedQuote { line: quote_line });
    }

    if !field.is_empty() || field_quoted || !record.is_empty() {
        finish_record(&mut records, &mut record, &mut field, field_quoted);
    }

    Ok(records)
}

fn finish_record(
    records: &mut Vec<Vec<String>>,
    record: &mut Vec<String>,
    field: &mut String,
    field_quoted: bool,
) {
    record.push(std::mem::take(field));
    let blank = record.len() == 1 && record[0].is_empty() && !field_quoted;
    let finished = std::mem::take(record);
    if !blank {
        records.push(finished);
    }
}

/// Quotes a single field when it contains a delimiter, quote or newline.
pub fn escape_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Serializes one record, terminated by CRLF.
pub fn write_record<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

/// A CSV document with a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Parses CSV text whose first record is the header row.
    ///
    /// Header names are trimmed. Every data record must have the same number
    /// of fields as the header.
    pub fn parse(input: &str) -> Result<Self, CsvError> {
        let mut records = parse_records(input)?.into_iter();
        let headers: Vec<String> = records
            .next()
            .ok_or(CsvError::Empty)?
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, record) in records.enumerate() {
            if record.len() != headers.len() {
                return Err(CsvError::FieldCountMismatch {
                    record: idx + 1,
                    expected: headers.len(),
                    found: record.len(),
                });
            }
            rows.push(record);
        }

        Ok(Self { headers, rows })
    }

    /// Serializes the table back to CSV text.
    pub fn to_csv(&self) -> String {
        let mut out = write_record(&self.headers);
        for row in &self.rows {
            out.push_str(&write_record(row));
        }
        out
    }

    /// Returns the row at `index` keyed by lowercased header name.
    pub fn row_map(&self, index: usize) -> Option<HashMap<String, String>> {
        self.rows.get(index).map(|row| {
            self.headers
                .iter()
                .map(|h| h.to_lowercase())
                .zip(row.iter().cloned())
                .collect()
        })
    }
}
