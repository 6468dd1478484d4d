//! Comma-separated record codec used by the bucket and object registries.
//!
//! Fields containing a comma, a double quote, or a line break are wrapped in
//! double quotes with embedded quotes doubled. Blank lines are ignored when
//! parsing so hand-edited registries with trailing newlines still load.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("line {line}: unterminated quoted field")]
    UnterminatedQuote { line: usize },
    #[error("line {line}: unexpected character `{found}` after closing quote")]
    TrailingAfterQuote { line: usize, found: char },
    #[error("line {line}: stray quote inside unquoted field")]
    StrayQuote { line: usize },
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: invalid {field} `{value}`")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// A parsed record together with the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub line: usize,
    pub fields: Vec<String>,
}

impl RawRecord {
    /// Ensure the record carries exactly `expected` fields.
    pub fn expect_fields(&self, expected: usize) -> Result<(), RecordError> {
        if self.fields.len() == expected {
            Ok(())
        } else {
            Err(RecordError::FieldCount {
                line: self.line,
                expected,
                found: self.fields.len(),
            })
        }
    }

    pub fn timestamp(&self, idx: usize, field: &'static str) -> Result<DateTime<Utc>, RecordError> {
        parse_timestamp(&self.fields[idx]).ok_or_else(|| RecordError::InvalidField {
            line: self.line,
            field,
            value: self.fields[idx].clone(),
        })
    }
}

/// Encode one record as a single line terminated by `\n`.
pub fn encode_record<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Parse every non-blank record in `input`, preserving file order.
pub fn parse_records(input: &str) -> Result<Vec<RawRecord>, RecordError> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut after_quote = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => {
                    in_quotes = false;
                    after_quote = true;
                }
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            ',' => {
                fields.push(std::mem::take(&mut field));
                after_quote = false;
            }
            '\n' => {
                finish_record(&mut records, &mut fields, &mut field, record_line);
                after_quote = false;
                line += 1;
                record_line = line;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            _ if after_quote => {
                return Err(RecordError::TrailingAfterQuote { line, found: c });
            }
            '"' if field.is_empty() => in_quotes = true,
            '"' => return Err(RecordError::StrayQuote { line }),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(RecordError::UnterminatedQuote { line: record_line });
    }
    finish_record(&mut records, &mut fields, &mut field, record_line);
    Ok(records)
}

fn finish_record(
    records: &mut Vec<RawRecord>,
    fields: &mut Vec<String>,
    field: &mut String,
    line: usize,
) {
    fields.push(std::mem::take(field));
    if fields.len() == 1 && fields[0].is_empty() {
        fields.clear();
        return;
    }
    records.push(RawRecord {
        line,
        fields: std::mem::take(fields),
    });
}

/// Current time truncated to the precision the registries persist.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
