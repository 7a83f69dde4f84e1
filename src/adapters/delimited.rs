//! Delimited-text adapter: RFC-4180-like parsing and serialization.
//!
//! Parsing is permissive by policy. Unterminated quotes and ragged rows are
//! kept as literal content instead of rejected; a missing trailing field is
//! an empty string. A fully empty input yields a sheet with no headers and
//! no rows.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::model::{synthetic_column, CellValue, Row, Sheet};

/// Sheet name used when the input has no file name to borrow.
pub const BUFFER_SHEET_NAME: &str = "data";

static ISO_DATE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap_or_else(|_| unreachable!("literal pattern"))
});

#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub delimiter: char,
    /// Treat the first line as the header row.
    pub has_headers: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_headers: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub delimiter: char,
    pub quote: char,
    pub include_headers: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            include_headers: true,
        }
    }
}

/// Read a delimited file into a single sheet named after the file stem.
pub async fn read(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Sheet> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            EngineError::NotFound(path.display().to_string())
        } else {
            EngineError::Io(err)
        }
    })?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| BUFFER_SHEET_NAME.to_string());
    let sheet = parse_str(&content, options, name);
    debug!(path = %path.display(), rows = sheet.rows.len(), "read delimited file");
    Ok(sheet)
}

/// Parse delimited bytes already held in memory. Invalid UTF-8 is replaced,
/// not rejected, matching the permissive parse policy.
pub fn read_buffer(buffer: &[u8], options: &ReadOptions) -> Sheet {
    let content = String::from_utf8_lossy(buffer);
    parse_str(&content, options, BUFFER_SHEET_NAME.to_string())
}

/// Parse delimited text into a sheet.
pub fn parse_str(content: &str, options: &ReadOptions, name: String) -> Sheet {
    let mut sheet = Sheet::new(name);
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return sheet;
    }

    let mut lines = trimmed.lines();
    if options.has_headers {
        if let Some(first) = lines.next() {
            let raw = tokenize_line(first, options.delimiter);
            sheet.headers = Some(dedupe_headers(raw));
        }
    }

    for line in lines {
        let values = tokenize_line(line, options.delimiter);
        sheet.rows.push(build_row(sheet.headers.as_deref(), values));
    }
    sheet
}

/// Serialize a sheet to a delimited file. Every row ends with a newline;
/// no blank line follows the last row.
pub async fn write(sheet: &Sheet, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
    let path = path.as_ref();
    let rendered = to_delimited_string(sheet, options);
    fs::write(path, rendered).await?;
    debug!(path = %path.display(), rows = sheet.rows.len(), "wrote delimited file");
    Ok(())
}

/// Render a sheet as delimited text.
pub fn to_delimited_string(sheet: &Sheet, options: &WriteOptions) -> String {
    let mut out = String::new();
    if options.include_headers {
        if let Some(headers) = &sheet.headers {
            if !headers.is_empty() {
                out.push_str(&format_line(headers.iter().cloned().collect(), options));
                out.push('\n');
            }
        }
    }

    for row in &sheet.rows {
        let values: Vec<String> = match &sheet.headers {
            Some(headers) => headers
                .iter()
                .map(|header| format_value(row.get(header).unwrap_or(&CellValue::Null)))
                .collect(),
            None => row.values().map(format_value).collect(),
        };
        out.push_str(&format_line(values, options));
        out.push('\n');
    }
    out
}

/// Line-oriented copy from one delimited file to another with an optional
/// per-row transform. Returning `None` from the transform drops the row.
/// Header handling matches `read`; the header line is copied through as-is.
pub async fn stream<F>(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
    mut transform: Option<F>,
    options: &ReadOptions,
) -> Result<()>
where
    F: FnMut(Row) -> Option<Row>,
{
    let source = source.as_ref();
    let file = fs::File::open(source).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            EngineError::NotFound(source.display().to_string())
        } else {
            EngineError::Io(err)
        }
    })?;
    let mut reader = BufReader::new(file).lines();
    let mut writer = BufWriter::new(fs::File::create(target.as_ref()).await?);

    let write_options = WriteOptions {
        delimiter: options.delimiter,
        ..WriteOptions::default()
    };
    let mut headers: Option<Vec<String>> = None;
    let mut first_line = true;

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if first_line && options.has_headers {
            headers = Some(dedupe_headers(tokenize_line(&line, options.delimiter)));
            first_line = false;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            continue;
        }
        first_line = false;

        match transform.as_mut() {
            Some(transform) => {
                let values = tokenize_line(&line, options.delimiter);
                let row = build_row(headers.as_deref(), values);
                if let Some(row) = transform(row) {
                    let rendered: Vec<String> = match &headers {
                        Some(headers) => headers
                            .iter()
                            .map(|header| format_value(row.get(header).unwrap_or(&CellValue::Null)))
                            .collect(),
                        None => row.values().map(format_value).collect(),
                    };
                    writer
                        .write_all(format_line(rendered, &write_options).as_bytes())
                        .await?;
                    writer.write_all(b"\n").await?;
                }
            }
            None => {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
        }
    }
    writer.flush().await?;
    Ok(())
}

/// Walk one line character-by-character with a quoted-field flag. A quote
/// toggles quoting unless doubled (an escaped literal quote); the delimiter
/// separates fields only outside quotes.
fn tokenize_line(line: &str, delimiter: char) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                current.push('"');
                chars.next();
                continue;
            }
            in_quotes = !in_quotes;
            continue;
        }
        if ch == delimiter && !in_quotes {
            values.push(std::mem::take(&mut current));
            continue;
        }
        current.push(ch);
    }
    values.push(current);
    values
}

/// Disambiguate repeated header names by suffixing `_1`, `_2`, … in order
/// of appearance.
fn dedupe_headers(raw: Vec<String>) -> Vec<String> {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    raw.into_iter()
        .map(|header| {
            let seen = counts.entry(header.clone()).or_insert(0);
            let unique = if *seen == 0 {
                header
            } else {
                format!("{}_{}", header, seen)
            };
            *seen += 1;
            unique
        })
        .collect()
}

fn build_row(headers: Option<&[String]>, values: Vec<String>) -> Row {
    let mut row = Row::new();
    match headers {
        Some(headers) if !headers.is_empty() => {
            for (index, header) in headers.iter().enumerate() {
                let field = values.get(index).map(String::as_str).unwrap_or("");
                row.insert(header.clone(), infer_value(field));
            }
        }
        _ => {
            for (index, field) in values.iter().enumerate() {
                row.insert(synthetic_column(index), infer_value(field));
            }
        }
    }
    row
}

/// Infer a typed value from a raw field, in order: null, boolean, number,
/// ISO date, trimmed string.
pub fn infer_value(raw: &str) -> CellValue {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("null") {
        return CellValue::Null;
    }
    if value.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }
    if let Ok(number) = value.parse::<f64>() {
        if number.is_finite() {
            return CellValue::Number(number);
        }
    }
    if let Some(date) = date_from_iso_prefix(value) {
        return CellValue::Date(date);
    }
    CellValue::Text(value.to_string())
}

/// A calendar date when the value starts with `YYYY-MM-DD`, shared with the
/// remote adapter's string coercion.
pub(crate) fn date_from_iso_prefix(value: &str) -> Option<chrono::NaiveDate> {
    if !ISO_DATE_PREFIX.is_match(value) {
        return None;
    }
    value.get(..10)?.parse().ok()
}

fn format_value(value: &CellValue) -> String {
    value.to_plain_string()
}

/// Quote a field only when it contains the delimiter, the quote character,
/// or a line break; internal quote characters are doubled.
fn format_line(values: Vec<String>, options: &WriteOptions) -> String {
    let quote = options.quote;
    values
        .into_iter()
        .map(|value| {
            if value.contains(options.delimiter)
                || value.contains(quote)
                || value.contains('\n')
                || value.contains('\r')
            {
                let doubled = value.replace(quote, &format!("{quote}{quote}"));
                format!("{quote}{doubled}{quote}")
            } else {
                value
            }
        })
        .collect::<Vec<_>>()
        .join(&options.delimiter.to_string())
}
