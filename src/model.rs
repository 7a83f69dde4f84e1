use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A format-neutral workbook: what every adapter reads into and writes from.
///
/// A workbook tree is built fresh by a `read` operation and consumed, never
/// mutated, by `validate`/`write`. Each conversion is a pure transform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<WorkbookMetadata>,
}

impl Workbook {
    /// Wrap a single sheet, the shape the delimited adapter produces.
    pub fn single(sheet: Sheet) -> Self {
        Self {
            sheets: vec![sheet],
            metadata: None,
        }
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
}

/// One tabular sheet. Headers are optional; a sheet without them keys its
/// rows by synthetic `ColumnN` identifiers instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<String>>,
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SheetMetadata>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_headers(name: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            headers: Some(headers),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.headers.is_none()
    }
}

/// Layout metadata preserved round-trip: frozen panes and column widths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen_rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen_columns: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_widths: Vec<f64>,
}

impl SheetMetadata {
    pub fn is_empty(&self) -> bool {
        self.frozen_rows.is_none() && self.frozen_columns.is_none() && self.column_widths.is_empty()
    }
}

/// A row maps column names to values; insertion order follows header order.
pub type Row = IndexMap<String, CellValue>;

/// The closed set of cell values every adapter agrees on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
    Rich(Box<RichCell>),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Null
    }
}

impl CellValue {
    /// Unwrap a rich cell down to its primitive payload.
    pub fn primitive(&self) -> &CellValue {
        match self {
            CellValue::Rich(rich) => &rich.value,
            other => other,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(text) => text.is_empty(),
            CellValue::Rich(rich) => rich.value.is_empty(),
            _ => false,
        }
    }

    /// Plain-text rendering used by the delimited writer and the validator.
    /// Numbers rely on `f64` Display, so `42.0` renders as `42`.
    pub fn to_plain_string(&self) -> String {
        match self {
            CellValue::Text(text) => text.clone(),
            CellValue::Number(number) => number.to_string(),
            CellValue::Bool(flag) => flag.to_string(),
            CellValue::Date(date) => date.format("%Y-%m-%d").to_string(),
            CellValue::Null => String::new(),
            CellValue::Rich(rich) => rich.value.to_plain_string(),
        }
    }
}

/// A cell carrying more than a primitive: formula text, style, a comment,
/// or a hyperlink target. The binary adapter produces these where the
/// container's cell model cannot be expressed as a bare primitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichCell {
    /// The primitive payload; never itself `Rich`.
    pub value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<CellStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperlink: Option<String>,
}

impl RichCell {
    pub fn formula(value: CellValue, formula: impl Into<String>) -> Self {
        Self {
            value,
            formula: Some(formula.into()),
            ..Self::default()
        }
    }

    pub fn hyperlink(value: CellValue, target: impl Into<String>) -> Self {
        Self {
            value,
            hyperlink: Some(target.into()),
            ..Self::default()
        }
    }
}

/// The style subset the binary adapter actually round-trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
}

/// Positional fallback name for a column without a header.
pub fn synthetic_column(index: usize) -> String {
    format!("Column{}", index + 1)
}
