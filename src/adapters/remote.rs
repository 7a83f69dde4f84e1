//! Remote sheet adapter: maps the neutral model to a range-based remote
//! tabular service.
//!
//! The network client is an injected capability behind [`SheetsService`],
//! constructed lazily on first use so tests can substitute a fake and so
//! credential setup is deferred until a remote operation actually runs.
//! Values cross the wire as JSON scalars and writes use "as-entered"
//! semantics, leaving formula evaluation and date recognition to the
//! remote side.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::model::{
    synthetic_column, CellValue, Row, Sheet, SheetMetadata, Workbook, WorkbookMetadata,
};

/// Column count assumed when a new document's sheets carry no data yet.
const DEFAULT_GRID_COLUMNS: u32 = 10;

/// Document-level metadata returned by the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteDocument {
    pub title: Option<String>,
    pub sheets: Vec<RemoteSheetProperties>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSheetProperties {
    pub title: String,
    pub row_count: u32,
    pub column_count: u32,
    pub frozen_rows: Option<u32>,
    pub frozen_columns: Option<u32>,
}

/// The injected client capability. Implementations own authentication and
/// transport; they are expected to be safe for concurrent use.
#[async_trait]
pub trait SheetsService: Send + Sync {
    /// Fetch document metadata without grid data.
    async fn document_metadata(&self, document_id: &str) -> Result<RemoteDocument>;

    /// Fetch one value range in row-major order.
    async fn get_values(&self, document_id: &str, range: &str) -> Result<Vec<Vec<Value>>>;

    /// Replace one value range, anchored at its top-left cell, with
    /// as-entered input semantics.
    async fn update_values(
        &self,
        document_id: &str,
        range: &str,
        values: Vec<Vec<Value>>,
    ) -> Result<()>;

    /// Clear all values in a range.
    async fn clear_values(&self, document_id: &str, range: &str) -> Result<()>;

    /// Update a sheet's frozen row/column counts.
    async fn set_frozen(
        &self,
        document_id: &str,
        sheet_index: usize,
        frozen_rows: u32,
        frozen_columns: u32,
    ) -> Result<()>;

    /// Create a document with the given title and sheet grids; returns the
    /// new document id.
    async fn create_document(
        &self,
        title: &str,
        sheets: Vec<RemoteSheetProperties>,
    ) -> Result<String>;

    /// Share the document with the given identities. Sharing needs a
    /// drive-level permission, so clients without one keep this default,
    /// which reports the capability as unavailable.
    async fn share(&self, document_id: &str, _identities: &[String]) -> Result<()> {
        Err(EngineError::RemoteUnavailable(format!(
            "sharing is not supported for document {document_id}"
        )))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemoteWriteOptions {
    /// Clear every remote sheet before pushing values.
    pub clear_existing: bool,
    /// Identities to share the document with after writing.
    pub share_with: Vec<String>,
}

type ServiceFactory = dyn Fn() -> Result<Arc<dyn SheetsService>> + Send + Sync;

/// Bidirectional conversion between a remote document and a workbook.
pub struct RemoteSheetAdapter {
    service: OnceCell<Arc<dyn SheetsService>>,
    factory: Option<Box<ServiceFactory>>,
}

impl RemoteSheetAdapter {
    /// Use an already-constructed client.
    pub fn new(service: Arc<dyn SheetsService>) -> Self {
        Self {
            service: OnceCell::with_value(service),
            factory: None,
        }
    }

    /// Defer client construction to the first remote call.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SheetsService>> + Send + Sync + 'static,
    {
        Self {
            service: OnceCell::new(),
            factory: Some(Box::new(factory)),
        }
    }

    fn client(&self) -> Result<&Arc<dyn SheetsService>> {
        self.service.get_or_try_init(|| match &self.factory {
            Some(factory) => factory(),
            None => Err(EngineError::RemoteUnavailable(
                "no sheet service configured".into(),
            )),
        })
    }

    /// Read a remote document. A fetch failure on an individual sheet is
    /// logged and yields an empty Sheet in its place; only the metadata
    /// fetch itself can fail the read.
    pub async fn read(&self, document_id: &str, ranges: Option<&[String]>) -> Result<Workbook> {
        let client = self.client()?;
        let document = client.document_metadata(document_id).await?;

        let mut workbook = Workbook {
            sheets: Vec::with_capacity(document.sheets.len()),
            metadata: document.title.clone().map(|title| WorkbookMetadata {
                title: Some(title),
                ..WorkbookMetadata::default()
            }),
        };

        for properties in &document.sheets {
            let range = ranges
                .and_then(|ranges| {
                    ranges
                        .iter()
                        .find(|candidate| candidate.contains(&properties.title))
                })
                .cloned()
                .unwrap_or_else(|| properties.title.clone());

            match client.get_values(document_id, &range).await {
                Ok(values) => {
                    let mut sheet = values_to_sheet(&properties.title, values);
                    if properties.frozen_rows.is_some() || properties.frozen_columns.is_some() {
                        sheet.metadata = Some(SheetMetadata {
                            frozen_rows: properties.frozen_rows,
                            frozen_columns: properties.frozen_columns,
                            column_widths: Vec::new(),
                        });
                    }
                    workbook.sheets.push(sheet);
                }
                Err(err) => {
                    warn!(
                        document_id,
                        sheet = %properties.title,
                        error = %err,
                        "failed to read remote sheet, substituting an empty sheet"
                    );
                    workbook.sheets.push(Sheet::new(&properties.title));
                }
            }
        }

        debug!(document_id, sheets = workbook.sheets.len(), "read remote document");
        Ok(workbook)
    }

    /// Push a workbook into an existing remote document.
    pub async fn write(
        &self,
        workbook: &Workbook,
        document_id: &str,
        options: &RemoteWriteOptions,
    ) -> Result<()> {
        let client = self.client()?;

        if options.clear_existing {
            let document = client.document_metadata(document_id).await?;
            for properties in &document.sheets {
                client.clear_values(document_id, &properties.title).await?;
            }
        }

        for (index, sheet) in workbook.sheets.iter().enumerate() {
            let range = format!("{}!A1", sheet.name);
            client
                .update_values(document_id, &range, sheet_to_values(sheet))
                .await?;

            if let Some(metadata) = &sheet.metadata {
                let frozen_rows = metadata.frozen_rows.unwrap_or(0);
                let frozen_columns = metadata.frozen_columns.unwrap_or(0);
                if frozen_rows > 0 || frozen_columns > 0 {
                    client
                        .set_frozen(document_id, index, frozen_rows, frozen_columns)
                        .await?;
                }
            }
        }

        if !options.share_with.is_empty() {
            match client.share(document_id, &options.share_with).await {
                Ok(()) => {
                    debug!(
                        document_id,
                        identities = %options.share_with.join(", "),
                        "shared remote document"
                    );
                }
                Err(err) => {
                    warn!(
                        document_id,
                        identities = %options.share_with.join(", "),
                        error = %err,
                        "sharing unavailable; share the document manually"
                    );
                }
            }
        }

        debug!(document_id, sheets = workbook.sheets.len(), "wrote remote document");
        Ok(())
    }

    /// Create a new remote document sized to the workbook's grids and
    /// optionally populate it. Returns the new document id.
    pub async fn create(&self, title: &str, workbook: Option<&Workbook>) -> Result<String> {
        let client = self.client()?;

        let sheets = workbook
            .map(|workbook| {
                workbook
                    .sheets
                    .iter()
                    .map(|sheet| RemoteSheetProperties {
                        title: sheet.name.clone(),
                        row_count: sheet.rows.len() as u32 + 1,
                        column_count: grid_column_count(sheet),
                        frozen_rows: sheet.metadata.as_ref().and_then(|m| m.frozen_rows),
                        frozen_columns: sheet.metadata.as_ref().and_then(|m| m.frozen_columns),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let document_id = client.create_document(title, sheets).await?;
        if let Some(workbook) = workbook {
            self.write(workbook, &document_id, &RemoteWriteOptions::default())
                .await?;
        }
        Ok(document_id)
    }
}

fn grid_column_count(sheet: &Sheet) -> u32 {
    sheet
        .headers
        .as_ref()
        .map(|headers| headers.len() as u32)
        .filter(|count| *count > 0)
        .or_else(|| {
            sheet
                .rows
                .first()
                .map(|row| row.len() as u32)
                .filter(|count| *count > 0)
        })
        .unwrap_or(DEFAULT_GRID_COLUMNS)
}

/// First returned row becomes the header list; the rest become rows. A
/// short row simply omits its trailing keys.
fn values_to_sheet(name: &str, values: Vec<Vec<Value>>) -> Sheet {
    let mut sheet = Sheet::new(name);
    let mut iter = values.into_iter();
    let Some(first) = iter.next() else {
        return sheet;
    };

    let headers: Vec<String> = first
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let text = header_text(value);
            if text.is_empty() {
                synthetic_column(index)
            } else {
                text
            }
        })
        .collect();
    sheet.headers = Some(headers.clone());

    for raw_row in iter {
        let mut row = Row::new();
        for (index, value) in raw_row.into_iter().enumerate() {
            let key = headers
                .get(index)
                .cloned()
                .unwrap_or_else(|| synthetic_column(index));
            row.insert(key, parse_remote_value(value));
        }
        sheet.rows.push(row);
    }
    sheet
}

fn sheet_to_values(sheet: &Sheet) -> Vec<Vec<Value>> {
    let mut values = Vec::with_capacity(sheet.rows.len() + 1);
    if let Some(headers) = &sheet.headers {
        if !headers.is_empty() {
            values.push(headers.iter().map(|h| Value::String(h.clone())).collect());
        }
    }
    for row in &sheet.rows {
        let rendered: Vec<Value> = match &sheet.headers {
            Some(headers) => headers
                .iter()
                .map(|header| format_remote_value(row.get(header).unwrap_or(&CellValue::Null)))
                .collect(),
            None => row.values().map(format_remote_value).collect(),
        };
        values.push(rendered);
    }
    values
}

fn header_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// The service returns numbers and booleans natively; strings with an ISO
/// date prefix become dates, everything else stays text.
fn parse_remote_value(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(flag) => CellValue::Bool(flag),
        Value::Number(number) => number
            .as_f64()
            .map(CellValue::Number)
            .unwrap_or(CellValue::Null),
        Value::String(text) if text.is_empty() => CellValue::Null,
        Value::String(text) => match crate::adapters::delimited::date_from_iso_prefix(&text) {
            Some(date) => CellValue::Date(date),
            None => CellValue::Text(text),
        },
        other => CellValue::Text(other.to_string()),
    }
}

/// Dates go over the wire as `YYYY-MM-DD` strings; rich cells collapse to
/// their primitive payload.
fn format_remote_value(value: &CellValue) -> Value {
    match value {
        CellValue::Null => Value::String(String::new()),
        CellValue::Text(text) => Value::String(text.clone()),
        CellValue::Number(number) => serde_json::Number::from_f64(*number)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(number.to_string())),
        CellValue::Bool(flag) => Value::Bool(*flag),
        CellValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        CellValue::Rich(rich) => format_remote_value(rich.value.primitive()),
    }
}
