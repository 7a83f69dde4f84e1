//! Conversion orchestrator: a thin façade over the three adapters and the
//! validator.
//!
//! Sources and targets are closed descriptor enums; the adapter that will
//! handle a call is resolved exactly once at the call boundary from the
//! declared kind plus file extension or media type.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::task;
use tracing::debug;

use crate::adapters::delimited;
use crate::adapters::remote::{RemoteSheetAdapter, RemoteWriteOptions, SheetsService};
use crate::adapters::xlsx;
use crate::error::{EngineError, Result};
use crate::model::{Row, Workbook};
use crate::profile::{Profile, Violation};
use crate::validator::{ProfileValidator, ValidatorOptions};

pub const MEDIA_TYPE_CSV: &str = "text/csv";
pub const MEDIA_TYPE_TSV: &str = "text/tab-separated-values";
pub const MEDIA_TYPE_XLSX: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Where a read comes from.
#[derive(Debug, Clone)]
pub enum DataSource {
    File {
        path: PathBuf,
        media_type: Option<String>,
    },
    Buffer {
        data: Vec<u8>,
        media_type: Option<String>,
    },
    Remote {
        document_id: String,
        ranges: Option<Vec<String>>,
    },
}

impl DataSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File {
            path: path.into(),
            media_type: None,
        }
    }

    pub fn buffer(data: Vec<u8>, media_type: Option<String>) -> Self {
        Self::Buffer { data, media_type }
    }

    pub fn remote(document_id: impl Into<String>) -> Self {
        Self::Remote {
            document_id: document_id.into(),
            ranges: None,
        }
    }
}

/// Where a write goes.
#[derive(Debug, Clone)]
pub enum DataTarget {
    /// Format inferred from the path's extension.
    File { path: PathBuf },
    Delimited {
        path: PathBuf,
        options: delimited::WriteOptions,
    },
    Xlsx {
        path: PathBuf,
        options: xlsx::WriteOptions,
    },
    Remote {
        document_id: String,
        options: RemoteWriteOptions,
    },
}

impl DataTarget {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }
}

/// The closed set of formats file and buffer sources resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Delimited,
    Xlsx,
}

#[derive(Default)]
pub struct EngineOptions {
    pub validation: ValidatorOptions,
    /// Client capability for the remote adapter; `None` leaves remote
    /// sources and targets unavailable.
    pub remote_service: Option<Arc<dyn SheetsService>>,
}

/// Single entry point for read/write/convert/validate/stream pipelines.
pub struct SpreadsheetEngine {
    validator: ProfileValidator,
    remote: Option<RemoteSheetAdapter>,
}

impl Default for SpreadsheetEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl SpreadsheetEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            validator: ProfileValidator::new(options.validation),
            remote: options.remote_service.map(RemoteSheetAdapter::new),
        }
    }

    /// Defer remote client construction to the first remote call.
    pub fn with_remote_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SheetsService>> + Send + Sync + 'static,
    {
        self.remote = Some(RemoteSheetAdapter::with_factory(factory));
        self
    }

    /// Read any source into a workbook.
    pub async fn read(
        &self,
        source: &DataSource,
        options: &delimited::ReadOptions,
    ) -> Result<Workbook> {
        match source {
            DataSource::File { path, media_type } => {
                match resolve_format(Some(path), media_type.as_deref(), false)? {
                    SourceFormat::Delimited => {
                        let options = effective_read_options(options, Some(path));
                        let sheet = delimited::read(path, &options).await?;
                        Ok(Workbook::single(sheet))
                    }
                    SourceFormat::Xlsx => {
                        let path = path.clone();
                        run_blocking(move || xlsx::read(&path)).await
                    }
                }
            }
            DataSource::Buffer { data, media_type } => {
                match resolve_format(None, media_type.as_deref(), true)? {
                    SourceFormat::Delimited => {
                        let options = effective_read_options(options, None);
                        Ok(Workbook::single(delimited::read_buffer(data, &options)))
                    }
                    SourceFormat::Xlsx => xlsx::read_buffer(data),
                }
            }
            DataSource::Remote {
                document_id,
                ranges,
            } => {
                self.remote_adapter()?
                    .read(document_id, ranges.as_deref())
                    .await
            }
        }
    }

    /// Write a workbook to any target. A delimited target takes the first
    /// sheet; the other targets take the whole workbook.
    pub async fn write(&self, workbook: &Workbook, target: &DataTarget) -> Result<()> {
        match target {
            DataTarget::File { path } => match resolve_format(Some(path), None, false)? {
                SourceFormat::Delimited => {
                    let mut options = delimited::WriteOptions::default();
                    if extension_of(path).as_deref() == Some("tsv") {
                        options.delimiter = '\t';
                    }
                    self.write_delimited(workbook, path, &options).await
                }
                SourceFormat::Xlsx => {
                    write_xlsx(workbook, path, &xlsx::WriteOptions::default()).await
                }
            },
            DataTarget::Delimited { path, options } => {
                self.write_delimited(workbook, path, options).await
            }
            DataTarget::Xlsx { path, options } => write_xlsx(workbook, path, options).await,
            DataTarget::Remote {
                document_id,
                options,
            } => {
                self.remote_adapter()?
                    .write(workbook, document_id, options)
                    .await
            }
        }
    }

    /// Read from one descriptor and write to another, with no validation
    /// in between.
    pub async fn convert(
        &self,
        source: &DataSource,
        target: &DataTarget,
        options: &delimited::ReadOptions,
    ) -> Result<()> {
        let workbook = self.read(source, options).await?;
        self.write(&workbook, target).await
    }

    /// Check a workbook against an application profile. Violations are the
    /// result of a successful run, not an error.
    pub fn validate(&self, workbook: &Workbook, profile: &Profile) -> Vec<Violation> {
        self.validator.validate(workbook, profile)
    }

    /// Row-at-a-time pipeline over JSON-lines files, independent of the
    /// format adapters. Without a transform the bytes are copied as-is;
    /// with one, each line is decoded into a Row, transformed, and
    /// re-encoded. Returning `None` drops the row.
    pub async fn stream<F>(
        &self,
        source: impl AsRef<Path>,
        target: impl AsRef<Path>,
        transform: Option<F>,
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
        let mut writer = BufWriter::new(fs::File::create(target.as_ref()).await?);

        let Some(mut transform) = transform else {
            let mut reader = BufReader::new(file);
            tokio::io::copy(&mut reader, &mut writer).await?;
            writer.flush().await?;
            return Ok(());
        };

        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let row: Row = serde_json::from_str(&line)
                .map_err(|err| EngineError::decode_path(source, err.to_string()))?;
            if let Some(row) = transform(row) {
                let encoded = serde_json::to_string(&row)
                    .map_err(|err| EngineError::decode_path(source, err.to_string()))?;
                writer.write_all(encoded.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
        }
        writer.flush().await?;
        Ok(())
    }

    /// Direct access to the remote adapter, for document creation.
    pub fn remote(&self) -> Option<&RemoteSheetAdapter> {
        self.remote.as_ref()
    }

    fn remote_adapter(&self) -> Result<&RemoteSheetAdapter> {
        self.remote.as_ref().ok_or_else(|| {
            EngineError::RemoteUnavailable("no remote sheet service configured".into())
        })
    }

    async fn write_delimited(
        &self,
        workbook: &Workbook,
        path: &Path,
        options: &delimited::WriteOptions,
    ) -> Result<()> {
        let sheet = workbook
            .sheets
            .first()
            .ok_or_else(|| EngineError::NotFound("workbook contains no sheets".into()))?;
        delimited::write(sheet, path, options).await
    }
}

async fn write_xlsx(workbook: &Workbook, path: &Path, options: &xlsx::WriteOptions) -> Result<()> {
    let workbook = workbook.clone();
    let path = path.to_path_buf();
    let options = options.clone();
    run_blocking(move || xlsx::write(&workbook, &path, &options)).await
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|err| EngineError::Io(std::io::Error::other(err)))?
}

/// Pick the adapter for a file or buffer source exactly once. Buffers with
/// no declared media type default to the binary container format.
fn resolve_format(
    path: Option<&Path>,
    media_type: Option<&str>,
    buffer_default: bool,
) -> Result<SourceFormat> {
    if let Some(media_type) = media_type {
        return match media_type {
            MEDIA_TYPE_CSV | MEDIA_TYPE_TSV => Ok(SourceFormat::Delimited),
            MEDIA_TYPE_XLSX => Ok(SourceFormat::Xlsx),
            other => Err(EngineError::UnsupportedFormat(other.to_string())),
        };
    }
    if let Some(path) = path {
        let extension = extension_of(path);
        return match extension.as_deref() {
            Some("csv") | Some("tsv") => Ok(SourceFormat::Delimited),
            Some("xlsx") | Some("xlsm") | Some("xls") => Ok(SourceFormat::Xlsx),
            other => Err(EngineError::UnsupportedFormat(
                other.unwrap_or("<no extension>").to_string(),
            )),
        };
    }
    if buffer_default {
        debug!("buffer source has no media type, assuming binary container");
        return Ok(SourceFormat::Xlsx);
    }
    Err(EngineError::UnsupportedFormat("<unknown>".to_string()))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// Tab-separated files get a tab delimiter unless the caller overrode it.
fn effective_read_options(
    options: &delimited::ReadOptions,
    path: Option<&Path>,
) -> delimited::ReadOptions {
    let mut effective = options.clone();
    if effective.delimiter == ','
        && path.map(|p| extension_of(p).as_deref() == Some("tsv")).unwrap_or(false)
    {
        effective.delimiter = '\t';
    }
    effective
}
