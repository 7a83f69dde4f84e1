//! sheetbridge converts tabular data between delimited text, xlsx
//! containers, and a remote range-based sheet service, through one neutral
//! Workbook/Sheet/Row model, and validates that model against DCTAP-style
//! application profiles.
//!
//! The [`engine::SpreadsheetEngine`] façade is the usual entry point;
//! the adapters under [`adapters`] are public for callers that need
//! format-specific options.

pub mod adapters;
pub mod engine;
pub mod error;
pub mod model;
pub mod profile;
pub mod validator;

pub use engine::{DataSource, DataTarget, EngineOptions, SpreadsheetEngine};
pub use error::{EngineError, Result};
pub use model::{CellValue, RichCell, Row, Sheet, SheetMetadata, Workbook, WorkbookMetadata};
pub use profile::{ConstraintKind, NodeKind, Profile, Property, Severity, Shape, Violation};
pub use validator::{ProfileValidator, ValidationMode, ValidatorOptions};
