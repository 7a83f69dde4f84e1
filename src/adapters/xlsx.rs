//! Binary spreadsheet adapter backed by umya-spreadsheet.
//!
//! Maps the container's richer cell model (formulas, hyperlinks, rich text,
//! date-formatted numbers) onto the neutral model. Frozen panes and column
//! widths are the only layout metadata carried round-trip.
//!
//! All functions here are synchronous; async callers wrap them in
//! `spawn_blocking`.

use std::io::Cursor;
use std::path::Path;

use chrono::{Days, NaiveDate};
use tracing::debug;
use umya_spreadsheet::reader::xlsx as xlsx_reader;
use umya_spreadsheet::structs::EnumTrait;
use umya_spreadsheet::writer::xlsx as xlsx_writer;
use umya_spreadsheet::{
    Coordinate, Pane, PaneStateValues, PaneValues, SheetView, Spreadsheet, Worksheet,
};

use crate::error::{EngineError, Result};
use crate::model::{
    synthetic_column, CellValue, RichCell, Row, Sheet, SheetMetadata, Workbook, WorkbookMetadata,
};

/// Fill applied to header-row cells on write, ARGB.
const HEADER_FILL: &str = "FFE0E0E0";
/// Display width assumed for columns the container carries no dimension for.
const DEFAULT_COLUMN_WIDTH: f64 = 10.0;
/// Serial-number day zero of the container's date system.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Password-protect every sheet against edits.
    pub protection_password: Option<String>,
}

/// Read a container file into a workbook.
pub fn read(path: impl AsRef<Path>) -> Result<Workbook> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(EngineError::NotFound(path.display().to_string()));
    }
    let book =
        xlsx_reader::read(path).map_err(|err| EngineError::decode_path(path, err.to_string()))?;
    let workbook = convert_book(&book);
    debug!(path = %path.display(), sheets = workbook.sheets.len(), "read container file");
    Ok(workbook)
}

/// Read a container already held in memory.
pub fn read_buffer(buffer: &[u8]) -> Result<Workbook> {
    let book = xlsx_reader::read_reader(Cursor::new(buffer), true)
        .map_err(|err| EngineError::decode("<buffer>", err.to_string()))?;
    Ok(convert_book(&book))
}

/// Write a workbook to a container file, styling header rows bold over a
/// grey fill and re-applying frozen panes and column widths.
pub fn write(workbook: &Workbook, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
    let path = path.as_ref();
    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    apply_workbook_metadata(&mut book, workbook);

    for sheet in &workbook.sheets {
        let worksheet = book.new_sheet(sheet.name.as_str()).map_err(|err| {
            EngineError::decode_path(path, format!("could not add sheet {}: {err}", sheet.name))
        })?;
        fill_worksheet(worksheet, sheet);
        if let Some(password) = &options.protection_password {
            worksheet.get_sheet_protection_mut().set_password(password.as_str());
        }
    }

    xlsx_writer::write(&book, path).map_err(|err| EngineError::Io(std::io::Error::other(err)))?;
    debug!(path = %path.display(), sheets = workbook.sheets.len(), "wrote container file");
    Ok(())
}

/// Emit sheets one at a time without deserializing the whole container up
/// front. The callback receives each sheet with its zero-based index.
pub fn stream_read<F>(path: impl AsRef<Path>, mut on_sheet: F) -> Result<()>
where
    F: FnMut(Sheet, usize) -> Result<()>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(EngineError::NotFound(path.display().to_string()));
    }
    let mut book = xlsx_reader::lazy_read(path)
        .map_err(|err| EngineError::decode_path(path, err.to_string()))?;

    let count = book.get_sheet_count();
    for index in 0..count {
        book.read_sheet(index);
        let sheet = match book.get_sheet(&index) {
            Some(worksheet) => convert_sheet(worksheet),
            None => continue,
        };
        on_sheet(sheet, index)?;
    }
    Ok(())
}

fn convert_book(book: &Spreadsheet) -> Workbook {
    let mut sheets = Vec::with_capacity(book.get_sheet_count());
    for index in 0..book.get_sheet_count() {
        if let Some(worksheet) = book.get_sheet(&index) {
            sheets.push(convert_sheet(worksheet));
        }
    }
    Workbook {
        sheets,
        metadata: read_workbook_metadata(book),
    }
}

fn read_workbook_metadata(book: &Spreadsheet) -> Option<WorkbookMetadata> {
    let properties = book.get_properties();
    let mut metadata = WorkbookMetadata::default();
    let title = properties.get_title();
    if !title.is_empty() {
        metadata.title = Some(title.to_string());
    }
    let creator = properties.get_creator();
    if !creator.is_empty() {
        metadata.author = Some(creator.to_string());
    }
    if let Ok(created) = properties.get_created().parse() {
        metadata.created = Some(created);
    }
    if let Ok(modified) = properties.get_modified().parse() {
        metadata.modified = Some(modified);
    }
    if metadata == WorkbookMetadata::default() {
        None
    } else {
        Some(metadata)
    }
}

fn convert_sheet(worksheet: &Worksheet) -> Sheet {
    let mut sheet = Sheet::new(worksheet.get_name());
    let (max_col, max_row) = worksheet.get_highest_column_and_row();
    if max_row == 0 || max_col == 0 {
        return sheet;
    }

    // Row 1 becomes the header list when it holds any value at all.
    let first_row: Vec<String> = (1..=max_col)
        .map(|col| {
            worksheet
                .get_cell((col, 1))
                .map(|cell| cell.get_value().to_string())
                .unwrap_or_default()
        })
        .collect();
    let has_headers = first_row.iter().any(|value| !value.is_empty());
    if has_headers {
        sheet.headers = Some(
            first_row
                .iter()
                .enumerate()
                .map(|(index, value)| {
                    if value.is_empty() {
                        synthetic_column(index)
                    } else {
                        value.clone()
                    }
                })
                .collect(),
        );
    }

    let first_data_row = if has_headers { 2 } else { 1 };
    for row_index in first_data_row..=max_row {
        let mut row = Row::new();
        let mut any_value = false;
        for col in 1..=max_col {
            let key = sheet
                .headers
                .as_ref()
                .and_then(|headers| headers.get(col as usize - 1).cloned())
                .unwrap_or_else(|| synthetic_column(col as usize - 1));
            let value = convert_cell(worksheet, col, row_index);
            if !value.is_empty() {
                any_value = true;
            }
            row.insert(key, value);
        }
        // Rows the container never materialized stay out of the model.
        if any_value {
            sheet.rows.push(row);
        }
    }

    let (frozen_rows, frozen_columns) = read_frozen_panes(worksheet);
    sheet.metadata = Some(SheetMetadata {
        frozen_rows,
        frozen_columns,
        column_widths: (1..=max_col)
            .map(|col| {
                worksheet
                    .get_column_dimension(&column_letter(col))
                    .map(|column| *column.get_width())
                    .unwrap_or(DEFAULT_COLUMN_WIDTH)
            })
            .collect(),
    });
    sheet
}

/// Map one container cell onto the neutral model, preferring the richer
/// kinds first: formula, hyperlink, rich text, then date-formatted numbers,
/// then the bare primitive ladder.
fn convert_cell(worksheet: &Worksheet, col: u32, row: u32) -> CellValue {
    let Some(cell) = worksheet.get_cell((col, row)) else {
        return CellValue::Null;
    };
    let raw = cell.get_value().to_string();

    if cell.is_formula() {
        return CellValue::Rich(Box::new(RichCell::formula(
            primitive_from_str(&raw),
            cell.get_formula(),
        )));
    }
    if let Some(link) = cell.get_hyperlink().as_ref() {
        return CellValue::Rich(Box::new(RichCell::hyperlink(
            CellValue::Text(raw),
            link.get_url(),
        )));
    }
    if matches!(
        cell.get_raw_value(),
        umya_spreadsheet::CellRawValue::RichText(_)
    ) {
        // Rich runs collapse to their concatenated text.
        return CellValue::Rich(Box::new(RichCell {
            value: CellValue::Text(raw),
            ..RichCell::default()
        }));
    }
    if is_date_formatted(worksheet, col, row) {
        if let Ok(serial) = raw.parse::<f64>() {
            if let Some(date) = serial_to_date(serial) {
                return CellValue::Date(date);
            }
        }
    }
    primitive_from_str(&raw)
}

fn primitive_from_str(raw: &str) -> CellValue {
    if raw.is_empty() {
        return CellValue::Null;
    }
    if let Ok(number) = raw.parse::<f64>() {
        return CellValue::Number(number);
    }
    let lower = raw.to_ascii_lowercase();
    if lower == "true" {
        return CellValue::Bool(true);
    }
    if lower == "false" {
        return CellValue::Bool(false);
    }
    CellValue::Text(raw.to_string())
}

fn is_date_formatted(worksheet: &Worksheet, col: u32, row: u32) -> bool {
    worksheet
        .get_cell((col, row))
        .and_then(|cell| cell.get_style().get_number_format())
        .map(|format| {
            let code = format.get_format_code();
            code.contains('y') || code.contains('Y')
        })
        .unwrap_or(false)
}

fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(serial.is_finite() && serial >= 0.0) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(SERIAL_EPOCH.0, SERIAL_EPOCH.1, SERIAL_EPOCH.2)?;
    epoch.checked_add_days(Days::new(serial as u64))
}

fn date_to_serial(date: NaiveDate) -> Option<f64> {
    let epoch = NaiveDate::from_ymd_opt(SERIAL_EPOCH.0, SERIAL_EPOCH.1, SERIAL_EPOCH.2)?;
    Some(date.signed_duration_since(epoch).num_days() as f64)
}

fn apply_workbook_metadata(book: &mut Spreadsheet, workbook: &Workbook) {
    let Some(metadata) = &workbook.metadata else {
        return;
    };
    let properties = book.get_properties_mut();
    if let Some(title) = &metadata.title {
        properties.set_title(title.as_str());
    }
    if let Some(author) = &metadata.author {
        properties.set_creator(author.as_str());
    }
    if let Some(created) = &metadata.created {
        properties.set_created(created.to_rfc3339());
    }
    if let Some(modified) = &metadata.modified {
        properties.set_modified(modified.to_rfc3339());
    }
}

fn fill_worksheet(worksheet: &mut Worksheet, sheet: &Sheet) {
    let mut data_row = 1u32;
    if let Some(headers) = &sheet.headers {
        for (index, header) in headers.iter().enumerate() {
            let cell = worksheet.get_cell_mut((index as u32 + 1, 1));
            cell.set_value_string(header.as_str());
            cell.get_style_mut().get_font_mut().set_bold(true);
            cell.get_style_mut().set_background_color(HEADER_FILL);
        }
        data_row = 2;
    }

    for row in &sheet.rows {
        match &sheet.headers {
            Some(headers) => {
                for (index, header) in headers.iter().enumerate() {
                    let value = row.get(header).unwrap_or(&CellValue::Null);
                    write_cell(worksheet, index as u32 + 1, data_row, value);
                }
            }
            None => {
                for (index, value) in row.values().enumerate() {
                    write_cell(worksheet, index as u32 + 1, data_row, value);
                }
            }
        }
        data_row += 1;
    }

    if let Some(metadata) = &sheet.metadata {
        let frozen_rows = metadata.frozen_rows.unwrap_or(0);
        let frozen_columns = metadata.frozen_columns.unwrap_or(0);
        if frozen_rows > 0 || frozen_columns > 0 {
            apply_frozen_panes(worksheet, frozen_rows, frozen_columns);
        }
        for (index, width) in metadata.column_widths.iter().enumerate() {
            worksheet
                .get_column_dimension_mut(&column_letter(index as u32 + 1))
                .set_width(*width);
        }
    }
}

fn write_cell(worksheet: &mut Worksheet, col: u32, row: u32, value: &CellValue) {
    match value {
        CellValue::Null => {}
        CellValue::Text(text) => {
            worksheet.get_cell_mut((col, row)).set_value_string(text.as_str());
        }
        CellValue::Number(number) => {
            worksheet.get_cell_mut((col, row)).set_value_number(*number);
        }
        CellValue::Bool(flag) => {
            worksheet.get_cell_mut((col, row)).set_value_bool(*flag);
        }
        CellValue::Date(date) => {
            if let Some(serial) = date_to_serial(*date) {
                let cell = worksheet.get_cell_mut((col, row));
                cell.set_value_number(serial);
                cell.get_style_mut()
                    .get_number_format_mut()
                    .set_format_code("yyyy-mm-dd");
            }
        }
        CellValue::Rich(rich) => write_rich_cell(worksheet, col, row, rich),
    }
}

fn write_rich_cell(worksheet: &mut Worksheet, col: u32, row: u32, rich: &RichCell) {
    // Lay down the primitive payload first, then the annotations.
    write_cell(worksheet, col, row, rich.value.primitive());
    let cell = worksheet.get_cell_mut((col, row));
    if let Some(formula) = &rich.formula {
        cell.set_formula(formula.as_str());
    }
    if let Some(target) = &rich.hyperlink {
        cell.get_hyperlink_mut().set_url(target.as_str());
    }
    if let Some(style) = &rich.style {
        let cell_style = cell.get_style_mut();
        if style.bold == Some(true) {
            cell_style.get_font_mut().set_bold(true);
        }
        if style.italic == Some(true) {
            cell_style.get_font_mut().set_italic(true);
        }
        if let Some(name) = &style.font_name {
            cell_style.get_font_mut().set_name(name.as_str());
        }
        if let Some(size) = style.font_size {
            cell_style.get_font_mut().set_size(size);
        }
        if let Some(fill) = &style.fill_color {
            cell_style.set_background_color(fill.as_str());
        }
    }
}

fn apply_frozen_panes(worksheet: &mut Worksheet, frozen_rows: u32, frozen_columns: u32) {
    let mut pane = Pane::default();
    pane.set_horizontal_split(frozen_columns as f64);
    pane.set_vertical_split(frozen_rows as f64);
    let mut top_left = Coordinate::default();
    top_left.set_coordinate(format!(
        "{}{}",
        column_letter(frozen_columns + 1),
        frozen_rows + 1
    ));
    pane.set_top_left_cell(top_left);
    pane.set_active_pane(PaneValues::BottomRight);
    pane.set_state(PaneStateValues::Frozen);

    let views = worksheet.get_sheet_views_mut().get_sheet_view_list_mut();
    if let Some(view) = views.first_mut() {
        view.set_pane(pane);
    } else {
        let mut view = SheetView::default();
        view.set_pane(pane);
        views.push(view);
    }
}

fn read_frozen_panes(worksheet: &Worksheet) -> (Option<u32>, Option<u32>) {
    if let Some(view) = worksheet.get_sheets_views().get_sheet_view_list().first() {
        if let Some(pane) = view.get_pane().as_ref() {
            if pane.get_state().get_value_string() == PaneStateValues::Frozen.get_value_string() {
                let columns = *pane.get_horizontal_split() as u32;
                let rows = *pane.get_vertical_split() as u32;
                return ((rows > 0).then_some(rows), (columns > 0).then_some(columns));
            }
        }
    }
    (None, None)
}

/// A1-style letters for a one-based column index.
fn column_letter(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push(b'A' + rem);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}
