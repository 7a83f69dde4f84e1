#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use sheetbridge::{CellValue, Row, Sheet, Workbook};
use tempfile::{TempDir, tempdir};
use umya_spreadsheet::{self, Spreadsheet};

pub struct TestWorkspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().to_path_buf();
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn write_text(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create dir");
        }
        std::fs::write(&path, content).expect("write file");
        path
    }

    pub fn create_workbook<F>(&self, name: &str, f: F) -> PathBuf
    where
        F: FnOnce(&mut Spreadsheet),
    {
        let path = self.path(name);
        write_workbook_to_path(&path, f);
        path
    }
}

pub fn write_workbook_to_path<F>(path: &Path, f: F)
where
    F: FnOnce(&mut Spreadsheet),
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dir");
    }
    let mut book = umya_spreadsheet::new_file();
    f(&mut book);
    umya_spreadsheet::writer::xlsx::write(&book, path).expect("write workbook");
}

pub fn date(year: i32, month: u32, day: u32) -> CellValue {
    CellValue::Date(NaiveDate::from_ymd_opt(year, month, day).expect("valid date"))
}

pub fn row(pairs: &[(&str, CellValue)]) -> Row {
    let mut row = Row::new();
    for (key, value) in pairs {
        row.insert((*key).to_string(), value.clone());
    }
    row
}

/// A small vocabulary-terms sheet exercising every primitive kind.
pub fn terms_sheet() -> Sheet {
    let mut sheet = Sheet::with_headers(
        "terms",
        vec![
            "id".into(),
            "label".into(),
            "count".into(),
            "active".into(),
            "added".into(),
        ],
    );
    sheet.rows.push(row(&[
        ("id", CellValue::Text("t1".into())),
        ("label", CellValue::Text("alpha".into())),
        ("count", CellValue::Number(3.0)),
        ("active", CellValue::Bool(true)),
        ("added", date(2024, 11, 1)),
    ]));
    sheet.rows.push(row(&[
        ("id", CellValue::Text("t2".into())),
        ("label", CellValue::Text("beta".into())),
        ("count", CellValue::Number(7.5)),
        ("active", CellValue::Bool(false)),
        ("added", CellValue::Null),
    ]));
    sheet
}

pub fn terms_workbook() -> Workbook {
    Workbook::single(terms_sheet())
}
