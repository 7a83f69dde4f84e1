use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::{Value, json};
use sheetbridge::adapters::remote::{
    RemoteDocument, RemoteSheetAdapter, RemoteSheetProperties, RemoteWriteOptions, SheetsService,
};
use sheetbridge::error::{EngineError, Result};
use sheetbridge::{CellValue, SheetMetadata};

mod support;

#[derive(Default)]
struct FakeState {
    document: RemoteDocument,
    values: HashMap<String, Vec<Vec<Value>>>,
    failing: HashSet<String>,
    updates: Vec<(String, Vec<Vec<Value>>)>,
    cleared: Vec<String>,
    frozen: Vec<(usize, u32, u32)>,
    created: Option<(String, Vec<RemoteSheetProperties>)>,
    shared: Vec<(String, Vec<String>)>,
}

#[derive(Default)]
struct FakeService {
    state: Mutex<FakeState>,
}

impl FakeService {
    fn with_state<F: FnOnce(&mut FakeState)>(f: F) -> Arc<Self> {
        let service = Self::default();
        f(&mut service.state.lock().unwrap());
        Arc::new(service)
    }

    fn sheet(title: &str) -> RemoteSheetProperties {
        RemoteSheetProperties {
            title: title.to_string(),
            row_count: 100,
            column_count: 26,
            frozen_rows: None,
            frozen_columns: None,
        }
    }
}

#[async_trait]
impl SheetsService for FakeService {
    async fn document_metadata(&self, _document_id: &str) -> Result<RemoteDocument> {
        Ok(self.state.lock().unwrap().document.clone())
    }

    async fn get_values(&self, document_id: &str, range: &str) -> Result<Vec<Vec<Value>>> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(range) {
            return Err(EngineError::remote(document_id, "backend rejected range"));
        }
        Ok(state.values.get(range).cloned().unwrap_or_default())
    }

    async fn update_values(
        &self,
        _document_id: &str,
        range: &str,
        values: Vec<Vec<Value>>,
    ) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .updates
            .push((range.to_string(), values));
        Ok(())
    }

    async fn clear_values(&self, _document_id: &str, range: &str) -> Result<()> {
        self.state.lock().unwrap().cleared.push(range.to_string());
        Ok(())
    }

    async fn set_frozen(
        &self,
        _document_id: &str,
        sheet_index: usize,
        frozen_rows: u32,
        frozen_columns: u32,
    ) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .frozen
            .push((sheet_index, frozen_rows, frozen_columns));
        Ok(())
    }

    async fn create_document(
        &self,
        title: &str,
        sheets: Vec<RemoteSheetProperties>,
    ) -> Result<String> {
        self.state.lock().unwrap().created = Some((title.to_string(), sheets));
        Ok("doc-created".to_string())
    }

    async fn share(&self, document_id: &str, identities: &[String]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .shared
            .push((document_id.to_string(), identities.to_vec()));
        Ok(())
    }
}

#[tokio::test]
async fn reads_a_document_into_typed_sheets() {
    let service = FakeService::with_state(|state| {
        state.document = RemoteDocument {
            title: Some("Vocabulary".into()),
            sheets: vec![RemoteSheetProperties {
                frozen_rows: Some(1),
                ..FakeService::sheet("terms")
            }],
        };
        state.values.insert(
            "terms".into(),
            vec![
                vec![json!("id"), json!("count"), json!("added")],
                vec![json!("t1"), json!(3), json!("2024-11-01")],
            ],
        );
    });
    let adapter = RemoteSheetAdapter::new(service);

    let workbook = adapter.read("doc-1", None).await.expect("read document");

    assert_eq!(
        workbook.metadata.as_ref().and_then(|m| m.title.as_deref()),
        Some("Vocabulary")
    );
    let sheet = &workbook.sheets[0];
    assert_eq!(
        sheet.headers.as_deref(),
        Some(&["id".to_string(), "count".to_string(), "added".to_string()][..])
    );
    assert_eq!(sheet.rows[0]["count"], CellValue::Number(3.0));
    assert_eq!(sheet.rows[0]["added"], support::date(2024, 11, 1));
    assert_eq!(
        sheet.metadata.as_ref().and_then(|m| m.frozen_rows),
        Some(1)
    );
}

#[tokio::test]
async fn a_failing_sheet_becomes_empty_without_failing_the_read() {
    let service = FakeService::with_state(|state| {
        state.document.sheets = vec![
            FakeService::sheet("good"),
            FakeService::sheet("broken"),
            FakeService::sheet("also_good"),
        ];
        let grid = vec![vec![json!("a")], vec![json!(1)]];
        state.values.insert("good".into(), grid.clone());
        state.values.insert("also_good".into(), grid);
        state.failing.insert("broken".into());
    });
    let adapter = RemoteSheetAdapter::new(service);

    let workbook = adapter.read("doc-1", None).await.expect("read document");

    assert_eq!(workbook.sheets.len(), 3);
    assert_eq!(workbook.sheets[0].rows.len(), 1);
    assert!(workbook.sheets[1].is_empty());
    assert_eq!(workbook.sheets[1].name, "broken");
    assert_eq!(workbook.sheets[2].rows.len(), 1);
}

#[tokio::test]
async fn explicit_ranges_override_sheet_titles() {
    let service = FakeService::with_state(|state| {
        state.document.sheets = vec![FakeService::sheet("terms")];
        state.values.insert(
            "terms!A1:B2".into(),
            vec![vec![json!("id")], vec![json!("t1")]],
        );
    });
    let adapter = RemoteSheetAdapter::new(service);

    let ranges = vec!["terms!A1:B2".to_string()];
    let workbook = adapter
        .read("doc-1", Some(&ranges))
        .await
        .expect("read document");

    assert_eq!(workbook.sheets[0].rows.len(), 1);
    assert_eq!(workbook.sheets[0].rows[0]["id"], CellValue::Text("t1".into()));
}

#[tokio::test]
async fn writing_pushes_values_and_freezes_panes() {
    let service = FakeService::with_state(|state| {
        state.document.sheets = vec![FakeService::sheet("stale")];
    });
    let adapter = RemoteSheetAdapter::new(service.clone());

    let mut workbook = support::terms_workbook();
    workbook.sheets[0].metadata = Some(SheetMetadata {
        frozen_rows: Some(1),
        frozen_columns: None,
        column_widths: Vec::new(),
    });
    let options = RemoteWriteOptions {
        clear_existing: true,
        share_with: Vec::new(),
    };
    adapter
        .write(&workbook, "doc-1", &options)
        .await
        .expect("write document");

    let state = service.state.lock().unwrap();
    assert_eq!(state.cleared, vec!["stale".to_string()]);
    assert_eq!(state.frozen, vec![(0, 1, 0)]);
    let (range, values) = &state.updates[0];
    assert_eq!(range, "terms!A1");
    // Header row plus two data rows, dates rendered as ISO strings.
    assert_eq!(values.len(), 3);
    assert_eq!(values[0][0], json!("id"));
    assert_eq!(values[1][4], json!("2024-11-01"));
    assert_eq!(values[2][4], json!(""));
}

#[tokio::test]
async fn sharing_goes_through_the_service_capability() {
    let service = Arc::new(FakeService::default());
    let adapter = RemoteSheetAdapter::new(service.clone());

    let options = RemoteWriteOptions {
        clear_existing: false,
        share_with: vec!["a@example.org".into(), "b@example.org".into()],
    };
    adapter
        .write(&support::terms_workbook(), "doc-1", &options)
        .await
        .expect("write document");

    let state = service.state.lock().unwrap();
    assert_eq!(
        state.shared,
        vec![(
            "doc-1".to_string(),
            vec!["a@example.org".to_string(), "b@example.org".to_string()],
        )]
    );
}

#[tokio::test]
async fn unsupported_sharing_degrades_to_a_manual_step() {
    // A client that never implements the share capability keeps the
    // trait's default; the write itself must still succeed.
    struct MinimalService;

    #[async_trait]
    impl SheetsService for MinimalService {
        async fn document_metadata(&self, _document_id: &str) -> Result<RemoteDocument> {
            Ok(RemoteDocument::default())
        }

        async fn get_values(&self, _document_id: &str, _range: &str) -> Result<Vec<Vec<Value>>> {
            Ok(Vec::new())
        }

        async fn update_values(
            &self,
            _document_id: &str,
            _range: &str,
            _values: Vec<Vec<Value>>,
        ) -> Result<()> {
            Ok(())
        }

        async fn clear_values(&self, _document_id: &str, _range: &str) -> Result<()> {
            Ok(())
        }

        async fn set_frozen(
            &self,
            _document_id: &str,
            _sheet_index: usize,
            _frozen_rows: u32,
            _frozen_columns: u32,
        ) -> Result<()> {
            Ok(())
        }

        async fn create_document(
            &self,
            _title: &str,
            _sheets: Vec<RemoteSheetProperties>,
        ) -> Result<String> {
            Ok("doc-minimal".to_string())
        }
    }

    let adapter = RemoteSheetAdapter::new(Arc::new(MinimalService));
    let options = RemoteWriteOptions {
        clear_existing: false,
        share_with: vec!["a@example.org".into()],
    };
    adapter
        .write(&support::terms_workbook(), "doc-1", &options)
        .await
        .expect("write succeeds without the share capability");
}

#[tokio::test]
async fn create_sizes_the_grid_from_the_workbook() {
    let service = Arc::new(FakeService::default());
    let adapter = RemoteSheetAdapter::new(service.clone());

    let workbook = support::terms_workbook();
    let document_id = adapter
        .create("New Vocabulary", Some(&workbook))
        .await
        .expect("create document");

    assert_eq!(document_id, "doc-created");
    let state = service.state.lock().unwrap();
    let (title, sheets) = state.created.as_ref().expect("create recorded");
    assert_eq!(title, "New Vocabulary");
    assert_eq!(sheets[0].title, "terms");
    // Two data rows plus the header row.
    assert_eq!(sheets[0].row_count, 3);
    assert_eq!(sheets[0].column_count, 5);
    // The new document is populated as part of creation.
    assert_eq!(state.updates.len(), 1);
}

#[tokio::test]
async fn the_service_factory_runs_once_on_first_use() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let adapter = RemoteSheetAdapter::with_factory(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeService::default()) as Arc<dyn SheetsService>)
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    adapter.read("doc-1", None).await.expect("first read");
    adapter.read("doc-1", None).await.expect("second read");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_failing_factory_surfaces_as_remote_unavailable() {
    let adapter = RemoteSheetAdapter::with_factory(|| {
        Err(EngineError::RemoteUnavailable("no credentials".into()))
    });
    let err = adapter.read("doc-1", None).await.expect_err("read should fail");
    assert_matches!(err, EngineError::RemoteUnavailable(_));
}
