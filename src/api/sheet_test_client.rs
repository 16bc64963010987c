//! Implements the `Sheet` trait using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without using Google Sheets.

use crate::api::{
    sheet_name, BearerToken, Credential, Sheet, SpreadsheetMetadata, TRANSACTIONS, USERS,
};
use crate::error::{SheetResult, SyncError};
use crate::Result;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

/// How many times each operation has been called. Failed calls count too.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct TestSheetCalls {
    pub reads: usize,
    pub api_key_reads: usize,
    pub bearer_reads: usize,
    pub appends: usize,
    pub updates: usize,
    pub clears: usize,
    pub metadata: usize,
}

#[derive(Debug, Default, Clone)]
struct Tab {
    name: String,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Default, Clone)]
struct Faults {
    read: Option<SyncError>,
    append: Option<SyncError>,
    metadata: Option<SyncError>,
}

#[derive(Debug, Default)]
struct State {
    title: String,
    tabs: Vec<Tab>,
    calls: TestSheetCalls,
    faults: Faults,
}

impl State {
    fn tab(&self, name: &str) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.name == name)
    }

    fn tab_mut(&mut self, name: &str) -> SheetResult<&mut Tab> {
        self.tabs
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| SyncError::MalformedRequest {
                message: format!("Unable to parse range: {name}"),
            })
    }
}

/// An implementation of the `Sheet` trait that does not use Google sheets. It holds its sheets in
/// memory and, by default, is seeded with a `Users` and a `Transactions` sheet. Clones share the
/// same data, so a test can keep a handle while the store owns another.
#[derive(Debug, Clone)]
pub struct TestSheet {
    state: Arc<Mutex<State>>,
}

impl TestSheet {
    /// Create a new `TestSheet` from `(sheet name, rows)` pairs, in sheet order.
    pub fn new(tabs: Vec<(String, Vec<Vec<String>>)>) -> Self {
        let tabs = tabs
            .into_iter()
            .map(|(name, rows)| Tab { name, rows })
            .collect();
        Self {
            state: Arc::new(Mutex::new(State {
                title: "Kas Kamling".to_string(),
                tabs,
                ..State::default()
            })),
        }
    }

    /// A spreadsheet with no sheets at all.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> TestSheetCalls {
        self.lock().calls
    }

    /// A copy of every row in `name`, header included.
    pub fn rows(&self, name: &str) -> Option<Vec<Vec<String>>> {
        self.lock().tab(name).map(|t| t.rows.clone())
    }

    pub fn add_sheet(&self, name: &str, rows: Vec<Vec<String>>) {
        let mut state = self.lock();
        state.tabs.retain(|t| t.name != name);
        state.tabs.push(Tab {
            name: name.to_string(),
            rows,
        });
    }

    pub fn remove_sheet(&self, name: &str) {
        self.lock().tabs.retain(|t| t.name != name);
    }

    /// Every read fails with `error` until `heal` is called.
    pub fn fail_reads(&self, error: SyncError) {
        self.lock().faults.read = Some(error);
    }

    /// Every append fails with `error` until `heal` is called.
    pub fn fail_appends(&self, error: SyncError) {
        self.lock().faults.append = Some(error);
    }

    /// Every metadata fetch fails with `error` until `heal` is called.
    pub fn fail_metadata(&self, error: SyncError) {
        self.lock().faults.metadata = Some(error);
    }

    pub fn heal(&self) {
        self.lock().faults = Faults::default();
    }
}

#[async_trait::async_trait]
impl Sheet for TestSheet {
    async fn read(&self, range: &str, credential: &Credential) -> SheetResult<Vec<Vec<String>>> {
        trace!("read {range}");
        let mut state = self.lock();
        state.calls.reads += 1;
        match credential {
            Credential::ApiKey(_) => state.calls.api_key_reads += 1,
            Credential::Bearer(_) => state.calls.bearer_reads += 1,
        }
        if let Some(e) = &state.faults.read {
            return Err(e.clone());
        }
        let a1 = A1::parse(range);
        let tab = state.tab_mut(a1.sheet)?;
        let rows = tab
            .rows
            .iter()
            .skip(a1.first_row)
            .map(|row| a1.columns(row))
            .collect::<Vec<_>>();
        Ok(trim_trailing_rows(rows))
    }

    async fn append(
        &self,
        range: &str,
        rows: &[Vec<String>],
        _token: &BearerToken,
    ) -> SheetResult<()> {
        trace!("append {} rows to {range}", rows.len());
        let mut state = self.lock();
        state.calls.appends += 1;
        if let Some(e) = &state.faults.append {
            return Err(e.clone());
        }
        let a1 = A1::parse(range);
        let tab = state.tab_mut(a1.sheet)?;
        let mut trimmed = trim_trailing_rows(std::mem::take(&mut tab.rows));
        for row in rows {
            let mut new_row = vec![String::new(); a1.first_col];
            new_row.extend(row.iter().cloned());
            trimmed.push(new_row);
        }
        tab.rows = trimmed;
        Ok(())
    }

    async fn update(
        &self,
        range: &str,
        rows: &[Vec<String>],
        _token: &BearerToken,
    ) -> SheetResult<()> {
        trace!("update {range}");
        let mut state = self.lock();
        state.calls.updates += 1;
        let a1 = A1::parse(range);
        let tab = state.tab_mut(a1.sheet)?;
        for (i, values) in rows.iter().enumerate() {
            let r = a1.first_row + i;
            if tab.rows.len() <= r {
                tab.rows.resize(r + 1, Vec::new());
            }
            let row = &mut tab.rows[r];
            for (j, value) in values.iter().enumerate() {
                let c = a1.first_col + j;
                if row.len() <= c {
                    row.resize(c + 1, String::new());
                }
                row[c] = value.clone();
            }
        }
        Ok(())
    }

    async fn clear(&self, range: &str, _token: &BearerToken) -> SheetResult<()> {
        trace!("clear {range}");
        let mut state = self.lock();
        state.calls.clears += 1;
        let a1 = A1::parse(range);
        let tab = state.tab_mut(a1.sheet)?;
        for row in tab.rows.iter_mut().skip(a1.first_row) {
            let end = a1.last_col.map_or(row.len(), |l| (l + 1).min(row.len()));
            for cell in row.iter_mut().take(end).skip(a1.first_col) {
                cell.clear();
            }
        }
        tab.rows = trim_trailing_rows(std::mem::take(&mut tab.rows));
        Ok(())
    }

    async fn metadata(&self, _credential: &Credential) -> SheetResult<SpreadsheetMetadata> {
        trace!("metadata");
        let mut state = self.lock();
        state.calls.metadata += 1;
        if let Some(e) = &state.faults.metadata {
            return Err(e.clone());
        }
        let titles: Vec<&str> = state.tabs.iter().map(|t| t.name.as_str()).collect();
        Ok(SpreadsheetMetadata::new(state.title.clone(), &titles))
    }
}

impl Default for TestSheet {
    /// Loads seed data from this module.
    fn default() -> Self {
        Self::new(default_data())
    }
}

/// The parts of an A1 range this client understands: `Sheet!A2:G`, `Sheet!A:C`, `Sheet`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct A1<'a> {
    sheet: &'a str,
    first_col: usize,
    last_col: Option<usize>,
    first_row: usize,
}

impl<'a> A1<'a> {
    fn parse(range: &'a str) -> Self {
        let sheet = sheet_name(range);
        let cells = range.split_once('!').map(|(_, c)| c).unwrap_or_default();
        let cells = cells.split(':').collect::<Vec<_>>();
        let (first_col, first_row) = cells
            .first()
            .map(|c| split_cell(c))
            .unwrap_or((Some(0), None));
        let last_col = cells.get(1).and_then(|c| split_cell(c).0);
        Self {
            sheet,
            first_col: first_col.unwrap_or(0),
            last_col,
            first_row: first_row.map(|r| r.saturating_sub(1)).unwrap_or(0),
        }
    }

    fn columns(&self, row: &[String]) -> Vec<String> {
        let end = self
            .last_col
            .map_or(row.len(), |last| (last + 1).min(row.len()));
        let mut cells: Vec<String> = row
            .iter()
            .take(end)
            .skip(self.first_col)
            .cloned()
            .collect();
        while cells.last().is_some_and(|c| c.is_empty()) {
            cells.pop();
        }
        cells
    }
}

/// Splits `B12` into zero-based column 1 and one-based row 12.
fn split_cell(cell: &str) -> (Option<usize>, Option<usize>) {
    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &cell[letters.len()..];
    let col = if letters.is_empty() {
        None
    } else {
        Some(
            letters
                .to_ascii_uppercase()
                .bytes()
                .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize)
                - 1,
        )
    };
    (col, digits.parse().ok())
}

fn trim_trailing_rows(mut rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    while rows
        .last()
        .is_some_and(|r| r.iter().all(|c| c.is_empty()))
    {
        rows.pop();
    }
    rows
}

/// Provides the seed data from this module.
fn default_data() -> Vec<(String, Vec<Vec<String>>)> {
    let mut tabs = Vec::new();
    for (name, data) in [(USERS, USER_DATA), (TRANSACTIONS, TRANSACTION_DATA)] {
        match load_csv(data) {
            Ok(rows) => tabs.push((name.to_string(), rows)),
            Err(e) => warn!("Unable to load the seed data for {name}: {e:#}"),
        }
    }
    tabs
}

/// Loads data from a CSV-formatted string.
fn load_csv(csv_data: &str) -> Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(csv_data.as_bytes()));

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }
    Ok(rows)
}

/// Seed user data.
const USER_DATA: &str = r##"name,phone,createdAt
Budi Santoso,6281211112222,28 Des 2025
Sarah Wijaya,6281333334444,29 Des 2025
"##;

/// Seed transaction data. The last row is short, the way the sheets API returns rows whose
/// trailing cells are empty.
const TRANSACTION_DATA: &str = r##"id,date,day,name,amount,type,phone
1767052800000,30 Des 2025,Malam Rabu,Budi Santoso,30000,masuk,6281211112222
1767139200000,31 Des 2025,Malam Kamis,Sarah Wijaya,15000,keluar,6281333334444
1767139260000,31 Des 2025,Malam Kamis,Alex,19000,Income
"##;

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> BearerToken {
        BearerToken::new("t")
    }

    fn key() -> Credential {
        Credential::ApiKey("k".to_string())
    }

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_cell() {
        assert_eq!(split_cell("A"), (Some(0), None));
        assert_eq!(split_cell("G"), (Some(6), None));
        assert_eq!(split_cell("B12"), (Some(1), Some(12)));
        assert_eq!(split_cell("AA1"), (Some(26), Some(1)));
    }

    #[test]
    fn test_parse_a1() {
        let a1 = A1::parse("Users!B2:C");
        assert_eq!(a1.sheet, "Users");
        assert_eq!(a1.first_col, 1);
        assert_eq!(a1.last_col, Some(2));
        assert_eq!(a1.first_row, 1);
    }

    #[tokio::test]
    async fn test_seed_data() {
        let sheet = TestSheet::default();
        let users = sheet.read("Users!A:C", &key()).await.unwrap();
        assert_eq!(users.len(), 3);
        assert_eq!(users[0], row(&["name", "phone", "createdAt"]));
        let txs = sheet.read("Transactions!A:G", &key()).await.unwrap();
        assert_eq!(txs.len(), 4);
        assert_eq!(txs[3].len(), 6);
    }

    #[tokio::test]
    async fn test_read_column_slice() {
        let sheet = TestSheet::default();
        let phones = sheet.read("Users!B:B", &key()).await.unwrap();
        assert_eq!(phones[1], row(&["6281211112222"]));
        let calls = sheet.calls();
        assert_eq!(calls.reads, 1);
        assert_eq!(calls.api_key_reads, 1);
    }

    #[tokio::test]
    async fn test_append_and_shared_state() {
        let sheet = TestSheet::default();
        let handle = sheet.clone();
        sheet
            .append("Users!A:C", &[row(&["Ronald", "+62812", "1 Jan 2026"])], &token())
            .await
            .unwrap();
        let rows = handle.rows(USERS).unwrap();
        assert_eq!(rows.last().unwrap(), &row(&["Ronald", "+62812", "1 Jan 2026"]));
        assert_eq!(handle.calls().appends, 1);
    }

    #[tokio::test]
    async fn test_missing_sheet_is_malformed() {
        let sheet = TestSheet::empty();
        let err = sheet.read("Users!A:C", &key()).await.unwrap_err();
        assert!(matches!(err, SyncError::MalformedRequest { .. }));
        let err = sheet
            .append("Users!A:C", &[row(&["x"])], &token())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MalformedRequest { .. }));
    }

    #[tokio::test]
    async fn test_update_and_clear() {
        let sheet = TestSheet::empty();
        sheet.add_sheet("Scratch", Vec::new());
        sheet
            .update("Scratch!B2", &[row(&["x", "y"])], &token())
            .await
            .unwrap();
        assert_eq!(
            sheet.rows("Scratch").unwrap(),
            vec![Vec::<String>::new(), row(&["", "x", "y"])]
        );
        sheet.clear("Scratch!A:Z", &token()).await.unwrap();
        assert!(sheet.rows("Scratch").unwrap().is_empty());
        let calls = sheet.calls();
        assert_eq!((calls.updates, calls.clears), (1, 1));
    }

    #[tokio::test]
    async fn test_faults() {
        let sheet = TestSheet::default();
        sheet.fail_reads(SyncError::AuthRequired { status: 403 });
        assert_eq!(
            sheet.read("Users!A:C", &key()).await,
            Err(SyncError::AuthRequired { status: 403 })
        );
        sheet.heal();
        assert!(sheet.read("Users!A:C", &key()).await.is_ok());
    }

    #[tokio::test]
    async fn test_metadata() {
        let sheet = TestSheet::default();
        let m = sheet.metadata(&key()).await.unwrap();
        assert_eq!(m.sheet_titles().collect::<Vec<_>>(), vec![USERS, TRANSACTIONS]);
    }
}
