//! The fixed column layout of the `Users` and `Transactions` sheets, and a borrowed row view that
//! reads cells through that layout instead of raw indexes.

use serde::{Deserialize, Serialize};

/// A column of one of the ledger sheets.
pub(crate) trait Column: Copy {
    /// Zero-based offset of the column in a sheet row.
    fn index(self) -> usize;

    /// The header text found in row 1 of the sheet.
    fn header(self) -> &'static str;
}

/// Represents the known columns of the `Users` sheet.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum UserColumn {
    Name,
    Phone,
    CreatedAt,
}

impl UserColumn {
    /// All columns in sheet order.
    pub(crate) const ALL: [UserColumn; USER_COL_COUNT] =
        [UserColumn::Name, UserColumn::Phone, UserColumn::CreatedAt];
}

impl Column for UserColumn {
    fn index(self) -> usize {
        match self {
            UserColumn::Name => NAME_IDX,
            UserColumn::Phone => PHONE_IDX,
            UserColumn::CreatedAt => CREATED_AT_IDX,
        }
    }

    fn header(self) -> &'static str {
        match self {
            UserColumn::Name => NAME_STR,
            UserColumn::Phone => PHONE_STR,
            UserColumn::CreatedAt => CREATED_AT_STR,
        }
    }
}

/// Represents the known columns of the `Transactions` sheet.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum TransactionColumn {
    Id,
    Date,
    Day,
    Name,
    Amount,
    Type,
    Phone,
}

impl TransactionColumn {
    /// All columns in sheet order.
    pub(crate) const ALL: [TransactionColumn; TRANSACTION_COL_COUNT] = [
        TransactionColumn::Id,
        TransactionColumn::Date,
        TransactionColumn::Day,
        TransactionColumn::Name,
        TransactionColumn::Amount,
        TransactionColumn::Type,
        TransactionColumn::Phone,
    ];
}

impl Column for TransactionColumn {
    fn index(self) -> usize {
        match self {
            TransactionColumn::Id => ID_IDX,
            TransactionColumn::Date => DATE_IDX,
            TransactionColumn::Day => DAY_IDX,
            TransactionColumn::Name => TX_NAME_IDX,
            TransactionColumn::Amount => AMOUNT_IDX,
            TransactionColumn::Type => TYPE_IDX,
            TransactionColumn::Phone => TX_PHONE_IDX,
        }
    }

    fn header(self) -> &'static str {
        match self {
            TransactionColumn::Id => ID_STR,
            TransactionColumn::Date => DATE_STR,
            TransactionColumn::Day => DAY_STR,
            TransactionColumn::Name => NAME_STR,
            TransactionColumn::Amount => AMOUNT_STR,
            TransactionColumn::Type => TYPE_STR,
            TransactionColumn::Phone => PHONE_STR,
        }
    }
}

pub(super) const NAME_STR: &str = "name";
pub(super) const NAME_IDX: usize = 0;

pub(super) const PHONE_STR: &str = "phone";
pub(super) const PHONE_IDX: usize = 1;

pub(super) const CREATED_AT_STR: &str = "createdAt";
pub(super) const CREATED_AT_IDX: usize = 2;

pub(super) const USER_COL_COUNT: usize = 3;

pub(super) const ID_STR: &str = "id";
pub(super) const ID_IDX: usize = 0;

pub(super) const DATE_STR: &str = "date";
pub(super) const DATE_IDX: usize = 1;

pub(super) const DAY_STR: &str = "day";
pub(super) const DAY_IDX: usize = 2;

pub(super) const TX_NAME_IDX: usize = 3;

pub(super) const AMOUNT_STR: &str = "amount";
pub(super) const AMOUNT_IDX: usize = 4;

pub(super) const TYPE_STR: &str = "type";
pub(super) const TYPE_IDX: usize = 5;

pub(super) const TX_PHONE_IDX: usize = 6;

pub(super) const TRANSACTION_COL_COUNT: usize = 7;

/// A borrowed view of one sheet row. The sheets API drops empty trailing cells, so a short row
/// is normal: any cell past the end reads as absent. Cells past the known layout are ignored.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Row<'a> {
    cells: &'a [String],
}

impl<'a> Row<'a> {
    pub(crate) fn new(cells: &'a [String]) -> Self {
        Self { cells }
    }

    /// The trimmed cell at `column`, or `None` when the cell is missing or blank.
    pub(crate) fn get(&self, column: impl Column) -> Option<&'a str> {
        self.cells
            .get(column.index())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// The trimmed cell at `column`, or an empty string.
    pub(crate) fn text(&self, column: impl Column) -> String {
        self.get(column).unwrap_or_default().to_string()
    }

    pub(crate) fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

/// Lays values out in the order of `columns`.
pub(crate) fn build_row<C, F>(columns: &[C], mut value: F) -> Vec<String>
where
    C: Column,
    F: FnMut(C) -> String,
{
    let mut row = vec![String::new(); columns.len()];
    for &column in columns {
        row[column.index()] = value(column);
    }
    row
}

/// The header row for a sheet.
pub(crate) fn header_row<C: Column>(columns: &[C]) -> Vec<String> {
    build_row(columns, |c| c.header().to_string())
}
