//! In-process worksheet grid — the backend used by tests and local runs.
//!
//! Behaves like the hosted spreadsheet service at the interface the store
//! relies on: cells hold strings, a `=SUM(range)` formula cell reads back
//! as its computed value, and a column scan pads interior gaps with empty
//! strings. Export renders a plain-text table (good enough for a dev
//! backend; the hosted engine produces real PDFs).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ledger::LedgerError;

#[derive(Debug)]
struct Worksheet {
    rows: u32,
    cols: u32,
    cells: HashMap<(u32, u32), String>,
}

/// Cheaply clonable handle to a shared in-memory grid.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    sheets: Arc<Mutex<HashMap<String, Worksheet>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self { sheets: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub async fn worksheet_exists(&self, title: &str) -> Result<bool, LedgerError> {
        Ok(self.lock().contains_key(title))
    }

    pub async fn add_worksheet(&self, title: &str, rows: u32, cols: u32) -> Result<(), LedgerError> {
        let mut sheets = self.lock();
        if sheets.contains_key(title) {
            return Err(LedgerError::Backend(format!("worksheet '{title}' already exists")));
        }
        sheets.insert(title.to_string(), Worksheet { rows, cols, cells: HashMap::new() });
        Ok(())
    }

    pub async fn read_cell(&self, title: &str, row: u32, col: u32) -> Result<String, LedgerError> {
        let sheets = self.lock();
        let sheet = get(&sheets, title)?;
        check_bounds(sheet, title, row, col)?;
        let raw = sheet.cells.get(&(row, col)).cloned().unwrap_or_default();
        Ok(evaluate(sheet, &raw))
    }

    pub async fn update_cell(
        &self,
        title: &str,
        row: u32,
        col: u32,
        value: &str,
    ) -> Result<(), LedgerError> {
        let mut sheets = self.lock();
        let sheet = get_mut(&mut sheets, title)?;
        check_bounds(sheet, title, row, col)?;
        sheet.cells.insert((row, col), value.to_string());
        Ok(())
    }

    pub async fn col_values(&self, title: &str, col: u32) -> Result<Vec<String>, LedgerError> {
        let sheets = self.lock();
        let sheet = get(&sheets, title)?;
        let last = sheet
            .cells
            .iter()
            .filter(|((_, c), v)| *c == col && !v.is_empty())
            .map(|((r, _), _)| *r)
            .max()
            .unwrap_or(0);
        Ok((1..=last)
            .map(|r| sheet.cells.get(&(r, col)).cloned().unwrap_or_default())
            .collect())
    }

    pub async fn export(&self, title: &str) -> Result<Vec<u8>, LedgerError> {
        let sheets = self.lock();
        let sheet = get(&sheets, title)?;
        let last = sheet
            .cells
            .iter()
            .filter(|((_, c), v)| (1..=5).contains(c) && !v.is_empty())
            .map(|((r, _), _)| *r)
            .max()
            .unwrap_or(0);

        let mut out = format!("{title}\n");
        for r in 1..=last {
            let fields: Vec<String> = (1..=5)
                .map(|c| {
                    let raw = sheet.cells.get(&(r, c)).cloned().unwrap_or_default();
                    evaluate(sheet, &raw)
                })
                .collect();
            out.push_str(&fields.join("\t"));
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    /// Raw stored cell content (formula text, not its value). Test hook.
    pub fn raw_cell(&self, title: &str, row: u32, col: u32) -> Option<String> {
        self.lock().get(title)?.cells.get(&(row, col)).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Worksheet>> {
        self.sheets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn get<'a>(
    sheets: &'a MutexGuard<'_, HashMap<String, Worksheet>>,
    title: &str,
) -> Result<&'a Worksheet, LedgerError> {
    sheets
        .get(title)
        .ok_or_else(|| LedgerError::Backend(format!("worksheet '{title}' not found")))
}

fn get_mut<'a>(
    sheets: &'a mut MutexGuard<'_, HashMap<String, Worksheet>>,
    title: &str,
) -> Result<&'a mut Worksheet, LedgerError> {
    sheets
        .get_mut(title)
        .ok_or_else(|| LedgerError::Backend(format!("worksheet '{title}' not found")))
}

fn check_bounds(sheet: &Worksheet, title: &str, row: u32, col: u32) -> Result<(), LedgerError> {
    if row == 0 || col == 0 || row > sheet.rows || col > sheet.cols {
        return Err(LedgerError::Backend(format!(
            "cell ({row}, {col}) out of range for worksheet '{title}' ({}x{})",
            sheet.rows, sheet.cols
        )));
    }
    Ok(())
}

// ── Formula evaluation ────────────────────────────────────────────────────────

/// Evaluate a cell's displayed value. Only single-column `=SUM(A1:A9)`
/// formulas are understood — the one shape the store writes; anything else
/// reads back verbatim.
fn evaluate(sheet: &Worksheet, raw: &str) -> String {
    let Some(range) = raw
        .strip_prefix("=SUM(")
        .or_else(|| raw.strip_prefix("=sum("))
        .and_then(|r| r.strip_suffix(')'))
    else {
        return raw.to_string();
    };
    let Some((col, first, last)) = parse_range(range) else {
        return raw.to_string();
    };

    let sum: u64 = (first..=last)
        .filter_map(|r| sheet.cells.get(&(r, col)))
        .filter_map(|v| v.parse::<u64>().ok())
        .sum();
    sum.to_string()
}

/// Parse `B2:B1000` into (col, first_row, last_row). `None` for ranges
/// spanning columns or anything malformed.
fn parse_range(range: &str) -> Option<(u32, u32, u32)> {
    let (from, to) = range.split_once(':')?;
    let (col_a, row_a) = parse_ref(from)?;
    let (col_b, row_b) = parse_ref(to)?;
    if col_a != col_b || row_a > row_b {
        return None;
    }
    Some((col_a, row_a, row_b))
}

/// Parse an A1-style reference like `B2` into (col, row).
fn parse_ref(cell: &str) -> Option<(u32, u32)> {
    let digits_at = cell.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell.split_at(digits_at);
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    let row: u32 = digits.parse().ok()?;
    Some((col, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sheet() -> MemoryBackend {
        let b = MemoryBackend::new();
        b.add_worksheet("Test", 100, 10).await.unwrap();
        b
    }

    #[tokio::test]
    async fn cells_read_back_what_was_written() {
        let b = sheet().await;
        assert_eq!(b.read_cell("Test", 1, 1).await.unwrap(), "");
        b.update_cell("Test", 1, 1, "hello").await.unwrap();
        assert_eq!(b.read_cell("Test", 1, 1).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn missing_worksheet_errors() {
        let b = MemoryBackend::new();
        assert!(b.read_cell("Nope", 1, 1).await.is_err());
        assert!(b.update_cell("Nope", 1, 1, "x").await.is_err());
        assert!(b.col_values("Nope", 1).await.is_err());
        assert!(!b.worksheet_exists("Nope").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_worksheet_errors() {
        let b = sheet().await;
        let err = b.add_worksheet("Test", 100, 10).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn out_of_range_cell_errors() {
        let b = sheet().await;
        assert!(b.read_cell("Test", 101, 1).await.is_err());
        assert!(b.update_cell("Test", 1, 11, "x").await.is_err());
        assert!(b.update_cell("Test", 0, 1, "x").await.is_err());
    }

    #[tokio::test]
    async fn col_values_pads_interior_gaps() {
        let b = sheet().await;
        b.update_cell("Test", 1, 1, "a").await.unwrap();
        b.update_cell("Test", 4, 1, "d").await.unwrap();
        assert_eq!(b.col_values("Test", 1).await.unwrap(), vec!["a", "", "", "d"]);
        // Other columns do not leak in.
        assert_eq!(b.col_values("Test", 2).await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn sum_formula_reads_as_computed_value() {
        let b = sheet().await;
        b.update_cell("Test", 5, 7, "=SUM(B2:B4)").await.unwrap();
        assert_eq!(b.read_cell("Test", 5, 7).await.unwrap(), "0");

        b.update_cell("Test", 2, 2, "10").await.unwrap();
        b.update_cell("Test", 3, 2, "32").await.unwrap();
        // Non-numeric rows are ignored, as the hosted engine does.
        b.update_cell("Test", 4, 2, "n/a").await.unwrap();
        assert_eq!(b.read_cell("Test", 5, 7).await.unwrap(), "42");

        // The raw formula is still stored.
        assert_eq!(b.raw_cell("Test", 5, 7), Some("=SUM(B2:B4)".into()));
    }

    #[tokio::test]
    async fn non_sum_content_reads_verbatim() {
        let b = sheet().await;
        b.update_cell("Test", 1, 1, "=AVERAGE(B2:B4)").await.unwrap();
        assert_eq!(b.read_cell("Test", 1, 1).await.unwrap(), "=AVERAGE(B2:B4)");
        b.update_cell("Test", 1, 2, "=SUM(bogus)").await.unwrap();
        assert_eq!(b.read_cell("Test", 1, 2).await.unwrap(), "=SUM(bogus)");
    }

    #[test]
    fn range_parsing() {
        assert_eq!(parse_range("B2:B1000"), Some((2, 2, 1000)));
        assert_eq!(parse_range("AA1:AA5"), Some((27, 1, 5)));
        assert_eq!(parse_range("B2:C4"), None);
        assert_eq!(parse_range("B9:B2"), None);
        assert_eq!(parse_range("B2"), None);
        assert_eq!(parse_range("2:4"), None);
    }

    #[tokio::test]
    async fn export_renders_occupied_rows() {
        let b = sheet().await;
        b.update_cell("Test", 1, 1, "datetime").await.unwrap();
        b.update_cell("Test", 2, 1, "2026-08-08 12:00:00").await.unwrap();
        b.update_cell("Test", 2, 2, "120").await.unwrap();

        let text = String::from_utf8(b.export("Test").await.unwrap()).unwrap();
        assert!(text.starts_with("Test\n"));
        assert!(text.contains("datetime"));
        assert!(text.contains("2026-08-08 12:00:00\t120"));
    }
}
