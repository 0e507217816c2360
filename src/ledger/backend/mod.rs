//! Ledger backend implementations.
//!
//! `LedgerBackend` is an enum over concrete worksheet-grid engines.
//! Enum dispatch avoids `dyn` trait objects and the `async-trait`
//! dependency; adding an engine = new module + new variant + new match arms.
//!
//! The surface is deliberately the dumb cell-grid interface of the
//! spreadsheet service this system grew out of: read/write single cells,
//! scan a column, create a worksheet, export one. All allocation and
//! aggregate policy lives above, in [`crate::ledger::LedgerStore`].

pub mod memory;
pub mod sheets;

use crate::config::LedgerConfig;
use crate::error::AppError;

use super::LedgerError;

// ── Backend enum ──────────────────────────────────────────────────────────────

/// All available worksheet-grid engines.
#[derive(Debug, Clone)]
pub enum LedgerBackend {
    /// In-process grid — tests and local runs.
    Memory(memory::MemoryBackend),
    /// Google Sheets v4 REST.
    Sheets(sheets::SheetsBackend),
}

impl LedgerBackend {
    pub async fn worksheet_exists(&self, title: &str) -> Result<bool, LedgerError> {
        match self {
            LedgerBackend::Memory(b) => b.worksheet_exists(title).await,
            LedgerBackend::Sheets(b) => b.worksheet_exists(title).await,
        }
    }

    pub async fn add_worksheet(&self, title: &str, rows: u32, cols: u32) -> Result<(), LedgerError> {
        match self {
            LedgerBackend::Memory(b) => b.add_worksheet(title, rows, cols).await,
            LedgerBackend::Sheets(b) => b.add_worksheet(title, rows, cols).await,
        }
    }

    /// Read one cell's displayed value; empty string for an unset cell.
    /// Formula cells yield their computed value.
    pub async fn read_cell(&self, title: &str, row: u32, col: u32) -> Result<String, LedgerError> {
        match self {
            LedgerBackend::Memory(b) => b.read_cell(title, row, col).await,
            LedgerBackend::Sheets(b) => b.read_cell(title, row, col).await,
        }
    }

    pub async fn update_cell(
        &self,
        title: &str,
        row: u32,
        col: u32,
        value: &str,
    ) -> Result<(), LedgerError> {
        match self {
            LedgerBackend::Memory(b) => b.update_cell(title, row, col, value).await,
            LedgerBackend::Sheets(b) => b.update_cell(title, row, col, value).await,
        }
    }

    /// All values of one column from row 1 through the last occupied row,
    /// with empty strings for gaps.
    pub async fn col_values(&self, title: &str, col: u32) -> Result<Vec<String>, LedgerError> {
        match self {
            LedgerBackend::Memory(b) => b.col_values(title, col).await,
            LedgerBackend::Sheets(b) => b.col_values(title, col).await,
        }
    }

    /// Render one worksheet as a portable document.
    pub async fn export(&self, title: &str) -> Result<Vec<u8>, LedgerError> {
        match self {
            LedgerBackend::Memory(b) => b.export(title).await,
            LedgerBackend::Sheets(b) => b.export(title).await,
        }
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Construct a `LedgerBackend` from config and an optional API token.
///
/// `api_token` is sourced from `SHEETS_API_TOKEN` env (never TOML) and is
/// required only by the `sheets` backend.
pub fn build(cfg: &LedgerConfig, api_token: Option<String>) -> Result<LedgerBackend, AppError> {
    match cfg.backend.as_str() {
        "memory" => Ok(LedgerBackend::Memory(memory::MemoryBackend::new())),
        "sheets" => {
            if cfg.spreadsheet_id.is_empty() {
                return Err(AppError::Config(
                    "sheets backend requires ledger.spreadsheet_id".into(),
                ));
            }
            let token = api_token.ok_or_else(|| {
                AppError::Config("sheets backend requires SHEETS_API_TOKEN".into())
            })?;
            let b = sheets::SheetsBackend::new(cfg.spreadsheet_id.clone(), token, cfg.timeout_seconds)
                .map_err(|e| AppError::Config(format!("sheets backend: {e}")))?;
            Ok(LedgerBackend::Sheets(b))
        }
        other => Err(AppError::Config(format!("unknown ledger backend: '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn build_memory_backend() {
        let cfg = Config::test_default().ledger;
        assert!(matches!(build(&cfg, None), Ok(LedgerBackend::Memory(_))));
    }

    #[test]
    fn build_sheets_requires_spreadsheet_id() {
        let mut cfg = Config::test_default().ledger;
        cfg.backend = "sheets".into();
        let err = build(&cfg, Some("tok".into())).unwrap_err();
        assert!(err.to_string().contains("spreadsheet_id"));
    }

    #[test]
    fn build_sheets_requires_token() {
        let mut cfg = Config::test_default().ledger;
        cfg.backend = "sheets".into();
        cfg.spreadsheet_id = "abc123".into();
        let err = build(&cfg, None).unwrap_err();
        assert!(err.to_string().contains("SHEETS_API_TOKEN"));
    }

    #[test]
    fn build_sheets_with_id_and_token() {
        let mut cfg = Config::test_default().ledger;
        cfg.backend = "sheets".into();
        cfg.spreadsheet_id = "abc123".into();
        assert!(matches!(
            build(&cfg, Some("tok".into())),
            Ok(LedgerBackend::Sheets(_))
        ));
    }

    #[test]
    fn build_unknown_backend_errors() {
        let mut cfg = Config::test_default().ledger;
        cfg.backend = "postgres".into();
        let err = build(&cfg, None).unwrap_err();
        assert!(err.to_string().contains("unknown ledger backend"));
    }
}
