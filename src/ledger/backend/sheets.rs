//! Google Sheets v4 REST backend.
//!
//! Exposes the same dumb cell-grid surface as the memory backend; all wire
//! types are private to this module. One worksheet per month partition,
//! addressed by A1 notation; the per-worksheet PDF render goes through the
//! document export endpoint with the worksheet's numeric grid id.
//!
//! Auth is a bearer token from `SHEETS_API_TOKEN`. Token minting/refresh is
//! an operational concern outside this process.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::ledger::LedgerError;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const EXPORT_BASE: &str = "https://docs.google.com/spreadsheets/d";

// ── Public backend ────────────────────────────────────────────────────────────

/// Adapter for one spreadsheet document on the Sheets v4 API.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct SheetsBackend {
    client: Client,
    spreadsheet_id: String,
    token: String,
}

impl SheetsBackend {
    pub fn new(spreadsheet_id: String, token: String, timeout_seconds: u64) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| LedgerError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, spreadsheet_id, token })
    }

    pub async fn worksheet_exists(&self, title: &str) -> Result<bool, LedgerError> {
        Ok(self.sheet_properties().await?.iter().any(|p| p.title == title))
    }

    pub async fn add_worksheet(&self, title: &str, rows: u32, cols: u32) -> Result<(), LedgerError> {
        let url = format!("{SHEETS_API_BASE}/{}:batchUpdate", self.spreadsheet_id);
        let payload = BatchUpdateRequest {
            requests: vec![UpdateRequest {
                add_sheet: AddSheet {
                    properties: NewSheetProperties {
                        title: title.to_string(),
                        grid_properties: GridProperties { row_count: rows, column_count: cols },
                    },
                },
            }],
        };

        debug!(%title, rows, cols, "adding worksheet");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(transport_err)?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn read_cell(&self, title: &str, row: u32, col: u32) -> Result<String, LedgerError> {
        let url = format!(
            "{SHEETS_API_BASE}/{}/values/{}",
            self.spreadsheet_id,
            a1(title, row, col)
        );
        let response = self
            .client
            .get(&url)
            .query(&[("valueRenderOption", "UNFORMATTED_VALUE")])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_err)?;
        let response = check_status(response).await?;

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| LedgerError::Backend(format!("malformed values response: {e}")))?;
        Ok(range
            .values
            .and_then(|rows| rows.into_iter().next())
            .and_then(|cells| cells.into_iter().next())
            .map(|v| cell_to_string(&v))
            .unwrap_or_default())
    }

    pub async fn update_cell(
        &self,
        title: &str,
        row: u32,
        col: u32,
        value: &str,
    ) -> Result<(), LedgerError> {
        let range = a1(title, row, col);
        let url = format!("{SHEETS_API_BASE}/{}/values/{range}", self.spreadsheet_id);
        let payload = ValueRangeUpdate {
            range: range.clone(),
            values: vec![vec![value.to_string()]],
        };

        // USER_ENTERED so the `=SUM(...)` total formula lands as a formula.
        let response = self
            .client
            .put(&url)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(transport_err)?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn col_values(&self, title: &str, col: u32) -> Result<Vec<String>, LedgerError> {
        let letter = col_letter(col);
        let url = format!(
            "{SHEETS_API_BASE}/{}/values/'{title}'!{letter}:{letter}",
            self.spreadsheet_id
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("majorDimension", "COLUMNS"),
                ("valueRenderOption", "UNFORMATTED_VALUE"),
            ])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_err)?;
        let response = check_status(response).await?;

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| LedgerError::Backend(format!("malformed values response: {e}")))?;
        Ok(range
            .values
            .and_then(|cols| cols.into_iter().next())
            .map(|cells| cells.iter().map(cell_to_string).collect())
            .unwrap_or_default())
    }

    pub async fn export(&self, title: &str) -> Result<Vec<u8>, LedgerError> {
        let gid = self
            .sheet_properties()
            .await?
            .into_iter()
            .find(|p| p.title == title)
            .map(|p| p.sheet_id)
            .ok_or_else(|| LedgerError::Backend(format!("worksheet '{title}' not found")))?;

        let url = format!("{EXPORT_BASE}/{}/export", self.spreadsheet_id);
        debug!(%title, gid, "exporting worksheet as pdf");
        let gid = gid.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("format", "pdf"), ("gid", gid.as_str())])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_err)?;
        let response = check_status(response).await?;

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| LedgerError::Backend(format!("failed to read export body: {e}")))
    }

    /// Title + grid id of every worksheet in the document.
    async fn sheet_properties(&self) -> Result<Vec<SheetProperties>, LedgerError> {
        let url = format!("{SHEETS_API_BASE}/{}", self.spreadsheet_id);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "sheets.properties")])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_err)?;
        let response = check_status(response).await?;

        let doc: SpreadsheetMeta = response
            .json()
            .await
            .map_err(|e| LedgerError::Backend(format!("malformed metadata response: {e}")))?;
        Ok(doc.sheets.into_iter().map(|s| s.properties).collect())
    }
}

// ── A1 addressing ─────────────────────────────────────────────────────────────

/// Column number (1-based) to letters: 1 -> A, 26 -> Z, 27 -> AA.
fn col_letter(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Single-cell A1 range. The title is always quoted — month labels contain
/// spaces.
fn a1(title: &str, row: u32, col: u32) -> String {
    format!("'{title}'!{}{row}", col_letter(col))
}

/// UNFORMATTED_VALUE cells arrive as JSON strings, numbers or bools.
fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        },
        serde_json::Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Serialize)]
struct BatchUpdateRequest {
    requests: Vec<UpdateRequest>,
}

#[derive(Debug, Serialize)]
struct UpdateRequest {
    #[serde(rename = "addSheet")]
    add_sheet: AddSheet,
}

#[derive(Debug, Serialize)]
struct AddSheet {
    properties: NewSheetProperties,
}

#[derive(Debug, Serialize)]
struct NewSheetProperties {
    title: String,
    #[serde(rename = "gridProperties")]
    grid_properties: GridProperties,
}

#[derive(Debug, Serialize)]
struct GridProperties {
    #[serde(rename = "rowCount")]
    row_count: u32,
    #[serde(rename = "columnCount")]
    column_count: u32,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Option<Vec<Vec<serde_json::Value>>>,
}

#[derive(Debug, Serialize)]
struct ValueRangeUpdate {
    range: String,
    values: Vec<Vec<String>>,
}

// Error envelope returned by Google APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn transport_err(e: reqwest::Error) -> LedgerError {
    error!(error = %e, "sheets HTTP request failed (transport)");
    LedgerError::Backend(format!("unreachable: {e}"))
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LedgerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let detail = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(env) => {
            let api_status = env.error.status.map(|s| format!(" [{s}]")).unwrap_or_default();
            format!("HTTP {status}{api_status}: {}", env.error.message)
        }
        Err(_) => format!("HTTP {status}: {body}"),
    };

    let message = if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
    {
        format!("unauthorized: {detail}")
    } else {
        detail
    };

    error!(%status, %message, "sheets request returned HTTP error");
    Err(LedgerError::Backend(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn col_letters() {
        assert_eq!(col_letter(1), "A");
        assert_eq!(col_letter(2), "B");
        assert_eq!(col_letter(7), "G");
        assert_eq!(col_letter(26), "Z");
        assert_eq!(col_letter(27), "AA");
        assert_eq!(col_letter(52), "AZ");
    }

    #[test]
    fn a1_quotes_title() {
        assert_eq!(a1("August 2026", 3, 7), "'August 2026'!G3");
        assert_eq!(a1("August 2026", 2, 1), "'August 2026'!A2");
    }

    #[test]
    fn unformatted_cells_stringify() {
        use serde_json::json;
        assert_eq!(cell_to_string(&json!("hello")), "hello");
        assert_eq!(cell_to_string(&json!(120)), "120");
        assert_eq!(cell_to_string(&json!(1.5)), "1.5");
        assert_eq!(cell_to_string(&json!(true)), "TRUE");
        assert_eq!(cell_to_string(&json!(null)), "");
    }

    #[test]
    fn error_envelope_parses() {
        let body = r#"{"error":{"code":403,"message":"The caller does not have permission","status":"PERMISSION_DENIED"}}"#;
        let env: ErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(env.error.message, "The caller does not have permission");
        assert_eq!(env.error.status.as_deref(), Some("PERMISSION_DENIED"));
    }

    #[test]
    fn add_sheet_payload_shape() {
        let payload = BatchUpdateRequest {
            requests: vec![UpdateRequest {
                add_sheet: AddSheet {
                    properties: NewSheetProperties {
                        title: "August 2026".into(),
                        grid_properties: GridProperties { row_count: 1000, column_count: 20 },
                    },
                },
            }],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json["requests"][0]["addSheet"]["properties"]["title"],
            "August 2026"
        );
        assert_eq!(
            json["requests"][0]["addSheet"]["properties"]["gridProperties"]["rowCount"],
            1000
        );
    }
}
