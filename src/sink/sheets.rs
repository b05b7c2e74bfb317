use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, TrackerError};
use crate::report::{Report, COLUMNS, STATUS_COLUMN};
use crate::sink::ReportSink;

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(250);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MIN_COLUMN_PX: usize = 80;
const MAX_COLUMN_PX: usize = 400;

/// Publishes the report as a tab of a Google spreadsheet, replacing any
/// tab with the same name (delete then recreate). Credentials are read
/// lazily so a bad credential file fails this sink alone.
pub struct GoogleSheetsSink {
    spreadsheet_id: String,
    credentials_file: PathBuf,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

impl GoogleSheetsSink {
    pub fn new<P: Into<PathBuf>>(sheet_ref: &str, credentials_file: P) -> Result<Self> {
        Ok(Self {
            spreadsheet_id: spreadsheet_id_from(sheet_ref)?,
            credentials_file: credentials_file.into(),
        })
    }

    fn publish(&self, report: &Report) -> Result<()> {
        let token = load_access_token(&self.credentials_file)?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TrackerError::SinkWrite(format!("failed to build HTTP client: {e}")))?;

        let meta = self.fetch_metadata(&client, &token)?;
        let stale_id = meta
            .sheets
            .iter()
            .find(|s| s.properties.title == report.sheet_name)
            .map(|s| s.properties.sheet_id);

        let sheet_id = self.recreate_tab(&client, &token, &report.sheet_name, stale_id)?;
        self.write_values(&client, &token, report)?;
        self.apply_formatting(&client, &token, sheet_id, report)?;

        println!(
            "Google Sheet updated: {}, sheet {}",
            self.spreadsheet_id, report.sheet_name
        );
        Ok(())
    }

    fn fetch_metadata(&self, client: &Client, token: &str) -> Result<SpreadsheetMeta> {
        let url = format!("{API_BASE}/{}?fields=sheets.properties", self.spreadsheet_id);
        let response = send_with_retry(client.get(url).bearer_auth(token))?;
        let response = check_status(response, "fetching spreadsheet metadata")?;
        response
            .json()
            .map_err(|e| TrackerError::SinkWrite(format!("invalid metadata response: {e}")))
    }

    /// Deletes the stale tab (if any) and adds a fresh one, in a single
    /// batch so a same-day rerun never leaves duplicates behind.
    fn recreate_tab(
        &self,
        client: &Client,
        token: &str,
        title: &str,
        stale_id: Option<i64>,
    ) -> Result<i64> {
        let mut requests = Vec::new();
        if let Some(sheet_id) = stale_id {
            tracing::info!(sheet = title, "replacing existing report tab");
            requests.push(json!({ "deleteSheet": { "sheetId": sheet_id } }));
        }
        requests.push(json!({ "addSheet": { "properties": { "title": title } } }));

        let url = format!("{API_BASE}/{}:batchUpdate", self.spreadsheet_id);
        let response = send_with_retry(
            client
                .post(url)
                .bearer_auth(token)
                .json(&json!({ "requests": requests })),
        )?;
        let response = check_status(response, "recreating the report tab")?;
        let body: Value = response
            .json()
            .map_err(|e| TrackerError::SinkWrite(format!("invalid batchUpdate response: {e}")))?;
        added_sheet_id(&body)
            .ok_or_else(|| TrackerError::SinkWrite("missing sheetId in addSheet reply".to_string()))
    }

    fn write_values(&self, client: &Client, token: &str, report: &Report) -> Result<()> {
        let range = format!("{}!A1", report.sheet_name);
        let url = format!(
            "{API_BASE}/{}/values/{range}?valueInputOption=USER_ENTERED",
            self.spreadsheet_id
        );
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": report_values(report),
        });
        let response = send_with_retry(client.put(url).bearer_auth(token).json(&body))?;
        check_status(response, "writing report values")?;
        Ok(())
    }

    fn apply_formatting(
        &self,
        client: &Client,
        token: &str,
        sheet_id: i64,
        report: &Report,
    ) -> Result<()> {
        let requests = format_requests(sheet_id, report);
        if requests.is_empty() {
            return Ok(());
        }
        let url = format!("{API_BASE}/{}:batchUpdate", self.spreadsheet_id);
        let response = send_with_retry(
            client
                .post(url)
                .bearer_auth(token)
                .json(&json!({ "requests": requests })),
        )?;
        check_status(response, "formatting the report tab")?;
        Ok(())
    }
}

impl ReportSink for GoogleSheetsSink {
    fn name(&self) -> &'static str {
        "google sheets"
    }

    fn write(&self, report: &Report) -> Result<()> {
        self.publish(report)
    }
}

/// Accepts a full spreadsheet URL or a bare id. Checked at
/// configuration time so a bad destination fails the run up front.
pub(crate) fn spreadsheet_id_from(sheet_ref: &str) -> Result<String> {
    if let Some(rest) = sheet_ref.split_once("/d/").map(|(_, rest)| rest) {
        let id = rest.split('/').next().unwrap_or_default();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    } else if !sheet_ref.contains('/') && !sheet_ref.is_empty() {
        return Ok(sheet_ref.to_string());
    }
    Err(TrackerError::Configuration(format!(
        "could not extract a spreadsheet id from '{sheet_ref}'"
    )))
}

fn load_access_token(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).map_err(|e| {
        TrackerError::SinkAuthentication(format!(
            "failed to read credentials {}: {e}",
            path.display()
        ))
    })?;
    let creds: Value = serde_json::from_str(&raw).map_err(|e| {
        TrackerError::SinkAuthentication(format!(
            "invalid credentials {}: {e}",
            path.display()
        ))
    })?;
    creds
        .get("access_token")
        .or_else(|| creds.get("token"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            TrackerError::SinkAuthentication(format!(
                "credentials {} contain no access_token",
                path.display()
            ))
        })
}

fn added_sheet_id(body: &Value) -> Option<i64> {
    body.get("replies")?
        .as_array()?
        .iter()
        .find_map(|reply| reply.get("addSheet"))?
        .get("properties")?
        .get("sheetId")?
        .as_i64()
}

fn report_values(report: &Report) -> Vec<Vec<Value>> {
    let mut values = Vec::with_capacity(report.rows.len() + 1);
    values.push(COLUMNS.iter().map(|h| json!(h)).collect());
    for row in &report.rows {
        values.push(vec![
            json!(row.contribution_type),
            json!(row.contributed),
            json!(row.status),
            json!(row.amount),
            json!(row.limit),
        ]);
    }
    values
}

/// Red fill on the Status cell of every exceeded row, plus per-column
/// pixel widths fitted to the longest cell text.
fn format_requests(sheet_id: i64, report: &Report) -> Vec<Value> {
    let mut requests = Vec::new();
    for (i, row) in report.rows.iter().enumerate() {
        if !row.exceeded {
            continue;
        }
        let grid_row = i + 1; // data starts below the header
        requests.push(json!({
            "repeatCell": {
                "range": {
                    "sheetId": sheet_id,
                    "startRowIndex": grid_row,
                    "endRowIndex": grid_row + 1,
                    "startColumnIndex": STATUS_COLUMN,
                    "endColumnIndex": STATUS_COLUMN + 1,
                },
                "cell": {
                    "userEnteredFormat": {
                        "backgroundColor": { "red": 1.0, "green": 0.8, "blue": 0.8 }
                    }
                },
                "fields": "userEnteredFormat.backgroundColor",
            }
        }));
    }
    for (c, width) in column_pixel_widths(report) {
        requests.push(json!({
            "updateDimensionProperties": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "COLUMNS",
                    "startIndex": c,
                    "endIndex": c + 1,
                },
                "properties": { "pixelSize": width },
                "fields": "pixelSize",
            }
        }));
    }
    requests
}

fn column_pixel_widths(report: &Report) -> Vec<(usize, usize)> {
    COLUMNS
        .iter()
        .enumerate()
        .map(|(c, header)| {
            let mut max_len = header.len();
            for row in &report.rows {
                let text = match c {
                    0 => row.contribution_type.to_string(),
                    1 => row.contributed.to_string(),
                    2 => row.status.to_string(),
                    3 => row.amount.to_string(),
                    _ => row.limit.to_string(),
                };
                max_len = max_len.max(text.len());
            }
            (c, (max_len * 10).clamp(MIN_COLUMN_PX, MAX_COLUMN_PX))
        })
        .collect()
}

fn send_with_retry(request: RequestBuilder) -> Result<Response> {
    let mut last_err = String::new();
    for attempt in 1..=MAX_ATTEMPTS {
        let Some(request) = request.try_clone() else {
            break;
        };
        match request.send() {
            Ok(response)
                if response.status().is_server_error()
                    || response.status() == StatusCode::TOO_MANY_REQUESTS =>
            {
                last_err = format!("HTTP {}", response.status());
            }
            Ok(response) => return Ok(response),
            Err(e) => last_err = e.to_string(),
        }
        if attempt < MAX_ATTEMPTS {
            tracing::debug!(attempt, error = %last_err, "retrying spreadsheet request");
            thread::sleep(RETRY_BASE * attempt);
        }
    }
    Err(TrackerError::SinkWrite(format!(
        "request failed after {MAX_ATTEMPTS} attempts: {last_err}"
    )))
}

fn check_status(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(TrackerError::SinkAuthentication(format!(
            "{context}: HTTP {status}: {detail}"
        )));
    }
    Err(TrackerError::SinkWrite(format!(
        "{context}: HTTP {status}: {detail}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::{evaluate_all, ContributionInput};
    use crate::limits::LimitTable;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn sample_report(hsa: rust_decimal::Decimal) -> Report {
        let input = ContributionInput::new(2024, hsa, dec!(20000), false).unwrap();
        let statuses = evaluate_all(&input, &LimitTable::builtin()).unwrap();
        Report::new(2024, &statuses, date!(2024 - 06 - 01)).unwrap()
    }

    #[test]
    fn spreadsheet_id_extracted_from_url() {
        let url = "https://docs.google.com/spreadsheets/d/1AbC_dEf-123/edit#gid=0";
        assert_eq!(spreadsheet_id_from(url).unwrap(), "1AbC_dEf-123");
        assert_eq!(spreadsheet_id_from("1AbC_dEf-123").unwrap(), "1AbC_dEf-123");
        assert!(spreadsheet_id_from("https://docs.google.com/spreadsheets/d//edit").is_err());
        assert!(spreadsheet_id_from("").is_err());
    }

    #[test]
    fn values_payload_has_header_then_rows() {
        let values = report_values(&sample_report(dec!(5000)));
        assert_eq!(values.len(), 3);
        assert_eq!(values[0][0], json!("Contribution Type"));
        assert_eq!(values[1][0], json!("HSA Individual"));
        assert_eq!(values[1][2], json!("Exceeded Contribution"));
        assert_eq!(values[2][0], json!("401(k) Individual"));
    }

    #[test]
    fn exceeded_rows_get_a_repeat_cell_request() {
        let requests = format_requests(7, &sample_report(dec!(5000)));
        let repeat: Vec<&Value> = requests
            .iter()
            .filter(|r| r.get("repeatCell").is_some())
            .collect();
        assert_eq!(repeat.len(), 1);
        let range = &repeat[0]["repeatCell"]["range"];
        assert_eq!(range["sheetId"], json!(7));
        assert_eq!(range["startRowIndex"], json!(1));
        assert_eq!(range["startColumnIndex"], json!(STATUS_COLUMN));
    }

    #[test]
    fn no_highlight_requests_when_nothing_exceeded() {
        let requests = format_requests(7, &sample_report(dec!(1000)));
        assert!(requests.iter().all(|r| r.get("repeatCell").is_none()));
        // column sizing still applies
        assert_eq!(requests.len(), COLUMNS.len());
    }

    #[test]
    fn column_widths_are_clamped_to_pixel_bounds() {
        let widths = column_pixel_widths(&sample_report(dec!(1000)));
        assert_eq!(widths.len(), COLUMNS.len());
        for (_, w) in widths {
            assert!((MIN_COLUMN_PX..=MAX_COLUMN_PX).contains(&w));
        }
    }

    #[test]
    fn added_sheet_id_parsed_from_batch_reply() {
        let body = json!({
            "replies": [
                {},
                { "addSheet": { "properties": { "sheetId": 42, "title": "t" } } }
            ]
        });
        assert_eq!(added_sheet_id(&body), Some(42));
        assert_eq!(added_sheet_id(&json!({ "replies": [] })), None);
    }

    #[test]
    fn missing_credentials_fail_authentication_only() {
        let err = load_access_token(Path::new("/nonexistent/creds.json")).unwrap_err();
        assert!(matches!(err, TrackerError::SinkAuthentication(_)));
    }
}
