//! In-process stand-in for the spreadsheet values API.

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use telecaller_dashboard::config::SheetsConfig;

pub const SPREADSHEET_ID: &str = "sheet-under-test";

/// Worksheets by title, each a grid of rows with the header first
#[derive(Default)]
pub struct MockSheets {
    pub sheets: BTreeMap<String, Vec<Vec<String>>>,
    pub requests: usize,

    /// Answer every request with 503
    pub offline: bool,

    /// Answer every request with this status instead
    pub reject_with: Option<StatusCode>,
}

pub type Shared = Arc<Mutex<MockSheets>>;

#[derive(Deserialize)]
struct ValuesBody {
    values: Vec<Vec<String>>,
}

/// Split `'Sheet'!A7` into the sheet title and 1-based row
fn parse_range(range: &str) -> (String, Option<usize>) {
    let range = range.trim_end_matches(":append");
    let (sheet, cell) = match range.split_once('!') {
        Some((sheet, cell)) => (sheet, Some(cell)),
        None => (range, None),
    };
    let row = cell.and_then(|c| c.trim_start_matches('A').parse().ok());
    (sheet.trim_matches('\'').to_string(), row)
}

fn missing_sheet() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": { "code": 400, "message": "Unable to parse range" } })),
    )
        .into_response()
}

/// Count the request; `Some` short-circuits when offline or rejecting
fn admit(mock: &mut MockSheets) -> Option<Response> {
    mock.requests += 1;
    mock.reject_with
        .or(mock.offline.then_some(StatusCode::SERVICE_UNAVAILABLE))
        .map(|status| (status, Json(json!({ "error": { "code": status.as_u16() } }))).into_response())
}

async fn get_values(State(state): State<Shared>, Path((_id, range)): Path<(String, String)>) -> Response {
    let mut mock = state.lock().unwrap();
    if let Some(rejected) = admit(&mut mock) {
        return rejected;
    }
    let (sheet, _) = parse_range(&range);
    match mock.sheets.get(&sheet) {
        // The API leaves out `values` for an empty range
        Some(rows) if rows.is_empty() => Json(json!({ "range": range })).into_response(),
        Some(rows) => {
            Json(json!({ "range": range, "majorDimension": "ROWS", "values": rows })).into_response()
        }
        None => missing_sheet(),
    }
}

async fn put_values(
    State(state): State<Shared>,
    Path((_id, range)): Path<(String, String)>,
    Json(body): Json<ValuesBody>,
) -> Response {
    let mut mock = state.lock().unwrap();
    if let Some(rejected) = admit(&mut mock) {
        return rejected;
    }
    let (sheet, row) = parse_range(&range);
    let Some(rows) = mock.sheets.get_mut(&sheet) else {
        return missing_sheet();
    };
    let start = row.unwrap_or(1) - 1;
    for (offset, cells) in body.values.into_iter().enumerate() {
        let at = start + offset;
        while rows.len() <= at {
            rows.push(Vec::new());
        }
        rows[at] = cells;
    }
    Json(json!({ "updatedRange": range })).into_response()
}

async fn append_values(
    State(state): State<Shared>,
    Path((_id, range)): Path<(String, String)>,
    Json(body): Json<ValuesBody>,
) -> Response {
    let mut mock = state.lock().unwrap();
    if let Some(rejected) = admit(&mut mock) {
        return rejected;
    }
    if !range.ends_with(":append") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let (sheet, _) = parse_range(&range);
    let Some(rows) = mock.sheets.get_mut(&sheet) else {
        return missing_sheet();
    };
    rows.extend(body.values);
    Json(json!({ "updates": { "updatedRows": 1 } })).into_response()
}

async fn batch_update(
    State(state): State<Shared>,
    Path(target): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut mock = state.lock().unwrap();
    if let Some(rejected) = admit(&mut mock) {
        return rejected;
    }
    if !target.ends_with(":batchUpdate") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let requests = body["requests"].as_array().cloned().unwrap_or_default();
    for request in requests {
        if let Some(title) = request["addSheet"]["properties"]["title"].as_str() {
            mock.sheets.entry(title.to_string()).or_default();
        }
    }
    Json(json!({ "spreadsheetId": SPREADSHEET_ID })).into_response()
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/v4/spreadsheets/:id", post(batch_update))
        .route(
            "/v4/spreadsheets/:id/values/:range",
            get(get_values).put(put_values).post(append_values),
        )
        .with_state(state)
}

/// Serve the mock on an ephemeral port
///
/// The runtime must be kept alive for as long as the server is needed.
pub fn start_mock(state: Shared) -> (tokio::runtime::Runtime, String) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let addr = rt.block_on(async {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
        addr
    });
    (rt, format!("http://{}", addr))
}

pub fn sheets_config(base: &str) -> SheetsConfig {
    SheetsConfig {
        spreadsheet_id: SPREADSHEET_ID.to_string(),
        access_token: "test-token".to_string(),
        api_base: base.to_string(),
        timeout: Duration::from_secs(5),
    }
}

pub fn requests(state: &Shared) -> usize {
    state.lock().unwrap().requests
}
