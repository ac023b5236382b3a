//! Response envelope encoding.
//!
//! Every structured response is `{"status":<int>,"data":...}`. The codec only
//! formats; it never interprets `data`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::value::RawValue;

use common::types::{Envelope, RawEnvelope};

pub const OKAY: StatusCode = StatusCode::OK;
pub const BAD_REQUEST: StatusCode = StatusCode::BAD_REQUEST;
pub const INTERNAL_SERVER: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;

pub const SUCCESS: &str = "success";
pub const FOUND: &str = "found";
pub const NOT_FOUND: &str = "not found";
pub const MISSING_PARAMS: &str = "Json data not detected";
pub const SERVER_ERROR: &str = "server error";

/// Encode `payload` as an escaped JSON string under `data`.
pub fn encode(status: StatusCode, payload: &str) -> String {
    let envelope = Envelope { status: status.as_u16(), data: payload };
    serde_json::to_string(&envelope).unwrap_or_default()
}

/// Embed `json` under `data` without re-escaping it.
///
/// Falls back to [`encode`] when `json` is not valid JSON, so the body is
/// always well formed.
pub fn encode_raw(status: StatusCode, json: &str) -> String {
    match RawValue::from_string(json.to_owned()) {
        Ok(raw) => {
            let envelope = RawEnvelope { status: status.as_u16(), data: &*raw };
            serde_json::to_string(&envelope).unwrap_or_default()
        }
        Err(_) => encode(status, json),
    }
}

/// Envelope response; the HTTP status mirrors the envelope status.
pub fn envelope(status: StatusCode, payload: &str) -> Response {
    json_body(status, encode(status, payload))
}

/// Raw value bytes for a fetch hit.
pub fn plain_text(value: Vec<u8>) -> Response {
    (
        OKAY,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        value,
    )
        .into_response()
}

fn json_body(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response()
}
