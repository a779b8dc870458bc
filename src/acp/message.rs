//! JSON-RPC 2.0 envelopes for the ACP stdio transport.
//!
//! The wire format does not tag which kind of envelope a line carries, so
//! [`decode_inbound`] classifies each payload by the fields it contains:
//!
//! | Fields present                      | Variant                      |
//! |-------------------------------------|------------------------------|
//! | `id` + (`result` or `error`)        | [`Inbound::Response`]        |
//! | `method`, no `id`                   | [`Inbound::Notification`]    |
//! | `method` + `id`                     | [`Inbound::Request`]         |
//! | *(anything else)*                   | [`AppError::Decode`]         |
//!
//! Parameters and results are carried as [`serde_json::Value`] so methods
//! with unrelated payload shapes (and free-form `_meta` maps) share one
//! envelope type.

use std::fmt::{Display, Formatter};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AppError, Result};

/// Protocol version string carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation identifier of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id; the client always generates these.
    Number(i64),
    /// String id; some agents use these for their own requests.
    Str(String),
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Request envelope: expects a [`Response`] with the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id.
    pub id: RequestId,
    /// Method name, e.g. `session/new`.
    pub method: String,
    /// Method parameters.
    pub params: Option<Value>,
}

/// Response envelope: exactly one of result or error.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request being answered.
    pub id: RequestId,
    /// `Ok(result)` or `Err(error)`.
    pub outcome: std::result::Result<Value, JsonRpcError>,
}

/// One-way notification envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Method name, e.g. `session/update`.
    pub method: String,
    /// Method parameters.
    pub params: Option<Value>,
}

/// A decoded inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Answer to one of our requests.
    Response(Response),
    /// Server-pushed notification.
    Notification(Notification),
    /// Agent-initiated request that must be answered.
    Request(Request),
}

// ── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WireRequest<'a> {
    jsonrpc: &'static str,
    id: &'a RequestId,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

#[derive(Serialize)]
struct WireNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

#[derive(Serialize)]
struct WireResponse<'a> {
    jsonrpc: &'static str,
    id: &'a RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a JsonRpcError>,
}

impl Request {
    /// Encode as one newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if serialisation fails.
    pub fn encode_line(&self) -> Result<Vec<u8>> {
        encode_line(&WireRequest {
            jsonrpc: JSONRPC_VERSION,
            id: &self.id,
            method: &self.method,
            params: self.params.as_ref(),
        })
    }
}

impl Notification {
    /// Encode as one newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if serialisation fails.
    pub fn encode_line(&self) -> Result<Vec<u8>> {
        encode_line(&WireNotification {
            jsonrpc: JSONRPC_VERSION,
            method: &self.method,
            params: self.params.as_ref(),
        })
    }

    /// Decode the params into a typed payload.
    ///
    /// Missing params decode as JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Decode`] if the params do not match `T`.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T> {
        from_value(self.params.clone().unwrap_or(Value::Null))
    }
}

impl Response {
    /// Successful response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Error response.
    #[must_use]
    pub fn failure(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }

    /// Encode as one newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if serialisation fails.
    pub fn encode_line(&self) -> Result<Vec<u8>> {
        let (result, error) = match &self.outcome {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err)),
        };
        encode_line(&WireResponse {
            jsonrpc: JSONRPC_VERSION,
            id: &self.id,
            result,
            error,
        })
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Serialise `value` compactly and append the `\n` terminator.
///
/// `serde_json` leaves `/` unescaped and escapes control characters inside
/// strings, so the only 0x0A byte in the output is the terminator.
///
/// # Errors
///
/// Returns [`AppError::Acp`] if serialisation fails or the payload would
/// contain an embedded newline.
pub fn encode_line<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)
        .map_err(|e| AppError::Acp(format!("failed to serialise outbound message: {e}")))?;
    if bytes.contains(&b'\n') {
        return Err(AppError::Acp(
            "outbound message contains an embedded newline".into(),
        ));
    }
    bytes.push(b'\n');
    Ok(bytes)
}

/// Classify and decode one inbound line.
///
/// # Errors
///
/// Returns [`AppError::Decode`] for invalid JSON, non-object payloads, and
/// objects that match none of the three envelope shapes.
pub fn decode_inbound(raw: &[u8]) -> Result<Inbound> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| AppError::Decode(format!("malformed json: {e}")))?;
    let Value::Object(mut map) = value else {
        return Err(AppError::Decode("envelope is not a json object".into()));
    };

    let id = take_id(&mut map)?;
    let method = match map.remove("method") {
        None | Some(Value::Null) => None,
        Some(Value::String(m)) => Some(m),
        Some(other) => {
            return Err(AppError::Decode(format!("method is not a string: {other}")));
        }
    };

    if let Some(id) = id.clone() {
        if map.contains_key("result") || map.contains_key("error") {
            return decode_response(id, map).map(Inbound::Response);
        }
    }

    match (method, id) {
        (Some(method), None) => Ok(Inbound::Notification(Notification {
            method,
            params: map.remove("params"),
        })),
        (Some(method), Some(id)) => Ok(Inbound::Request(Request {
            id,
            method,
            params: map.remove("params"),
        })),
        (None, _) => Err(AppError::Decode(
            "envelope has neither method nor result/error".into(),
        )),
    }
}

/// Best-effort method name of a raw payload, for debug tagging.
#[must_use]
pub fn detect_method(raw: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct MethodOnly {
        method: Option<String>,
    }
    serde_json::from_slice::<MethodOnly>(raw)
        .ok()
        .and_then(|m| m.method)
}

/// Serialise a typed payload into a dynamic JSON value.
///
/// # Errors
///
/// Returns [`AppError::Acp`] if serialisation fails.
pub fn to_value<T: Serialize>(payload: &T) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|e| AppError::Acp(format!("failed to serialise params: {e}")))
}

/// Deserialise a dynamic JSON value into a typed payload.
///
/// # Errors
///
/// Returns [`AppError::Decode`] if the value does not match `T`.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| AppError::Decode(e.to_string()))
}

// ── Private helpers ──────────────────────────────────────────────────────────

fn take_id(map: &mut Map<String, Value>) -> Result<Option<RequestId>> {
    match map.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value(raw)
            .map(Some)
            .map_err(|e| AppError::Decode(format!("invalid id: {e}"))),
    }
}

fn decode_response(id: RequestId, mut map: Map<String, Value>) -> Result<Response> {
    match (map.remove("result"), map.remove("error")) {
        (result, Some(err)) if !err.is_null() => {
            // A null result next to a real error is still an error response.
            if result.as_ref().is_some_and(|r| !r.is_null()) {
                return Err(AppError::Decode(
                    "response carries both result and error".into(),
                ));
            }
            let error: JsonRpcError = serde_json::from_value(err)
                .map_err(|e| AppError::Decode(format!("invalid error object: {e}")))?;
            Ok(Response::failure(id, error))
        }
        (Some(result), _) => Ok(Response::success(id, result)),
        (None, _) => Err(AppError::Decode("response without result or error".into())),
    }
}
