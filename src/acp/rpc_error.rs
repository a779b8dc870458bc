//! JSON-RPC error envelopes returned for agent-initiated requests.

use serde_json::{json, Value};

use crate::acp::message::{JsonRpcError, RequestId, Response};

/// The method does not exist or is not served by this client.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// The params did not match the method's schema.
pub const INVALID_PARAMS: i64 = -32602;
/// The delegate failed while handling the request.
pub const INTERNAL_ERROR: i64 = -32603;

/// `-32601` for `method`.
#[must_use]
pub fn method_not_found(method: &str) -> JsonRpcError {
    JsonRpcError {
        code: METHOD_NOT_FOUND,
        message: format!("Method not found: {method}"),
        data: Some(json!({ "method": method })),
    }
}

/// `-32602` with the decoder's explanation.
#[must_use]
pub fn invalid_params(detail: impl Into<String>) -> JsonRpcError {
    JsonRpcError {
        code: INVALID_PARAMS,
        message: format!("Invalid params: {}", detail.into()),
        data: None,
    }
}

/// `-32603` carrying the underlying error's description as the message.
#[must_use]
pub fn internal_error(err: &impl std::fmt::Display) -> JsonRpcError {
    JsonRpcError {
        code: INTERNAL_ERROR,
        message: err.to_string(),
        data: None,
    }
}

/// Wrap a router outcome into the response for request `id`.
#[must_use]
pub fn into_response(id: RequestId, outcome: Result<Value, JsonRpcError>) -> Response {
    match outcome {
        Ok(result) => Response::success(id, result),
        Err(error) => Response::failure(id, error),
    }
}
