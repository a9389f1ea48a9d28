//! JSON-RPC 2.0 envelope types shared by every transport.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// JSON-RPC version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC version marker, serializes/deserializes as the literal `"2.0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// Request identifier — a string or a number, unique per originator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier.
    String(String),
    /// Numeric identifier.
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// A JSON-RPC request — carries `method`, optional `params`, and an `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: RequestId,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// A JSON-RPC notification — carries `method` and optional `params`, no `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn parse_error(details: impl fmt::Display) -> Self {
        Self::new(-32700, format!("Parse error: {details}"))
    }

    #[must_use]
    pub fn invalid_request(details: impl fmt::Display) -> Self {
        Self::new(-32600, format!("Invalid Request: {details}"))
    }

    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {method}"))
    }

    #[must_use]
    pub fn invalid_params(details: impl fmt::Display) -> Self {
        Self::new(-32602, format!("Invalid params: {details}"))
    }

    #[must_use]
    pub fn internal_error(details: impl fmt::Display) -> Self {
        Self::new(-32603, format!("Internal error: {details}"))
    }

    /// Not-initialized lifecycle violation.
    #[must_use]
    pub fn not_initialized() -> Self {
        Self::new(-32002, "Request received before initialization completed")
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Response id — `None` only for parse errors, which have no request to correlate with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    #[must_use]
    pub fn from_request(id: RequestId) -> Self {
        Self(Some(id))
    }

    #[must_use]
    pub fn null() -> Self {
        Self(None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    Success { result: Value },
    Error { error: JsonRpcError },
}

/// A JSON-RPC response — carries exactly one of `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: JsonRpcVersion,
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
    pub id: ResponseId,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Success { result },
            id: ResponseId::from_request(id),
        }
    }

    #[must_use]
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId::from_request(id),
        }
    }

    #[must_use]
    pub fn parse_error(error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId::null(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.payload, JsonRpcResponsePayload::Success { .. })
    }

    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            JsonRpcResponsePayload::Success { result } => Some(result),
            JsonRpcResponsePayload::Error { .. } => None,
        }
    }
}

/// An incoming, not-yet-classified JSON-RPC object.
///
/// The wire format doesn't tag requests/notifications/responses explicitly;
/// they're told apart by which fields are present (`method` vs `result`/
/// `error`). This is parsed once at the transport boundary into a
/// discriminated union so the dispatcher never needs runtime field probing.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl IncomingMessage {
    /// Parse a single JSON-RPC object, classifying it by shape.
    ///
    /// # Errors
    ///
    /// Returns a parse-error [`JsonRpcError`] if the text isn't valid JSON or
    /// doesn't look like any of the three message kinds.
    pub fn parse(raw: &str) -> Result<Self, JsonRpcError> {
        let value: Value = serde_json::from_str(raw).map_err(JsonRpcError::parse_error)?;
        Self::from_value(value)
    }

    /// Classify an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, JsonRpcError> {
        let has_method = value.get("method").is_some();
        let has_result_or_error = value.get("result").is_some() || value.get("error").is_some();

        if has_result_or_error && !has_method {
            let response: JsonRpcResponse =
                serde_json::from_value(value).map_err(JsonRpcError::invalid_request)?;
            return Ok(Self::Response(response));
        }

        if has_method {
            if value.get("id").is_some() {
                let request: JsonRpcRequest =
                    serde_json::from_value(value).map_err(JsonRpcError::invalid_request)?;
                return Ok(Self::Request(request));
            }
            let notification: JsonRpcNotification =
                serde_json::from_value(value).map_err(JsonRpcError::invalid_request)?;
            return Ok(Self::Notification(notification));
        }

        Err(JsonRpcError::invalid_request(
            "message has neither 'method' nor 'result'/'error'",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips() {
        let req = JsonRpcRequest::new("ping", None, 1i64);
        let text = serde_json::to_string(&req).unwrap();
        assert!(text.contains("\"jsonrpc\":\"2.0\""));
        let parsed = match IncomingMessage::parse(&text).unwrap() {
            IncomingMessage::Request(r) => r,
            other => panic!("expected request, got {other:?}"),
        };
        assert_eq!(parsed.method, "ping");
    }

    #[test]
    fn notification_has_no_id() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let text = serde_json::to_string(&note).unwrap();
        assert!(!text.contains("\"id\""));
        assert!(matches!(
            IncomingMessage::parse(&text).unwrap(),
            IncomingMessage::Notification(_)
        ));
    }

    #[test]
    fn response_classifies_by_absence_of_method() {
        let resp = JsonRpcResponse::success(1i64.into(), serde_json::json!({}));
        let text = serde_json::to_string(&resp).unwrap();
        assert!(matches!(
            IncomingMessage::parse(&text).unwrap(),
            IncomingMessage::Response(_)
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = IncomingMessage::parse("not json").unwrap_err();
        assert_eq!(err.code, -32700);
    }

    #[test]
    fn error_code_helpers() {
        assert_eq!(JsonRpcError::method_not_found("x").code, -32601);
        assert_eq!(JsonRpcError::not_initialized().code, -32002);
    }
}
