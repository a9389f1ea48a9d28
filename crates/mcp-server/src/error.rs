//! Unified error type for the session/dispatch core.
//!
//! [`McpError`] spans all three error tiers: protocol errors map directly to
//! JSON-RPC codes, call-level errors become either a JSON-RPC error or a
//! `CallToolResult.is_error = true`, and infrastructure errors are only ever
//! logged — [`McpError::is_infrastructure`] marks which variants those are
//! so the notification manager and event store never let one escape to a
//! client.

use mcp_types::JsonRpcError;

/// Result alias used throughout this crate.
pub type McpResult<T> = Result<T, McpError>;

/// The unified error type for session, dispatch, and tool invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum McpError {
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("request received before initialization completed")]
    NotInitialized,
    #[error("initialize already in flight for this session")]
    InitializeInFlight,
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("capability not available on this session: {0}")]
    CapabilityUnavailable(String),
    #[error("missing secret: {0}")]
    MissingSecret(String),
    #[error("missing or empty bearer token for tool requiring auth")]
    MissingAuth,
    #[error("request timed out")]
    Timeout,
    #[error("session closed")]
    SessionClosed,
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// Never surfaced to a client — logged and counted only.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl McpError {
    /// Map to a JSON-RPC error code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError(_) => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_)
            | Self::ToolNotFound(_)
            | Self::MissingSecret(_)
            | Self::MissingAuth => -32602,
            Self::NotInitialized => -32002,
            Self::InitializeInFlight => -32600,
            Self::CapabilityUnavailable(_) => -32601,
            Self::Timeout | Self::SessionClosed | Self::Cancelled(_) | Self::Infrastructure(_) => {
                -32603
            }
            Self::Internal(_) => -32603,
        }
    }

    /// Whether this error must never be sent to a client.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }

    /// Convert to a JSON-RPC error, redacting `data` when `mask_details` is set.
    ///
    /// Infrastructure errors are always masked regardless of the flag, since
    /// they're never meant to describe anything to a client.
    #[must_use]
    pub fn into_jsonrpc_error(self, mask_details: bool) -> JsonRpcError {
        let code = self.code();
        if mask_details || self.is_infrastructure() {
            let message = if self.is_infrastructure() {
                "internal server error".to_string()
            } else {
                self.to_string()
            };
            return JsonRpcError::new(code, message);
        }

        let message = self.to_string();
        match self.detail() {
            Some(data) => JsonRpcError::new(code, message).with_data(data),
            None => JsonRpcError::new(code, message),
        }
    }

    /// Structured detail for unmasked clients: the variant name plus whatever
    /// message the variant carries. `None` for variants with nothing beyond
    /// the message itself.
    fn detail(&self) -> Option<serde_json::Value> {
        let (variant, detail) = match self {
            Self::ParseError(d) => ("parse_error", d.as_str()),
            Self::InvalidRequest(d) => ("invalid_request", d.as_str()),
            Self::MethodNotFound(d) => ("method_not_found", d.as_str()),
            Self::InvalidParams(d) => ("invalid_params", d.as_str()),
            Self::Internal(d) => ("internal", d.as_str()),
            Self::ToolNotFound(d) => ("tool_not_found", d.as_str()),
            Self::CapabilityUnavailable(d) => ("capability_unavailable", d.as_str()),
            Self::MissingSecret(d) => ("missing_secret", d.as_str()),
            Self::Cancelled(d) => ("cancelled", d.as_str()),
            Self::NotInitialized
            | Self::InitializeInFlight
            | Self::MissingAuth
            | Self::Timeout
            | Self::SessionClosed
            | Self::Infrastructure(_) => return None,
        };
        Some(serde_json::json!({ "variant": variant, "detail": detail }))
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_initialized_maps_to_dash_32002() {
        assert_eq!(McpError::NotInitialized.code(), -32002);
    }

    #[test]
    fn infrastructure_errors_are_marked() {
        assert!(McpError::Infrastructure("dropped".into()).is_infrastructure());
        assert!(!McpError::ToolNotFound("x".into()).is_infrastructure());
    }

    #[test]
    fn unmasked_error_carries_structured_data() {
        let err = McpError::ToolNotFound("frobnicate".into()).into_jsonrpc_error(false);
        let data = err.data.expect("unmasked error should carry data");
        assert_eq!(data["variant"], "tool_not_found");
        assert_eq!(data["detail"], "frobnicate");
    }

    #[test]
    fn masked_error_omits_data_and_generic_messages_infrastructure() {
        let err = McpError::ToolNotFound("frobnicate".into()).into_jsonrpc_error(true);
        assert!(err.data.is_none());
        assert!(err.message.contains("frobnicate"));

        let infra = McpError::Infrastructure("disk full".into()).into_jsonrpc_error(false);
        assert!(infra.data.is_none());
        assert!(!infra.message.contains("disk full"));
    }
}
