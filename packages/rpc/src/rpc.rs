//! JSON-RPC 2.0 envelope types and the facade's error code space

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// Facade error codes, wire-visible to wallets
pub const ERR_UNREGISTERED_CALLER: i32 = -32001;
pub const ERR_UNREGISTERED_RECIPIENT: i32 = -32002;
pub const ERR_INSUFFICIENT_BALANCE: i32 = -32003;
pub const ERR_UPSTREAM_CANTON: i32 = -32004;
pub const ERR_ALREADY_REGISTERED: i32 = -32005;

// JSON-RPC 2.0 standard codes
pub const ERR_PARSE: i32 = -32700;
pub const ERR_INVALID_REQUEST: i32 = -32600;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(ErrorObject {
                code: error.code,
                message: error.message,
            }),
        }
    }
}

/// A structured facade error carrying its wire code
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unregistered_caller() -> Self {
        Self::new(ERR_UNREGISTERED_CALLER, "caller is not a registered bridge user")
    }

    pub fn unregistered_recipient() -> Self {
        Self::new(ERR_UNREGISTERED_RECIPIENT, "recipient is not a registered bridge user")
    }

    pub fn insufficient_balance() -> Self {
        Self::new(ERR_INSUFFICIENT_BALANCE, "insufficient balance")
    }

    /// Upstream ledger failure; safe for the client to retry thanks to
    /// Canton-side command deduplication.
    pub fn upstream(detail: impl Into<String>) -> Self {
        Self::new(
            ERR_UPSTREAM_CANTON,
            format!("upstream ledger failure (retryable): {}", detail.into()),
        )
    }

    pub fn already_registered() -> Self {
        Self::new(ERR_ALREADY_REGISTERED, "address is already registered")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ERR_METHOD_NOT_FOUND, format!("method not found: {}", method))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(ERR_INVALID_PARAMS, detail.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_decode() {
        let raw = r#"{"jsonrpc":"2.0","id":7,"method":"erc20_balanceOf","params":["0xabc"]}"#;
        let req: JsonRpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.method, "erc20_balanceOf");
        assert_eq!(req.id, serde_json::json!(7));
        assert_eq!(req.params[0], "0xabc");
    }

    #[test]
    fn test_response_shape() {
        let ok = JsonRpcResponse::ok(serde_json::json!(1), serde_json::json!("0x1"));
        let encoded = serde_json::to_value(&ok).unwrap();
        assert_eq!(encoded["jsonrpc"], "2.0");
        assert_eq!(encoded["result"], "0x1");
        assert!(encoded.get("error").is_none());

        let err = JsonRpcResponse::err(serde_json::json!(2), RpcError::unregistered_recipient());
        let encoded = serde_json::to_value(&err).unwrap();
        assert_eq!(encoded["error"]["code"], ERR_UNREGISTERED_RECIPIENT);
        assert!(encoded.get("result").is_none());
    }
}
