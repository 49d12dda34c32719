//! # JSON-RPC 2.0 Helpers
//!
//! Request/response objects carried in the first payload frame of a control message,
//! the error codes used by LECO components, and typed parameter access for method
//! implementations.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// Coordinator errors
pub const NOT_SIGNED_IN: i64 = 1234;
pub const DUPLICATE_NAME: i64 = 456;

// Actor errors
pub const NAME_NOT_FOUND: i64 = -32090;
pub const EXECUTION_FAILED: i64 = -32091;
pub const ACCESS_DENIED: i64 = -32092;

/// Reserved method answered with the list of available methods.
pub const DISCOVER_METHOD: &str = "rpc.discover";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found").with_data(method)
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, "Invalid params").with_data(detail.into())
    }

    pub fn access_denied(resource: &str) -> Self {
        Self::new(ACCESS_DENIED, "Access denied, the resource is locked.").with_data(resource)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)?;
        if let Some(data) = &self.data {
            write!(f, ": {data}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// The result value (`null` when omitted) or the remote error.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Builds a request with the fixed id `1`.
pub fn build_request(method: &str, params: Option<Map<String, Value>>) -> RpcRequest {
    RpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(Value::from(1)),
        method: method.to_string(),
        params: params.map(Value::Object),
    }
}

/// Descriptor returned by `rpc.discover`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl MethodInfo {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Parameters of a call, given either by position or by name.
#[derive(Clone, Debug, Default)]
pub struct Params(Option<Value>);

impl Params {
    pub fn new(params: Option<Value>) -> Self {
        Self(params)
    }

    /// Extracts the parameter at `index` (positional) or `name` (named).
    ///
    /// Missing and `null` parameters are `None`.
    pub fn get<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
    ) -> Result<Option<T>, RpcError> {
        let raw = match &self.0 {
            Some(Value::Array(values)) => values.get(index),
            Some(Value::Object(map)) => map.get(name),
            Some(other) => {
                return Err(RpcError::invalid_params(format!(
                    "params must be an array or object, got {other}"
                )))
            }
            None => None,
        };
        match raw {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| RpcError::invalid_params(format!("{name}: {e}"))),
        }
    }

    pub fn require<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, RpcError> {
        self.get(index, name)?
            .ok_or_else(|| RpcError::invalid_params(format!("missing parameter '{name}'")))
    }
}
