//! Gateway REST transport
//!
//! Every gateway endpoint replies with a `{code, message, data}`
//! envelope. The [`ApiTransport`] trait is the seam between the change
//! pipeline and the HTTP layer: production code uses the reqwest-backed
//! [`HttpTransport`], tests substitute an in-memory kernel. A transport
//! returns the envelope's `data` only for `code == 200`; any other code
//! is surfaced as a rejection, never silently treated as success.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::{ConsoleError, ConsoleResult};

pub mod http;

pub use http::{HttpConfig, HttpTransport};

/// Request method subset the console uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// The `{code, message, data}` reply envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiEnvelope {
    pub fn success(data: Value) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Unwrap the payload, turning a non-200 code into a rejection
    pub fn into_data(self) -> ConsoleResult<Value> {
        if self.code == 200 {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(ConsoleError::Rejected {
                code: self.code,
                message: self.message,
            })
        }
    }
}

/// Transport seam over the gateway REST surface
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Issue a request against an API path (e.g. `/singbox/config`) and
    /// return the envelope payload
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ConsoleResult<Value>;

    async fn get(&self, path: &str) -> ConsoleResult<Value> {
        self.request(Method::Get, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> ConsoleResult<Value> {
        self.request(Method::Post, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: Value) -> ConsoleResult<Value> {
        self.request(Method::Put, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> ConsoleResult<Value> {
        self.request(Method::Delete, path, None).await
    }
}

/// Decode an envelope payload into a typed reply
pub(crate) fn decode<T: DeserializeOwned>(data: Value, context: &str) -> ConsoleResult<T> {
    serde_json::from_value(data)
        .map_err(|e| ConsoleError::Serialization(format!("{}: {}", context, e)))
}
