use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

/// Body placeholder when the intercepted bytes could not be decoded.
pub const DECODE_ERROR_MARKER: &str = "[Decode Error]";

/// Status placeholder for a flow that ended without a response.
pub const NO_RESPONSE_MARKER: &str = "No response received";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub host: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// A response as delivered by the interceptor, body still base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Base64 of the body, already decoded to UTF-8 text by the interceptor
    /// unless `decode_error` is set.
    #[serde(default)]
    pub content: String,
    /// The interceptor could not decode the body (bad content encoding or
    /// charset); `content` then holds the raw bytes.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub decode_error: bool,
}

/// The response half of a resolved flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlowResponse {
    Received {
        status_code: u16,
        headers: BTreeMap<String, String>,
        content: String,
    },
    Missing {
        status: String,
    },
}

impl FlowResponse {
    pub fn missing() -> Self {
        FlowResponse::Missing {
            status: NO_RESPONSE_MARKER.to_string(),
        }
    }

    /// Resolve an observed response, decoding its body.
    pub fn from_observed(observed: ObservedResponse) -> Self {
        let content = if observed.decode_error {
            DECODE_ERROR_MARKER.to_string()
        } else {
            decode_body(&observed.content)
        };
        FlowResponse::Received {
            status_code: observed.status_code,
            content,
            headers: observed.headers,
        }
    }
}

/// A request and, once resolved, its response. `response: None` is pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub request: RequestInfo,
    pub response: Option<FlowResponse>,
}

impl FlowRecord {
    pub fn pending(request: RequestInfo) -> Self {
        Self {
            request,
            response: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.response.is_none()
    }
}

/// Base64 body to text: UTF-8 when valid, lossy otherwise, and
/// [`DECODE_ERROR_MARKER`] when the base64 itself is broken.
pub fn decode_body(encoded: &str) -> String {
    match BASE64.decode(encoded.trim()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        },
        Err(_) => DECODE_ERROR_MARKER.to_string(),
    }
}
