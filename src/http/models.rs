// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2024-2025 Sberry Cloud Pty Ltd. All rights reserved.
//  https://doc.sberry.cloud
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Data structures for the Sberry HTTP gateway.

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::common::consts::CODE_SUCCESS;

/// Outgoing request carried through the gateway.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the configured base URL.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON request body.
    pub body: Option<Value>,
    /// Whether the access token should be attached. Paths on the exempt list
    /// never carry a token regardless of this flag.
    pub auth: bool,
}

impl ApiRequest {
    /// Creates a new request with the given method and path.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            auth: true,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets the JSON request body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Opts the request out of token attachment.
    #[must_use]
    pub fn without_auth(mut self) -> Self {
        self.auth = false;
        self
    }
}

/// Response envelope returned by every JSON endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiResponse {
    /// Envelope status code; missing means success.
    pub code: Option<i64>,
    /// Server-provided message, if any.
    pub msg: Option<String>,
    /// Payload, if any.
    #[serde(default)]
    pub data: Value,
}

impl ApiResponse {
    /// Returns the envelope code, defaulting to the success sentinel when the
    /// backend omitted it.
    #[must_use]
    pub fn code_or_success(&self) -> i64 {
        self.code.unwrap_or(CODE_SUCCESS)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn test_envelope_missing_code_is_success() {
        let response: ApiResponse = serde_json::from_value(json!({"data": {"id": 7}})).unwrap();
        assert_eq!(response.code_or_success(), CODE_SUCCESS);
        assert_eq!(response.data, json!({"id": 7}));
    }

    #[rstest]
    fn test_envelope_error_fields() {
        let response: ApiResponse =
            serde_json::from_value(json!({"code": 500, "msg": "boom"})).unwrap();
        assert_eq!(response.code_or_success(), 500);
        assert_eq!(response.msg.as_deref(), Some("boom"));
        assert_eq!(response.data, Value::Null);
    }

    #[rstest]
    fn test_request_builder() {
        let request = ApiRequest::get("/erp/stock/warehouse/page")
            .with_query("pageNo", "1")
            .without_auth();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.query.len(), 1);
        assert!(!request.auth);
    }
}
