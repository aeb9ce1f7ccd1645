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

//! Error types for the Sberry HTTP gateway.

use thiserror::Error;

/// Error types for Sberry HTTP gateway operations.
#[derive(Debug, Clone, Error)]
pub enum SberryHttpError {
    /// Network unreachable or connection refused.
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded the transport timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Non-2xx HTTP status with no usable envelope.
    #[error("Request failed with status code {status}")]
    UnexpectedStatus {
        /// The HTTP status code.
        status: u16,
    },

    /// Response carried no body at all.
    #[error("Empty response: {0}")]
    EmptyResponse(String),

    /// Response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Message in the ignored set; callers must treat this as a non-error
    /// no-op (refresh-token races).
    #[error("{0}")]
    Ignored(String),

    /// Session could not be re-established; the forced-unauthenticated
    /// handler has run (or is running).
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Backend returned the server-error code (500).
    #[error("Server error: {0}")]
    ServerError(String),

    /// Backend rejected the request as coming from an outdated or
    /// misconfigured client (code 901).
    #[error("Misconfigured client: {0}")]
    Misconfigured(String),

    /// User or tenant disabled; the forced-logout protocol has run (or is
    /// running) and the session is terminated locally.
    #[error("Forced logout ({code}): {message}")]
    ForcedLogout {
        /// The business code that triggered the logout.
        code: i64,
        /// The server-provided message.
        message: String,
    },

    /// Any other nonzero business code.
    #[error("Business error ({code}): {message}")]
    Business {
        /// The envelope status code.
        code: i64,
        /// The server-provided message.
        message: String,
    },
}

/// Result type alias for Sberry HTTP gateway operations.
pub type SberryHttpResult<T> = Result<T, SberryHttpError>;
