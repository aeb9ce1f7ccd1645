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

//! Error types for the Sberry WebSocket client.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Error types for the Sberry WebSocket client.
#[derive(Debug, Clone, Error)]
pub enum SberryWsError {
    /// No access token available to authenticate the connection.
    #[error("Missing access token")]
    MissingToken,

    /// Transport-level error during WebSocket communication.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failed to send a frame over the WebSocket.
    #[error("Send error: {0}")]
    Send(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<tungstenite::Error> for SberryWsError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for SberryWsError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

/// Result type alias for Sberry WebSocket operations.
pub type SberryWsResult<T> = Result<T, SberryWsError>;
