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

//! Core constants for the Sberry client.

// Default URLs
pub const SBERRY_HTTP_URL: &str = "http://localhost:58080/admin-api";
pub const SBERRY_WS_URL: &str = "ws://localhost:58080/erp-stock/ws";

// API paths
pub const REFRESH_TOKEN_PATH: &str = "/system/auth/refresh-token";

/// Request paths that never carry an access token.
pub const TOKEN_EXEMPT_PATHS: &[&str] = &["/login", "/refresh-token"];

// Response envelope status codes
pub const CODE_SUCCESS: i64 = 0;
pub const CODE_UNAUTHENTICATED: i64 = 401;
pub const CODE_SERVER_ERROR: i64 = 500;
pub const CODE_DEMO_MODE: i64 = 901;

/// Business codes meaning the user or tenant was disabled, all of which force
/// the session to terminate locally.
pub const FORCED_LOGOUT_CODES: &[i64] = &[1002003006, 1002015001, 1002015002, 1002000001];

/// Backend messages rejected silently, without a toast or logout.
///
/// Both arise from refresh-token races: a second refresh attempt observing
/// that the first one already rotated or deleted the token. Escalating them
/// would loop the client back into another 401.
pub const IGNORED_MESSAGES: &[&str] = &["Invalid refresh token", "Refresh token expired"];

/// Message escalated straight to the forced-unauthenticated handler when it
/// arrives outside the ignored path (legacy backend compatibility).
pub const MSG_INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

// User-facing message strings
pub const MSG_NETWORK_ERROR: &str = "Network error, please check your connection";
pub const MSG_TIMEOUT: &str = "Request timed out, please try again";
pub const MSG_SERVER_ERROR: &str = "Server error, please try again later";
pub const MSG_DEMO_MODE: &str =
    "Demo backend rejected the request. See https://doc.sberry.cloud/ to set up a local environment in 5 minutes";
pub const MSG_SESSION_EXPIRED: &str = "Login session expired, please sign in again";
pub const MSG_EMPTY_RESPONSE: &str = "[HTTP] request returned no body";
pub const MSG_UNKNOWN_ERROR: &str = "Unknown system error, please report to the administrator";

// HTTP defaults
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// WebSocket reconnect policy
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay after a transition into OPEN before the subscription set is flushed,
/// letting the server finish its own post-handshake bookkeeping.
pub const SUBSCRIPTION_SETTLE_DELAY_MS: u64 = 100;

/// Returns the default user-facing message for an envelope status code.
#[must_use]
pub fn default_error_message(code: i64) -> &'static str {
    match code {
        CODE_UNAUTHENTICATED => MSG_SESSION_EXPIRED,
        CODE_SERVER_ERROR => MSG_SERVER_ERROR,
        _ => MSG_UNKNOWN_ERROR,
    }
}
