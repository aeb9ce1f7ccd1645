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

//! HTTP request gateway for the Sberry backend.
//!
//! The [`SberryHttpClient`] intercepts every outgoing request, attaches the
//! current credentials, and classifies the `{code, msg, data}` response
//! envelope. Two recovery protocols own their failure paths end to end:
//!
//! - **Renewal**: on a 401 envelope, a single refresh call is shared by all
//!   concurrent requests. Requests arriving while the refresh is in flight are
//!   suspended on a FIFO queue and replayed (in arrival order) once the new
//!   token is stored. If the refresh fails, queued requests are still resumed
//!   so each converges to its own rejection, while the triggering request is
//!   not replayed.
//! - **Forced logout**: a fixed set of business codes means the user or tenant
//!   was disabled. Exactly one logout sequence (blocking prompt, route/cache/
//!   credential cleanup, navigation) runs for any number of concurrent
//!   responses carrying such codes.

use std::{
    fmt::{Debug, Formatter},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use reqwest::{
    Method, StatusCode,
    header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA},
};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};

use super::{
    error::{SberryHttpError, SberryHttpResult},
    models::{ApiRequest, ApiResponse},
    session::SessionHooks,
};
use crate::common::{
    consts::{
        CODE_DEMO_MODE, CODE_SERVER_ERROR, CODE_SUCCESS, CODE_UNAUTHENTICATED,
        DEFAULT_TIMEOUT_SECS, FORCED_LOGOUT_CODES, IGNORED_MESSAGES, MSG_DEMO_MODE,
        MSG_EMPTY_RESPONSE, MSG_INVALID_REFRESH_TOKEN, MSG_NETWORK_ERROR, MSG_SERVER_ERROR,
        MSG_SESSION_EXPIRED, MSG_TIMEOUT, REFRESH_TOKEN_PATH, SBERRY_HTTP_URL, TOKEN_EXEMPT_PATHS,
        default_error_message,
    },
    credential::{CredentialStore, TokenPair},
};

/// Payload produced when a suspended request is replayed.
enum ReplayPayload {
    Json(Value),
    Binary(Bytes),
}

impl ReplayPayload {
    fn into_json(self) -> SberryHttpResult<Value> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Binary(_) => Err(SberryHttpError::Parse(
                "replay produced a binary payload for a JSON request".to_string(),
            )),
        }
    }

    fn into_binary(self) -> SberryHttpResult<Bytes> {
        match self {
            Self::Binary(bytes) => Ok(bytes),
            Self::Json(_) => Err(SberryHttpError::Parse(
                "replay produced a JSON payload for a binary request".to_string(),
            )),
        }
    }
}

/// A request suspended while a token refresh is in flight.
struct PendingCall {
    request: ApiRequest,
    binary: bool,
    tx: oneshot::Sender<SberryHttpResult<ReplayPayload>>,
}

/// Renewal protocol state. `refreshing` and the queue are mutated together
/// under one lock so the queue-or-lead decision never races.
#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    pending: Vec<PendingCall>,
}

struct ClientInner {
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    session: Arc<dyn SessionHooks>,
    tenant_enabled: bool,
    refresh_state: Mutex<RefreshState>,
    logout_firing: AtomicBool,
    relogin_showing: AtomicBool,
}

/// HTTP request gateway for the Sberry backend.
#[derive(Clone)]
pub struct SberryHttpClient {
    inner: Arc<ClientInner>,
}

impl Debug for SberryHttpClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SberryHttpClient")
            .field("base_url", &self.inner.base_url)
            .field("tenant_enabled", &self.inner.tenant_enabled)
            .finish_non_exhaustive()
    }
}

/// Returns whether the path never carries an access token.
fn is_token_exempt(path: &str) -> bool {
    TOKEN_EXEMPT_PATHS.iter().any(|p| path.contains(p))
}

impl SberryHttpClient {
    /// Creates a new [`SberryHttpClient`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to initialize.
    pub fn new(
        base_url: Option<String>,
        timeout_secs: Option<u64>,
        tenant_enabled: bool,
        credentials: Arc<dyn CredentialStore>,
        session: Arc<dyn SessionHooks>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url: base_url.unwrap_or_else(|| SBERRY_HTTP_URL.to_string()),
                client,
                credentials,
                session,
                tenant_enabled,
                refresh_state: Mutex::new(RefreshState::default()),
                logout_firing: AtomicBool::new(false),
                relogin_showing: AtomicBool::new(false),
            }),
        })
    }

    /// Returns the configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Sends a request and returns the envelope payload.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures, nonzero envelope codes, and
    /// session terminations; see [`SberryHttpError`] for the taxonomy.
    pub async fn send(&self, request: ApiRequest) -> SberryHttpResult<Value> {
        let response = self.transmit(&request).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(self.unexpected_status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SberryHttpError::Network(e.to_string()))?;
        if body.is_empty() {
            return Err(SberryHttpError::EmptyResponse(MSG_EMPTY_RESPONSE.to_string()));
        }

        let envelope: ApiResponse = serde_json::from_slice(&body)
            .map_err(|e| SberryHttpError::Parse(format!("Invalid response envelope: {e}")))?;

        self.classify(request, envelope, false)
            .await
            .and_then(ReplayPayload::into_json)
    }

    /// Sends a request expecting a binary response (file export).
    ///
    /// The envelope classification is bypassed unless the body arrives with a
    /// JSON content type, which on export endpoints signals an error payload
    /// delivered under the wrong type. A JSON body carrying the success
    /// sentinel is still returned raw.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures and for JSON error payloads,
    /// classified the same way as [`Self::send`].
    pub async fn download(&self, request: ApiRequest) -> SberryHttpResult<Bytes> {
        let response = self.transmit(&request).await?;
        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        if !status.is_success() {
            return Err(self.unexpected_status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SberryHttpError::Network(e.to_string()))?;

        if !is_json {
            return Ok(body);
        }

        let envelope: ApiResponse = serde_json::from_slice(&body)
            .map_err(|e| SberryHttpError::Parse(format!("Invalid response envelope: {e}")))?;
        if envelope.code_or_success() == CODE_SUCCESS {
            return Ok(body);
        }

        self.classify(request, envelope, true)
            .await
            .and_then(ReplayPayload::into_binary)
    }

    // -- RESPONSE CLASSIFICATION -------------------------------------------------------------

    async fn classify(
        &self,
        request: ApiRequest,
        envelope: ApiResponse,
        binary: bool,
    ) -> SberryHttpResult<ReplayPayload> {
        let code = envelope.code_or_success();
        let msg = envelope
            .msg
            .clone()
            .unwrap_or_else(|| default_error_message(code).to_string());

        // Refresh-token races resolve silently; escalating them would loop
        // the client back into another 401.
        if IGNORED_MESSAGES.contains(&msg.as_str()) {
            tracing::debug!(code, %msg, "Ignoring response message");
            return Err(SberryHttpError::Ignored(msg));
        }

        if code == CODE_UNAUTHENTICATED {
            return self.renew_and_replay(request, binary).await;
        }

        if code == CODE_SERVER_ERROR {
            self.inner.session.toast_error(MSG_SERVER_ERROR);
            return Err(SberryHttpError::ServerError(msg));
        }

        if code == CODE_DEMO_MODE {
            self.inner.session.toast_error(MSG_DEMO_MODE);
            return Err(SberryHttpError::Misconfigured(msg));
        }

        if code != CODE_SUCCESS {
            if FORCED_LOGOUT_CODES.contains(&code) {
                return Err(self.force_logout(code, msg).await);
            }
            if msg == MSG_INVALID_REFRESH_TOKEN {
                // Legacy backends report a dead refresh token as a plain
                // business error; treat it as a lost session.
                return Err(self.handle_unauthenticated().await);
            }
            self.inner.session.toast_error(&msg);
            return Err(SberryHttpError::Business { code, message: msg });
        }

        Ok(ReplayPayload::Json(envelope.data))
    }

    fn unexpected_status(&self, status: StatusCode) -> SberryHttpError {
        let status = status.as_u16();
        self.inner
            .session
            .toast_error(&format!("Request failed with status code {status}"));
        SberryHttpError::UnexpectedStatus { status }
    }

    // -- RENEWAL PROTOCOL --------------------------------------------------------------------

    /// Runs the single-flight renewal protocol for a request that received a
    /// 401 envelope.
    ///
    /// The first request to observe the expired token leads the refresh;
    /// every other request observing `refreshing = true` suspends on the
    /// pending queue and is resumed by the leader.
    async fn renew_and_replay(
        &self,
        request: ApiRequest,
        binary: bool,
    ) -> SberryHttpResult<ReplayPayload> {
        {
            let mut state = self.inner.refresh_state.lock().await;
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.pending.push(PendingCall { request, binary, tx });
                drop(state);
                return match rx.await {
                    Ok(result) => result,
                    // Leader dropped without resuming us; treat as a lost session.
                    Err(_) => Err(SberryHttpError::Unauthenticated(
                        MSG_SESSION_EXPIRED.to_string(),
                    )),
                };
            }
            state.refreshing = true;
        }

        let Some(refresh_token) = self.inner.credentials.refresh_token() else {
            // No renewal possible; unblock anything that queued meanwhile.
            let drained = self.end_refresh_cycle().await;
            self.resume_pending(drained).await;
            return Err(self.handle_unauthenticated().await);
        };

        match self.refresh_tokens(&refresh_token).await {
            Ok(tokens) => {
                tracing::debug!("Access token renewed");
                self.inner.credentials.set_tokens(tokens);
                let drained = self.end_refresh_cycle().await;
                self.resume_pending(drained).await;
                self.replay(request, binary).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                // Resume queued requests anyway: each re-sends, observes its
                // own 401, and converges through the relogin guard. The
                // triggering request is not replayed, preventing recursion.
                let drained = self.end_refresh_cycle().await;
                self.resume_pending(drained).await;
                Err(self.handle_unauthenticated().await)
            }
        }
    }

    /// Clears the renewal flag and takes ownership of the pending queue.
    ///
    /// Runs on every exit path of the renewal protocol so the gateway can
    /// never wedge with `refreshing` stuck true.
    async fn end_refresh_cycle(&self) -> Vec<PendingCall> {
        let mut state = self.inner.refresh_state.lock().await;
        state.refreshing = false;
        std::mem::take(&mut state.pending)
    }

    /// Resumes suspended requests in arrival order, re-sending each with the
    /// credentials currently in the store.
    async fn resume_pending(&self, pending: Vec<PendingCall>) {
        for call in pending {
            let result = self.replay(call.request, call.binary).await;
            // Receiver may have been dropped by a cancelled caller.
            let _ = call.tx.send(result);
        }
    }

    async fn replay(&self, request: ApiRequest, binary: bool) -> SberryHttpResult<ReplayPayload> {
        if binary {
            Box::pin(self.download(request)).await.map(ReplayPayload::Binary)
        } else {
            Box::pin(self.send(request)).await.map(ReplayPayload::Json)
        }
    }

    /// Calls the refresh endpoint directly, bypassing the gateway pipeline.
    async fn refresh_tokens(&self, refresh_token: &str) -> SberryHttpResult<TokenPair> {
        let url = format!("{}{REFRESH_TOKEN_PATH}", self.inner.base_url);
        let mut builder = self
            .inner
            .client
            .post(&url)
            .query(&[("refreshToken", refresh_token)]);

        if self.inner.tenant_enabled {
            if let Some(tenant_id) = self.inner.credentials.tenant_id() {
                builder = builder.header("tenant-id", tenant_id);
            }
        }

        let response = builder.send().await.map_err(|e| map_transport_error(&e))?;
        if !response.status().is_success() {
            return Err(SberryHttpError::UnexpectedStatus {
                status: response.status().as_u16(),
            });
        }

        let envelope: ApiResponse = response
            .json()
            .await
            .map_err(|e| SberryHttpError::Parse(format!("Invalid refresh response: {e}")))?;
        let code = envelope.code_or_success();
        if code != CODE_SUCCESS {
            return Err(SberryHttpError::Business {
                code,
                message: envelope.msg.unwrap_or_else(|| default_error_message(code).to_string()),
            });
        }

        serde_json::from_value(envelope.data)
            .map_err(|e| SberryHttpError::Parse(format!("Invalid token pair: {e}")))
    }

    // -- SESSION TERMINATION PROTOCOLS -------------------------------------------------------

    /// Runs the forced-logout protocol for a disabled user or tenant.
    ///
    /// Single-flight: while one logout sequence runs, every other response
    /// carrying a forced-logout code rejects with its own message and nothing
    /// else. Each cleanup step is independently fault-tolerant.
    async fn force_logout(&self, code: i64, message: String) -> SberryHttpError {
        let error = SberryHttpError::ForcedLogout {
            code,
            message: message.clone(),
        };

        if self.inner.logout_firing.swap(true, Ordering::SeqCst) {
            return error;
        }

        tracing::info!(code, %message, "Forced logout triggered");
        let on_login_view = self.inner.session.is_login_view();

        // Dismissal counts as acknowledgment.
        if let Err(e) = self.inner.session.alert_error(&message).await {
            tracing::debug!(error = %e, "Logout prompt dismissed");
        }

        if let Err(e) = self.inner.session.reset_routes() {
            tracing::warn!(error = %e, "Route reset failed during forced logout");
        }
        if let Err(e) = self.inner.session.clear_user_cache() {
            tracing::warn!(error = %e, "User cache clear failed during forced logout");
        }
        self.inner.credentials.clear_tokens();

        if !on_login_view {
            self.inner.session.navigate_root();
        }

        self.inner.logout_firing.store(false, Ordering::SeqCst);
        error
    }

    /// Runs the forced-unauthenticated handler for a session that cannot be
    /// renewed.
    ///
    /// Guarded by the relogin flag so N concurrent 401s show exactly one
    /// modal; a no-op when already on the login view.
    async fn handle_unauthenticated(&self) -> SberryHttpError {
        let error = SberryHttpError::Unauthenticated(MSG_SESSION_EXPIRED.to_string());

        if self.inner.session.is_login_view() {
            return error;
        }
        if self.inner.relogin_showing.swap(true, Ordering::SeqCst) {
            return error;
        }

        tracing::info!("Session lost, prompting for re-login");
        match self.inner.session.confirm_relogin(MSG_SESSION_EXPIRED).await {
            Ok(()) => {
                if let Err(e) = self.inner.session.reset_routes() {
                    tracing::warn!(error = %e, "Route reset failed during re-login");
                }
                if let Err(e) = self.inner.session.clear_user_cache() {
                    tracing::warn!(error = %e, "User cache clear failed during re-login");
                }
                self.inner.credentials.clear_tokens();
                self.inner.relogin_showing.store(false, Ordering::SeqCst);
                self.inner.session.reload();
            }
            Err(e) => {
                tracing::debug!(error = %e, "Re-login prompt dismissed");
                self.inner.relogin_showing.store(false, Ordering::SeqCst);
            }
        }

        error
    }

    // -- TRANSPORT ---------------------------------------------------------------------------

    async fn transmit(&self, request: &ApiRequest) -> SberryHttpResult<reqwest::Response> {
        let url = format!("{}{}", self.inner.base_url, request.path);
        let mut builder = self.inner.client.request(request.method.clone(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        // Read-through at the moment of transmission so a token rotated by a
        // concurrent renewal is never bypassed by a stale copy.
        let mut has_auth_header = false;
        if request.auth && !is_token_exempt(&request.path) {
            if let Some(token) = self.inner.credentials.access_token() {
                builder = builder.bearer_auth(&token);
                has_auth_header = true;
            }
        }

        if self.inner.tenant_enabled {
            if let Some(tenant_id) = self.inner.credentials.tenant_id() {
                builder = builder.header("tenant-id", tenant_id);
            }
            // Tenant visits only ride on authenticated requests.
            if has_auth_header {
                if let Some(visit_tenant_id) = self.inner.credentials.visit_tenant_id() {
                    builder = builder.header("visit-tenant-id", visit_tenant_id);
                }
            }
        }

        if request.method == Method::GET {
            builder = builder
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|e| {
            let error = map_transport_error(&e);
            self.inner.session.toast_error(&match &error {
                SberryHttpError::Timeout(msg) | SberryHttpError::Network(msg) => msg.clone(),
                other => other.to_string(),
            });
            error
        })
    }
}

fn map_transport_error(error: &reqwest::Error) -> SberryHttpError {
    if error.is_timeout() {
        SberryHttpError::Timeout(MSG_TIMEOUT.to_string())
    } else {
        tracing::debug!(error = %error, "Transport error");
        SberryHttpError::Network(MSG_NETWORK_ERROR.to_string())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("/system/auth/login", true)]
    #[case("/system/auth/refresh-token", true)]
    #[case("/erp/stock/warehouse/page", false)]
    #[case("/system/user/profile", false)]
    fn test_token_exempt_paths(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_token_exempt(path), expected);
    }

    #[rstest]
    fn test_replay_payload_type_mismatch() {
        let payload = ReplayPayload::Json(Value::Null);
        assert!(payload.into_binary().is_err());

        let payload = ReplayPayload::Binary(Bytes::from_static(b"x"));
        assert!(payload.into_json().is_err());
    }
}
