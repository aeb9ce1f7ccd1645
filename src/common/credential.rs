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

//! Credential storage for the Sberry client.
//!
//! Tokens are owned by a process-wide store behind the [`CredentialStore`]
//! trait so the host application can back it with whatever persistence it
//! uses. Both clients read tokens through the store at the moment of use
//! rather than caching them across await points, so a token rotated by the
//! renewal protocol is picked up by every in-flight component immediately.

use std::{fmt::Debug, sync::RwLock};

use serde::{Deserialize, Serialize};

/// Access and refresh token pair issued by the authentication endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived token authorizing requests.
    pub access_token: String,
    /// Longer-lived token used to obtain a new access token.
    pub refresh_token: String,
    /// Expiry of the access token in epoch milliseconds, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_time: Option<i64>,
}

/// Process-wide credential store.
///
/// Mutated only by the renewal protocol or an explicit logout; implementations
/// must be safe to share across tasks.
pub trait CredentialStore: Send + Sync {
    /// Returns the current access token, if any.
    fn access_token(&self) -> Option<String>;

    /// Returns the current refresh token, if any.
    fn refresh_token(&self) -> Option<String>;

    /// Returns the tenant identifier, if tenant mode is in use.
    fn tenant_id(&self) -> Option<String>;

    /// Returns the visited tenant identifier, if one is being impersonated.
    fn visit_tenant_id(&self) -> Option<String>;

    /// Stores a freshly issued token pair.
    fn set_tokens(&self, tokens: TokenPair);

    /// Removes both tokens.
    fn clear_tokens(&self);
}

/// In-memory [`CredentialStore`] suitable for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<MemoryCredentialInner>,
}

#[derive(Debug, Default)]
struct MemoryCredentialInner {
    tokens: Option<TokenPair>,
    tenant_id: Option<String>,
    visit_tenant_id: Option<String>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given tokens.
    #[must_use]
    pub fn with_tokens(tokens: TokenPair) -> Self {
        let store = Self::new();
        store.set_tokens(tokens);
        store
    }

    /// Sets the tenant identifier.
    pub fn set_tenant_id(&self, tenant_id: Option<String>) {
        self.write().tenant_id = tenant_id;
    }

    /// Sets the visited tenant identifier.
    pub fn set_visit_tenant_id(&self, visit_tenant_id: Option<String>) {
        self.write().visit_tenant_id = visit_tenant_id;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryCredentialInner> {
        self.inner.read().expect("credential store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryCredentialInner> {
        self.inner.write().expect("credential store lock poisoned")
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn access_token(&self) -> Option<String> {
        self.read().tokens.as_ref().map(|t| t.access_token.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        self.read().tokens.as_ref().map(|t| t.refresh_token.clone())
    }

    fn tenant_id(&self) -> Option<String> {
        self.read().tenant_id.clone()
    }

    fn visit_tenant_id(&self) -> Option<String> {
        self.read().visit_tenant_id.clone()
    }

    fn set_tokens(&self, tokens: TokenPair) {
        self.write().tokens = Some(tokens);
    }

    fn clear_tokens(&self) {
        self.write().tokens = None;
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn token_pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_time: None,
        }
    }

    #[rstest]
    fn test_set_and_clear_tokens() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.access_token(), None);

        store.set_tokens(token_pair("access-1", "refresh-1"));
        assert_eq!(store.access_token().as_deref(), Some("access-1"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));

        store.clear_tokens();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
    }

    #[rstest]
    fn test_token_rotation_visible_to_readers() {
        let store = MemoryCredentialStore::with_tokens(token_pair("old", "refresh"));
        store.set_tokens(token_pair("new", "refresh-2"));
        assert_eq!(store.access_token().as_deref(), Some("new"));
    }

    #[rstest]
    fn test_token_pair_deserializes_camel_case() {
        let pair: TokenPair = serde_json::from_str(
            r#"{"accessToken":"a","refreshToken":"r","expiresTime":1735689600000}"#,
        )
        .unwrap();
        assert_eq!(pair.access_token, "a");
        assert_eq!(pair.refresh_token, "r");
        assert_eq!(pair.expires_time, Some(1735689600000));
    }
}
