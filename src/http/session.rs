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

//! Session collaborator interface consumed by the logout protocols.
//!
//! The gateway never owns UI, routing, or caches; it drives them through this
//! trait. Cleanup steps are invoked independently and a failure in one must
//! not prevent the next, which is why the fallible methods return `Result`
//! for logging rather than propagation.

use std::fmt::Debug;

use async_trait::async_trait;

/// Host-application hooks used by the forced-logout and
/// forced-unauthenticated protocols.
#[async_trait]
pub trait SessionHooks: Send + Sync + Debug {
    /// Returns whether the current location is already the login view.
    fn is_login_view(&self) -> bool;

    /// Shows a blocking error prompt and resolves when the user acknowledges
    /// or dismisses it. Dismissal counts as acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt could not be presented; the caller
    /// treats this the same as a dismissal.
    async fn alert_error(&self, message: &str) -> anyhow::Result<()>;

    /// Shows a blocking re-login confirmation and resolves when the user
    /// confirms.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt could not be presented.
    async fn confirm_relogin(&self, message: &str) -> anyhow::Result<()>;

    /// Surfaces a non-blocking error message (toast).
    fn toast_error(&self, message: &str);

    /// Removes all dynamically registered routes down to the allow-list.
    ///
    /// # Errors
    ///
    /// Returns an error if the route table could not be reset.
    fn reset_routes(&self) -> anyhow::Result<()>;

    /// Clears cached user and role data.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache could not be cleared.
    fn clear_user_cache(&self) -> anyhow::Result<()>;

    /// Replaces the current location with the application root.
    fn navigate_root(&self);

    /// Performs a full reload to re-enter the authentication flow.
    fn reload(&self);
}
