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

//! Rust client for the [Sberry](https://doc.sberry.cloud) ERP backend.
//!
//! The crate provides two independent coordination components consumed by
//! application code:
//!
//! - **HTTP gateway** ([`http::client::SberryHttpClient`]): attaches the current
//!   access token to every outgoing request, transparently renews an expired
//!   token with a single shared refresh call for all concurrent requests, and
//!   runs a deterministic forced-logout protocol when the backend reports the
//!   user or tenant as disabled.
//! - **WebSocket channel manager** ([`websocket::client::SberryWsClient`]):
//!   maintains a persistent connection to the warehouse telemetry feed,
//!   reconnects with bounded retries after unplanned closes, and reconciles the
//!   client-declared subscription set across reconnects.
//!
//! Collaborators owned by the host application (credential storage, route
//! table, user cache, dialogs, navigation) are injected through the
//! [`common::credential::CredentialStore`] and [`http::session::SessionHooks`]
//! traits rather than reached through globals.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod common;
pub mod http;
pub mod websocket;
