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
//! Every outgoing request passes through [`client::SberryHttpClient`], which:
//!
//! - Attaches the current access token and tenant headers.
//! - Classifies the `{code, msg, data}` response envelope.
//! - Renews an expired access token with a single refresh call shared by all
//!   concurrent requests, replaying suspended requests afterwards.
//! - Runs the forced-logout protocol when the backend reports the user or
//!   tenant as disabled.

pub mod client;
pub mod error;
pub mod models;
pub mod session;
