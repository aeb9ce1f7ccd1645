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

//! Enumerations for the Sberry client.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Connection state of the WebSocket channel.
///
/// Stored as an atomic `u8` so the client handle and the connection task can
/// share it without locking.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WebSocketStatus {
    /// Handshake in progress.
    Connecting = 1,
    /// Connection established, frames may flow both ways.
    Open = 2,
    /// Close frame sent, connection draining.
    Closing = 3,
    /// No connection; both the initial and the per-attempt terminal state.
    Closed = 4,
}

impl WebSocketStatus {
    /// Returns the atomic representation of the status.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses the status from its atomic representation.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Alarm classification attached to a warehouse temperature reading.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmKind {
    /// Temperature above the configured maximum.
    HighTemp,
    /// Temperature below the configured minimum.
    LowTemp,
    /// Device stopped reporting within the expected interval.
    Timeout,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(WebSocketStatus::Connecting)]
    #[case(WebSocketStatus::Open)]
    #[case(WebSocketStatus::Closing)]
    #[case(WebSocketStatus::Closed)]
    fn test_status_u8_round_trip(#[case] status: WebSocketStatus) {
        assert_eq!(WebSocketStatus::from_u8(status.as_u8()), status);
    }

    #[rstest]
    fn test_status_unknown_u8_is_closed() {
        assert_eq!(WebSocketStatus::from_u8(0), WebSocketStatus::Closed);
        assert_eq!(WebSocketStatus::from_u8(99), WebSocketStatus::Closed);
    }

    #[rstest]
    #[case(r#""HIGH_TEMP""#, AlarmKind::HighTemp)]
    #[case(r#""LOW_TEMP""#, AlarmKind::LowTemp)]
    #[case(r#""TIMEOUT""#, AlarmKind::Timeout)]
    fn test_alarm_kind_deserialize(#[case] json: &str, #[case] expected: AlarmKind) {
        let kind: AlarmKind = serde_json::from_str(json).unwrap();
        assert_eq!(kind, expected);
    }
}
