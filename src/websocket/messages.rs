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

//! Data structures for the warehouse telemetry WebSocket protocol.
//!
//! Every frame is a tagged envelope `{type, content}`. Outbound subscription
//! frames wrap a `subscribe`/`unsubscribe` action and a warehouse id batch.
//! Inbound `content` may itself be a JSON-encoded string needing a second
//! parse pass; malformed payloads are reported as errors for the dispatch
//! loop to log and drop.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{SberryWsError, SberryWsResult};
use crate::common::enums::AlarmKind;

// Frame type tags
pub const MSG_TYPE_SUBSCRIBE: &str = "warehouse_subscribe";
pub const MSG_TYPE_TEMP_DATA: &str = "warehouse_temp_data";
pub const MSG_TYPE_TEMP_ALARM: &str = "temp_alarm";

// Subscription actions
pub const ACTION_SUBSCRIBE: &str = "subscribe";
pub const ACTION_UNSUBSCRIBE: &str = "unsubscribe";

/// Outbound tagged envelope.
#[derive(Clone, Debug, Serialize)]
pub struct OutboundEnvelope<T> {
    /// Frame type tag.
    #[serde(rename = "type")]
    pub message_type: &'static str,
    /// Frame content.
    pub content: T,
}

/// Subscription frame content.
#[derive(Clone, Debug, Serialize)]
pub struct SubscriptionContent {
    /// `subscribe` or `unsubscribe`.
    #[serde(rename = "type")]
    pub action: &'static str,
    /// Warehouse id batch the action applies to.
    #[serde(rename = "warehouseIds")]
    pub warehouse_ids: Vec<u64>,
}

/// Builds a subscribe frame for the given warehouse ids.
#[must_use]
pub fn subscribe_frame(warehouse_ids: Vec<u64>) -> OutboundEnvelope<SubscriptionContent> {
    OutboundEnvelope {
        message_type: MSG_TYPE_SUBSCRIBE,
        content: SubscriptionContent {
            action: ACTION_SUBSCRIBE,
            warehouse_ids,
        },
    }
}

/// Builds an unsubscribe frame for the given warehouse ids.
#[must_use]
pub fn unsubscribe_frame(warehouse_ids: Vec<u64>) -> OutboundEnvelope<SubscriptionContent> {
    OutboundEnvelope {
        message_type: MSG_TYPE_SUBSCRIBE,
        content: SubscriptionContent {
            action: ACTION_UNSUBSCRIBE,
            warehouse_ids,
        },
    }
}

/// Inbound tagged envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct InboundEnvelope {
    /// Frame type tag.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Frame content; may be a JSON object or a JSON-encoded string.
    #[serde(default)]
    pub content: Value,
}

/// Warehouse temperature reading pushed by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseReading {
    /// Warehouse the reading belongs to.
    pub warehouse_id: u64,
    /// Warehouse display name.
    #[serde(default)]
    pub warehouse_name: String,
    /// Serial number of the reporting device.
    #[serde(default)]
    pub device_sn: String,
    /// Device connection client id.
    #[serde(default)]
    pub client_id: String,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Sample timestamp.
    pub timestamp: NaiveDateTime,
    /// Owning tenant.
    #[serde(default)]
    pub tenant_id: Option<u64>,
    /// Server push timestamp.
    #[serde(default)]
    pub push_time: Option<NaiveDateTime>,
    /// Alarm classification, when the reading breached a threshold.
    #[serde(default)]
    pub alarm_type: Option<AlarmKind>,
    /// Alarm description.
    #[serde(default)]
    pub alarm_message: Option<String>,
    /// Whether the warehouse is locked.
    #[serde(default)]
    pub is_locked: Option<bool>,
    /// Lock reason, when locked.
    #[serde(default)]
    pub lock_reason: Option<String>,
    /// Lock timestamp, when locked.
    #[serde(default)]
    pub lock_time: Option<NaiveDateTime>,
    /// Configured minimum temperature.
    #[serde(default)]
    pub min_temperature: Option<f64>,
    /// Configured maximum temperature.
    #[serde(default)]
    pub max_temperature: Option<f64>,
}

/// Parsed inbound message.
#[derive(Clone, Debug)]
pub enum SberryWsMessage {
    /// Realtime temperature reading.
    Reading(WarehouseReading),
    /// Temperature alarm push.
    Alarm(WarehouseReading),
    /// Unrecognized frame type; logged and dropped by the dispatch loop.
    Unknown {
        /// The unrecognized type tag.
        message_type: String,
        /// The raw content.
        content: Value,
    },
}

/// Event emitted to the consumer stream.
#[derive(Clone, Debug)]
pub enum SberryWsEvent {
    /// Connection established.
    Opened,
    /// Connection closed (planned or unplanned).
    Closed,
    /// Transport or protocol error; the reconnect policy handles recovery.
    Error(String),
    /// Realtime temperature reading.
    Reading(WarehouseReading),
    /// Temperature alarm push.
    Alarm(WarehouseReading),
}

/// Parses a raw text frame into a typed message.
///
/// # Errors
///
/// Returns an error if the envelope or a recognized content payload is not
/// valid JSON.
pub fn parse_inbound(text: &str) -> SberryWsResult<SberryWsMessage> {
    let envelope: InboundEnvelope = serde_json::from_str(text)?;

    match envelope.message_type.as_str() {
        MSG_TYPE_TEMP_DATA => Ok(SberryWsMessage::Reading(parse_reading(envelope.content)?)),
        MSG_TYPE_TEMP_ALARM => Ok(SberryWsMessage::Alarm(parse_reading(envelope.content)?)),
        _ => Ok(SberryWsMessage::Unknown {
            message_type: envelope.message_type,
            content: envelope.content,
        }),
    }
}

/// Parses reading content, unwrapping the double-encoded string form first.
fn parse_reading(content: Value) -> SberryWsResult<WarehouseReading> {
    match content {
        Value::String(inner) => {
            serde_json::from_str(&inner).map_err(SberryWsError::from)
        }
        other => serde_json::from_value(other).map_err(SberryWsError::from),
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

    fn reading_json() -> Value {
        json!({
            "warehouseId": 10,
            "warehouseName": "Cold Store A",
            "deviceSn": "SN-001",
            "clientId": "client-1",
            "temperature": -18.5,
            "humidity": 62.0,
            "timestamp": "2025-01-15T08:30:00",
            "tenantId": 1,
            "pushTime": "2025-01-15T08:30:01"
        })
    }

    #[rstest]
    fn test_subscribe_frame_wire_format() {
        let frame = subscribe_frame(vec![10, 20]);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "warehouse_subscribe",
                "content": {"type": "subscribe", "warehouseIds": [10, 20]}
            })
        );
    }

    #[rstest]
    fn test_unsubscribe_frame_wire_format() {
        let frame = unsubscribe_frame(vec![7]);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["content"]["type"], "unsubscribe");
        assert_eq!(json["content"]["warehouseIds"], json!([7]));
    }

    #[rstest]
    fn test_parse_temp_data_object_content() {
        let frame = json!({"type": "warehouse_temp_data", "content": reading_json()});
        let msg = parse_inbound(&frame.to_string()).unwrap();
        match msg {
            SberryWsMessage::Reading(reading) => {
                assert_eq!(reading.warehouse_id, 10);
                assert_eq!(reading.temperature, -18.5);
                assert_eq!(reading.alarm_type, None);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[rstest]
    fn test_parse_temp_data_string_content_double_parse() {
        let frame = json!({
            "type": "warehouse_temp_data",
            "content": reading_json().to_string(),
        });
        let msg = parse_inbound(&frame.to_string()).unwrap();
        assert!(matches!(msg, SberryWsMessage::Reading(_)));
    }

    #[rstest]
    fn test_parse_alarm_with_classification() {
        let mut content = reading_json();
        content["alarmType"] = json!("HIGH_TEMP");
        content["alarmMessage"] = json!("Temperature above maximum");
        let frame = json!({"type": "temp_alarm", "content": content});
        let msg = parse_inbound(&frame.to_string()).unwrap();
        match msg {
            SberryWsMessage::Alarm(reading) => {
                assert_eq!(reading.alarm_type, Some(AlarmKind::HighTemp));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[rstest]
    fn test_parse_unknown_type_preserved() {
        let frame = json!({"type": "heartbeat", "content": {"seq": 1}});
        let msg = parse_inbound(&frame.to_string()).unwrap();
        match msg {
            SberryWsMessage::Unknown { message_type, .. } => {
                assert_eq!(message_type, "heartbeat");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[rstest]
    fn test_parse_malformed_content_is_error() {
        let frame = json!({"type": "warehouse_temp_data", "content": "not json"});
        assert!(parse_inbound(&frame.to_string()).is_err());
    }

    #[rstest]
    fn test_parse_malformed_envelope_is_error() {
        assert!(parse_inbound("not an envelope").is_err());
    }
}
