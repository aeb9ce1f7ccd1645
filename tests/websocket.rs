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

//! Integration tests for the WebSocket client against a mock telemetry feed.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use futures_util::StreamExt;
use rstest::rstest;
use sberry_client::{
    common::{
        credential::{MemoryCredentialStore, TokenPair},
        enums::WebSocketStatus,
    },
    websocket::{
        client::SberryWsClient,
        error::SberryWsError,
        messages::SberryWsEvent,
    },
};
use serde_json::{Value, json};

// -- TEST HARNESS ------------------------------------------------------------------------------

/// Mock feed server state shared across connections.
#[derive(Debug, Default)]
struct FeedState {
    /// Connections accepted so far.
    connections: AtomicUsize,
    /// Upgrade requests seen, including rejected ones.
    upgrade_requests: AtomicUsize,
    /// Token query parameter per accepted connection.
    tokens: Mutex<Vec<String>>,
    /// Every frame received, in arrival order.
    frames: Mutex<Vec<Value>>,
    /// Reject all upgrade requests with 403.
    reject_upgrades: AtomicBool,
    /// Close the first accepted connection after one received frame.
    drop_first_after_frame: AtomicBool,
    /// Push telemetry frames back after each subscribe frame.
    push_on_subscribe: AtomicBool,
}

impl FeedState {
    fn frames(&self) -> Vec<Value> {
        self.frames.lock().unwrap().clone()
    }

    fn subscribe_frames(&self) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|f| f["content"]["type"] == "subscribe")
            .collect()
    }
}

async fn feed_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<FeedState>>,
) -> impl IntoResponse {
    state.upgrade_requests.fetch_add(1, Ordering::SeqCst);
    if state.reject_upgrades.load(Ordering::SeqCst) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let token = params.get("token").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| handle_connection(socket, token, state))
        .into_response()
}

async fn handle_connection(mut socket: WebSocket, token: String, state: Arc<FeedState>) {
    let index = state.connections.fetch_add(1, Ordering::SeqCst);
    state.tokens.lock().unwrap().push(token);

    let drop_after_frame = index == 0 && state.drop_first_after_frame.load(Ordering::SeqCst);

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let frame: Value = serde_json::from_str(&text).unwrap();
        let is_subscribe = frame["content"]["type"] == "subscribe";
        let warehouse_id = frame["content"]["warehouseIds"][0].clone();
        state.frames.lock().unwrap().push(frame);

        if drop_after_frame {
            return;
        }

        if is_subscribe && state.push_on_subscribe.load(Ordering::SeqCst) {
            push_telemetry(&mut socket, &warehouse_id).await;
        }
    }
}

/// Pushes one double-encoded reading, one alarm, and one unknown frame.
async fn push_telemetry(socket: &mut WebSocket, warehouse_id: &Value) {
    let reading = json!({
        "warehouseId": warehouse_id,
        "warehouseName": "Cold Store A",
        "temperature": -18.5,
        "humidity": 60.0,
        "timestamp": "2025-01-15T08:30:00"
    });

    // Readings arrive with a JSON-encoded string content.
    let data_frame = json!({"type": "warehouse_temp_data", "content": reading.to_string()});
    let _ = socket.send(Message::Text(data_frame.to_string().into())).await;

    let mut alarm = reading.clone();
    alarm["alarmType"] = json!("HIGH_TEMP");
    alarm["alarmMessage"] = json!("Temperature above maximum");
    let alarm_frame = json!({"type": "temp_alarm", "content": alarm});
    let _ = socket.send(Message::Text(alarm_frame.to_string().into())).await;

    let unknown_frame = json!({"type": "heartbeat", "content": {"seq": 1}});
    let _ = socket.send(Message::Text(unknown_frame.to_string().into())).await;
}

async fn start_feed(state: Arc<FeedState>) -> String {
    let router = Router::new().route("/ws", get(feed_handler)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

fn seeded_store(access: &str) -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_tokens(TokenPair {
        access_token: access.to_string(),
        refresh_token: "refresh-1".to_string(),
        expires_time: None,
    }))
}

fn feed_client(url: &str, store: Arc<MemoryCredentialStore>) -> SberryWsClient {
    // Short reconnect delay keeps the tests fast.
    SberryWsClient::new(Some(url.to_string()), store, Some(2), Some(50))
}

/// Waits until the server has seen `count` subscription frames.
async fn await_frames(state: &FeedState, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.frames.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("mock feed never received the expected frames");
}

// -- CONNECTION LIFECYCLE ----------------------------------------------------------------------

#[rstest]
#[tokio::test]
async fn test_connect_requires_token() {
    let state = Arc::new(FeedState::default());
    let url = start_feed(state).await;

    let mut client = feed_client(&url, Arc::new(MemoryCredentialStore::new()));
    let err = client.connect().unwrap_err();
    assert!(matches!(err, SberryWsError::MissingToken));
    assert_eq!(client.status(), WebSocketStatus::Closed);
}

#[rstest]
#[tokio::test]
async fn test_connect_authenticates_with_token_query() {
    let state = Arc::new(FeedState::default());
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("token-abc"));
    client.connect().unwrap();
    client.wait_until_active(2.0).await.unwrap();

    assert!(client.is_active());
    assert_eq!(state.tokens.lock().unwrap().as_slice(), ["token-abc"]);

    client.disconnect().await;
    assert_eq!(client.status(), WebSocketStatus::Closed);
}

#[rstest]
#[tokio::test]
async fn test_disconnect_is_terminal() {
    let state = Arc::new(FeedState::default());
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("t"));
    client.connect().unwrap();
    client.wait_until_active(2.0).await.unwrap();
    client.subscribe(&[10]);
    await_frames(&state, 1).await;

    client.disconnect().await;
    assert!(client.subscribed_ids().is_empty());

    // Longer than the reconnect delay: no new connection may appear.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
}

// -- SUBSCRIPTION RECONCILIATION ---------------------------------------------------------------

#[rstest]
#[tokio::test]
async fn test_subscribe_flushes_and_confirms() {
    let state = Arc::new(FeedState::default());
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("t"));
    client.connect().unwrap();
    client.wait_until_active(2.0).await.unwrap();

    client.subscribe(&[20, 10]);
    await_frames(&state, 1).await;

    let frames = state.subscribe_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "warehouse_subscribe");
    assert_eq!(frames[0]["content"]["warehouseIds"], json!([10, 20]));
    assert_eq!(client.subscribed_ids(), vec![10, 20]);

    client.disconnect().await;
}

#[rstest]
#[tokio::test]
async fn test_resubscribe_confirmed_ids_sends_nothing() {
    let state = Arc::new(FeedState::default());
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("t"));
    client.connect().unwrap();
    client.wait_until_active(2.0).await.unwrap();

    client.subscribe(&[10, 20]);
    await_frames(&state, 1).await;

    // Already confirmed; the wire stays quiet.
    client.subscribe(&[10, 20]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.subscribe_frames().len(), 1);

    // A new id flushes alone.
    client.subscribe(&[10, 30]);
    await_frames(&state, 2).await;
    let frames = state.subscribe_frames();
    assert_eq!(frames[1]["content"]["warehouseIds"], json!([30]));
    assert_eq!(client.subscribed_ids(), vec![10, 20, 30]);

    client.disconnect().await;
}

#[rstest]
#[tokio::test]
async fn test_subscribe_before_connect_queues() {
    let state = Arc::new(FeedState::default());
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("t"));
    client.subscribe(&[10, 20]);
    assert!(client.subscribed_ids().is_empty());

    client.connect().unwrap();
    client.wait_until_active(2.0).await.unwrap();
    await_frames(&state, 1).await;

    assert_eq!(
        state.subscribe_frames()[0]["content"]["warehouseIds"],
        json!([10, 20]),
    );
    assert_eq!(client.subscribed_ids(), vec![10, 20]);

    client.disconnect().await;
}

#[rstest]
#[tokio::test]
async fn test_unsubscribe_noop_when_disconnected() {
    let state = Arc::new(FeedState::default());
    let url = start_feed(state.clone()).await;

    let client = feed_client(&url, seeded_store("t"));
    client.unsubscribe(&[10]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(state.frames().is_empty());
    assert_eq!(state.connections.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn test_unsubscribe_limited_to_confirmed_subset() {
    let state = Arc::new(FeedState::default());
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("t"));
    client.connect().unwrap();
    client.wait_until_active(2.0).await.unwrap();
    client.subscribe(&[10, 20]);
    await_frames(&state, 1).await;

    // 99 was never subscribed; only 10 goes on the wire.
    client.unsubscribe(&[10, 99]);
    await_frames(&state, 2).await;

    let frames = state.frames();
    assert_eq!(frames[1]["content"]["type"], "unsubscribe");
    assert_eq!(frames[1]["content"]["warehouseIds"], json!([10]));
    assert_eq!(client.subscribed_ids(), vec![20]);

    client.disconnect().await;
}

#[rstest]
#[tokio::test]
async fn test_unsubscribe_unknown_ids_sends_nothing() {
    let state = Arc::new(FeedState::default());
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("t"));
    client.connect().unwrap();
    client.wait_until_active(2.0).await.unwrap();

    client.unsubscribe(&[1, 2, 3]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(state.frames().is_empty());

    client.disconnect().await;
}

// -- EVENT DISPATCH ----------------------------------------------------------------------------

#[rstest]
#[tokio::test]
async fn test_stream_dispatches_readings_and_alarms() {
    let state = Arc::new(FeedState::default());
    state.push_on_subscribe.store(true, Ordering::SeqCst);
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("t"));
    client.connect().unwrap();
    let mut events = std::pin::pin!(client.stream());
    client.wait_until_active(2.0).await.unwrap();
    client.subscribe(&[10]);

    let mut opened = false;
    let mut reading = None;
    let mut alarm = None;
    // The unknown heartbeat frame must be dropped, so exactly three events
    // arrive for this session.
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(2), events.next())
            .await
            .expect("event stream stalled")
            .expect("event stream ended");
        match event {
            SberryWsEvent::Opened => opened = true,
            SberryWsEvent::Reading(r) => reading = Some(r),
            SberryWsEvent::Alarm(a) => alarm = Some(a),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert!(opened);
    let reading = reading.unwrap();
    assert_eq!(reading.warehouse_id, 10);
    assert_eq!(reading.temperature, -18.5);
    let alarm = alarm.unwrap();
    assert_eq!(alarm.alarm_message.as_deref(), Some("Temperature above maximum"));

    client.disconnect().await;
}

// -- RECONNECT POLICY --------------------------------------------------------------------------

#[rstest]
#[tokio::test]
async fn test_reconnect_restores_subscriptions() {
    let state = Arc::new(FeedState::default());
    state.drop_first_after_frame.store(true, Ordering::SeqCst);
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("t"));
    client.connect().unwrap();
    client.wait_until_active(2.0).await.unwrap();
    client.subscribe(&[10, 20]);

    // First connection dies right after the subscribe frame; the client must
    // reconnect and replay the whole confirmed set.
    await_frames(&state, 2).await;

    assert_eq!(state.connections.load(Ordering::SeqCst), 2);
    let frames = state.subscribe_frames();
    assert_eq!(frames[0]["content"]["warehouseIds"], json!([10, 20]));
    assert_eq!(frames[1]["content"]["warehouseIds"], json!([10, 20]));
    assert_eq!(client.subscribed_ids(), vec![10, 20]);

    client.disconnect().await;
}

#[rstest]
#[tokio::test]
async fn test_reconnect_attempts_bounded() {
    let state = Arc::new(FeedState::default());
    state.reject_upgrades.store(true, Ordering::SeqCst);
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("t"));
    client.connect().unwrap();

    // Initial attempt plus two retries, then the task stops for good.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(state.upgrade_requests.load(Ordering::SeqCst), 3);
    assert_eq!(client.status(), WebSocketStatus::Closed);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.upgrade_requests.load(Ordering::SeqCst), 3);
}

#[rstest]
#[tokio::test]
async fn test_manual_connect_resets_attempt_budget() {
    let state = Arc::new(FeedState::default());
    state.reject_upgrades.store(true, Ordering::SeqCst);
    let url = start_feed(state.clone()).await;

    let mut client = feed_client(&url, seeded_store("t"));
    client.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(state.upgrade_requests.load(Ordering::SeqCst), 3);

    // The feed recovers; an explicit connect starts a fresh budget.
    state.reject_upgrades.store(false, Ordering::SeqCst);
    client.connect().unwrap();
    client.wait_until_active(2.0).await.unwrap();
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);

    client.disconnect().await;
}
