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

//! WebSocket client for the warehouse telemetry feed.
//!
//! The [`SberryWsClient`] owns a single persistent connection authenticated
//! with the access token at connect time. A dedicated Tokio task drives the
//! connection: on every transition into OPEN it settles briefly, moves the
//! confirmed subscription set back into pending, and flushes one subscribe
//! frame; on an unplanned close it schedules a fixed-delay reconnect until
//! the bounded attempt budget is exhausted. `disconnect()` is terminal and
//! clears all subscription state.

use std::{
    fmt::{Debug, Formatter},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::Duration,
};

use futures_util::{SinkExt, Stream, StreamExt, stream::SplitSink};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

use super::{
    error::{SberryWsError, SberryWsResult},
    messages::{SberryWsEvent, SberryWsMessage, parse_inbound, subscribe_frame, unsubscribe_frame},
    state::SubscriptionState,
};
use crate::common::{
    consts::{
        DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS, SBERRY_WS_URL,
        SUBSCRIPTION_SETTLE_DELAY_MS,
    },
    credential::CredentialStore,
    enums::WebSocketStatus,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Commands sent from the client handle to the connection task.
#[derive(Debug)]
enum HandlerCommand {
    /// Transmit the pending subscription set.
    Flush,
    /// Unsubscribe from the given warehouse ids.
    Unsubscribe(Vec<u64>),
    /// Close the connection and stop the task.
    Disconnect,
}

/// How a connected session ended.
enum SessionEnd {
    Manual,
    Dropped,
}

/// WebSocket client for the warehouse telemetry feed.
pub struct SberryWsClient {
    url: String,
    credentials: Arc<dyn CredentialStore>,
    status: Arc<AtomicU8>,
    signal: Arc<AtomicBool>,
    subscriptions: SubscriptionState,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
    settle_delay: Duration,
    cmd_tx: Option<tokio::sync::mpsc::UnboundedSender<HandlerCommand>>,
    out_rx: Option<tokio::sync::mpsc::UnboundedReceiver<SberryWsEvent>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Debug for SberryWsClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SberryWsClient")
            .field("url", &self.url)
            .field("status", &self.status())
            .field("confirmed", &self.subscriptions.confirmed_ids())
            .finish_non_exhaustive()
    }
}

impl SberryWsClient {
    /// Creates a new [`SberryWsClient`] instance.
    #[must_use]
    pub fn new(
        url: Option<String>,
        credentials: Arc<dyn CredentialStore>,
        max_reconnect_attempts: Option<u32>,
        reconnect_delay_ms: Option<u64>,
    ) -> Self {
        Self {
            url: url.unwrap_or_else(|| SBERRY_WS_URL.to_string()),
            credentials,
            status: Arc::new(AtomicU8::new(WebSocketStatus::Closed.as_u8())),
            signal: Arc::new(AtomicBool::new(false)),
            subscriptions: SubscriptionState::new(),
            reconnect_delay: Duration::from_millis(
                reconnect_delay_ms.unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            ),
            max_reconnect_attempts: max_reconnect_attempts
                .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            settle_delay: Duration::from_millis(SUBSCRIPTION_SETTLE_DELAY_MS),
            cmd_tx: None,
            out_rx: None,
            task_handle: None,
        }
    }

    /// Returns the configured WebSocket URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the current connection status.
    #[must_use]
    pub fn status(&self) -> WebSocketStatus {
        WebSocketStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    /// Returns whether the connection is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status() == WebSocketStatus::Open
    }

    /// Returns the warehouse ids the server has a subscription for.
    #[must_use]
    pub fn subscribed_ids(&self) -> Vec<u64> {
        self.subscriptions.confirmed_ids()
    }

    /// Connects to the telemetry feed and starts the connection task.
    ///
    /// A manual connect always starts a fresh reconnect budget, including
    /// after a previous task exhausted its attempts.
    ///
    /// # Errors
    ///
    /// Returns an error if no access token is stored.
    pub fn connect(&mut self) -> SberryWsResult<()> {
        if self.is_active() {
            tracing::warn!("Already connected");
            return Ok(());
        }
        if self.credentials.access_token().is_none() {
            tracing::warn!("No access token stored, refusing to connect");
            return Err(SberryWsError::MissingToken);
        }

        // Stop a stale task still waiting on its reconnect timer.
        self.signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }

        let signal = Arc::new(AtomicBool::new(false));
        self.signal = signal.clone();

        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
        let (out_tx, out_rx) = tokio::sync::mpsc::unbounded_channel();
        self.cmd_tx = Some(cmd_tx);
        self.out_rx = Some(out_rx);

        let ctx = ConnectionContext {
            url: self.url.clone(),
            credentials: self.credentials.clone(),
            status: self.status.clone(),
            signal,
            subscriptions: self.subscriptions.clone(),
            out_tx,
            reconnect_delay: self.reconnect_delay,
            max_reconnect_attempts: self.max_reconnect_attempts,
            settle_delay: self.settle_delay,
        };

        self.task_handle = Some(tokio::spawn(run_connection_loop(ctx, cmd_rx)));
        Ok(())
    }

    /// Disconnects and stops the connection task.
    ///
    /// Terminal: no reconnect is scheduled and both subscription sets are
    /// cleared.
    pub async fn disconnect(&mut self) {
        tracing::info!("Disconnecting");
        self.signal.store(true, Ordering::SeqCst);
        self.status
            .store(WebSocketStatus::Closing.as_u8(), Ordering::Relaxed);

        if let Some(cmd_tx) = &self.cmd_tx {
            let _ = cmd_tx.send(HandlerCommand::Disconnect);
        }
        if let Some(handle) = self.task_handle.take() {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                tracing::warn!("Connection task did not stop in time");
            }
        }

        self.subscriptions.clear();
        self.status
            .store(WebSocketStatus::Closed.as_u8(), Ordering::Relaxed);
    }

    /// Subscribes to warehouse temperature readings.
    ///
    /// Ids already confirmed are skipped. If connected, the pending set is
    /// flushed immediately; otherwise the ids stay queued until the next
    /// successful open.
    pub fn subscribe(&self, warehouse_ids: &[u64]) {
        self.subscriptions.queue(warehouse_ids);
        if self.is_active() {
            if let Some(cmd_tx) = &self.cmd_tx {
                let _ = cmd_tx.send(HandlerCommand::Flush);
            }
        }
    }

    /// Unsubscribes from warehouse temperature readings.
    ///
    /// Only ids actually confirmed are unsubscribed; a no-op while
    /// disconnected, since nothing is confirmed without a connection.
    pub fn unsubscribe(&self, warehouse_ids: &[u64]) {
        if !self.is_active() {
            tracing::warn!("Not connected, ignoring unsubscribe");
            return;
        }
        if let Some(cmd_tx) = &self.cmd_tx {
            let _ = cmd_tx.send(HandlerCommand::Unsubscribe(warehouse_ids.to_vec()));
        }
    }

    /// Returns the stream of connection and telemetry events.
    ///
    /// # Panics
    ///
    /// Panics if called before `connect()` or called twice for the same
    /// connection.
    pub fn stream(&mut self) -> impl Stream<Item = SberryWsEvent> + 'static {
        let mut out_rx = self
            .out_rx
            .take()
            .expect("Event stream receiver already taken or not connected");

        async_stream::stream! {
            while let Some(event) = out_rx.recv().await {
                yield event;
            }
        }
    }

    /// Waits until the connection is open or the timeout expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout expires before the connection opens.
    pub async fn wait_until_active(&self, timeout_secs: f64) -> SberryWsResult<()> {
        let timeout = Duration::from_secs_f64(timeout_secs);
        tokio::time::timeout(timeout, async {
            while !self.is_active() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .map_err(|_| {
            SberryWsError::Timeout(format!("Connection not open after {timeout_secs} seconds"))
        })
    }
}

/// State shared with the connection task.
struct ConnectionContext {
    url: String,
    credentials: Arc<dyn CredentialStore>,
    status: Arc<AtomicU8>,
    signal: Arc<AtomicBool>,
    subscriptions: SubscriptionState,
    out_tx: tokio::sync::mpsc::UnboundedSender<SberryWsEvent>,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
    settle_delay: Duration,
}

impl ConnectionContext {
    fn set_status(&self, status: WebSocketStatus) {
        self.status.store(status.as_u8(), Ordering::Relaxed);
    }

    fn status(&self) -> WebSocketStatus {
        WebSocketStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    fn emit(&self, event: SberryWsEvent) {
        // Consumer may have dropped the stream; events are best-effort.
        let _ = self.out_tx.send(event);
    }
}

/// Connection task: connect, reconcile subscriptions, pump frames, and
/// reconnect with bounded retries on unplanned closes.
async fn run_connection_loop(
    ctx: ConnectionContext,
    mut cmd_rx: tokio::sync::mpsc::UnboundedReceiver<HandlerCommand>,
) {
    let mut reconnect_attempts: u32 = 0;

    loop {
        if ctx.signal.load(Ordering::SeqCst) {
            break;
        }

        ctx.set_status(WebSocketStatus::Connecting);
        match connect_once(&ctx).await {
            Ok(stream) => {
                ctx.set_status(WebSocketStatus::Open);
                reconnect_attempts = 0;
                tracing::info!(url = %ctx.url, "Connected");
                ctx.emit(SberryWsEvent::Opened);

                let (mut write, mut read) = stream.split();

                // Let the server finish post-handshake bookkeeping before
                // the subscription set is replayed.
                tokio::time::sleep(ctx.settle_delay).await;
                ctx.subscriptions.requeue_confirmed();
                flush_pending(&mut write, &ctx).await;

                let end = session_loop(&mut write, &mut read, &mut cmd_rx, &ctx).await;
                ctx.set_status(WebSocketStatus::Closed);
                ctx.emit(SberryWsEvent::Closed);

                if matches!(end, SessionEnd::Manual) {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Connection attempt failed");
                ctx.set_status(WebSocketStatus::Closed);
                ctx.emit(SberryWsEvent::Error(e.to_string()));
                ctx.emit(SberryWsEvent::Closed);
            }
        }

        if ctx.signal.load(Ordering::SeqCst) {
            break;
        }

        // Reconnect policy: fixed delay, hard attempt ceiling.
        if reconnect_attempts >= ctx.max_reconnect_attempts {
            tracing::error!(
                attempts = reconnect_attempts,
                "Reconnect attempts exhausted, stopping"
            );
            break;
        }
        reconnect_attempts += 1;
        tracing::info!(
            attempt = reconnect_attempts,
            max = ctx.max_reconnect_attempts,
            "Scheduling reconnect"
        );

        tokio::select! {
            _ = tokio::time::sleep(ctx.reconnect_delay) => {}
            cmd = cmd_rx.recv() => {
                // Flushes queued while closed are handled on the next open.
                if matches!(cmd, None | Some(HandlerCommand::Disconnect)) {
                    break;
                }
            }
        }

        if ctx.signal.load(Ordering::SeqCst) {
            break;
        }
        // A manual disconnect or an external reconnect while the timer ran
        // suppresses this scheduled attempt.
        if ctx.status() != WebSocketStatus::Closed {
            break;
        }
    }

    ctx.set_status(WebSocketStatus::Closed);
    tracing::debug!("Connection task stopped");
}

/// Opens one connection, authenticating with the token currently stored.
async fn connect_once(ctx: &ConnectionContext) -> SberryWsResult<WsStream> {
    let token = ctx
        .credentials
        .access_token()
        .ok_or(SberryWsError::MissingToken)?;
    let url = format!("{}?token={}", ctx.url, urlencoding::encode(&token));

    let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
    Ok(stream)
}

/// Pumps commands and frames for one open connection.
async fn session_loop(
    write: &mut WsSink,
    read: &mut futures_util::stream::SplitStream<WsStream>,
    cmd_rx: &mut tokio::sync::mpsc::UnboundedReceiver<HandlerCommand>,
    ctx: &ConnectionContext,
) -> SessionEnd {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(HandlerCommand::Flush) => flush_pending(write, ctx).await,
                Some(HandlerCommand::Unsubscribe(ids)) => unsubscribe_confirmed(write, ctx, &ids).await,
                Some(HandlerCommand::Disconnect) | None => {
                    ctx.set_status(WebSocketStatus::Closing);
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Manual;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => dispatch_frame(ctx, &text),
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("Server closed the connection");
                    return SessionEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Transport error");
                    ctx.emit(SberryWsEvent::Error(e.to_string()));
                    return SessionEnd::Dropped;
                }
                None => return SessionEnd::Dropped,
            }
        }
    }
}

/// Transmits one subscribe frame carrying the whole pending set.
///
/// Transmitted ids move to confirmed; a failed send puts them back into
/// pending for the next flush.
async fn flush_pending(write: &mut WsSink, ctx: &ConnectionContext) {
    let batch = ctx.subscriptions.take_flush_batch();
    if batch.is_empty() {
        return;
    }

    match send_json(write, &subscribe_frame(batch.clone())).await {
        Ok(()) => {
            tracing::debug!(warehouse_ids = ?batch, "Subscribed");
            ctx.subscriptions.confirm(&batch);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Subscribe send failed, requeueing");
            ctx.subscriptions.requeue(&batch);
        }
    }
}

/// Transmits one unsubscribe frame for the confirmed subset of the request.
async fn unsubscribe_confirmed(write: &mut WsSink, ctx: &ConnectionContext, ids: &[u64]) {
    let batch = ctx.subscriptions.filter_confirmed(ids);
    if batch.is_empty() {
        return;
    }

    match send_json(write, &unsubscribe_frame(batch.clone())).await {
        Ok(()) => {
            tracing::debug!(warehouse_ids = ?batch, "Unsubscribed");
            ctx.subscriptions.remove_confirmed(&batch);
        }
        Err(e) => {
            // Server still holds the subscription; confirmed stays as-is.
            tracing::warn!(error = %e, "Unsubscribe send failed");
        }
    }
}

async fn send_json<T: serde::Serialize>(write: &mut WsSink, frame: &T) -> SberryWsResult<()> {
    let payload = serde_json::to_string(frame)?;
    write
        .send(Message::Text(payload.into()))
        .await
        .map_err(|e| SberryWsError::Send(e.to_string()))
}

/// Dispatches one inbound frame; unknown types and malformed payloads are
/// logged and dropped, never surfaced to the transport layer.
fn dispatch_frame(ctx: &ConnectionContext, text: &str) {
    match parse_inbound(text) {
        Ok(SberryWsMessage::Reading(reading)) => ctx.emit(SberryWsEvent::Reading(reading)),
        Ok(SberryWsMessage::Alarm(reading)) => ctx.emit(SberryWsEvent::Alarm(reading)),
        Ok(SberryWsMessage::Unknown { message_type, .. }) => {
            tracing::warn!(%message_type, "Unknown frame type, dropping");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse frame, dropping");
        }
    }
}
