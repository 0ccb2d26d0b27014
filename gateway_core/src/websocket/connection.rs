use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use gateway_utils::cancellation_token::CancellationToken;
use gateway_utils::infrastructure::{spawn_future, SpawnFutureFlags};
use gateway_utils::time::get_current_milliseconds;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct WebSocketSettings {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_attempts: 10,
        }
    }
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// A single reconnecting WebSocket connection (C8): state machine, ping/pong
/// liveness, and exponential backoff reconnect. All writes funnel through a
/// single mutex-guarded sink so concurrent callers never interleave frames.
pub struct WebSocketConnection {
    url: String,
    label: String,
    settings: WebSocketSettings,
    state: RwLock<ConnectionState>,
    writer: Mutex<Option<WsSink>>,
    last_pong_millis: AtomicU64,
    reconnect_attempts: AtomicU32,
    inbound: mpsc::UnboundedSender<String>,
}

impl WebSocketConnection {
    /// Returns the connection handle plus the receiving half of the inbound
    /// text-message channel; the caller (the stream manager) owns dispatch.
    pub fn new(
        url: impl Into<String>,
        label: impl Into<String>,
        settings: WebSocketSettings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            url: url.into(),
            label: label.into(),
            settings,
            state: RwLock::new(ConnectionState::Disconnected),
            writer: Mutex::new(None),
            last_pong_millis: AtomicU64::new(get_current_milliseconds() as u64),
            reconnect_attempts: AtomicU32::new(0),
            inbound: inbound_tx,
        });
        (connection, inbound_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Connects, rejecting a call made while already connected. Spawns the
    /// ping and read tasks and returns once the handshake completes.
    pub async fn connect(
        self: &Arc<Self>,
        cancellation_token: CancellationToken,
    ) -> Result<(), anyhow::Error> {
        if self.state() == ConnectionState::Connected {
            return Err(anyhow::anyhow!(
                "websocket '{}' is already connected",
                self.label
            ));
        }

        self.set_state(ConnectionState::Connecting);
        let (stream, response) = connect_async(&self.url).await?;
        log::info!(
            "websocket '{}' connected, http status {}",
            self.label,
            response.status()
        );

        let (sink, source) = stream.split();
        *self.writer.lock().await = Some(sink);
        self.last_pong_millis
            .store(get_current_milliseconds() as u64, Ordering::SeqCst);
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);

        let read_connection = self.clone();
        let read_token = cancellation_token.clone();
        let read_label = self.label.clone();
        spawn_future(
            "websocket read loop",
            SpawnFutureFlags::STOP_BY_TOKEN,
            async move {
                read_connection.read_loop(source, read_token).await;
                Ok(())
            },
            move |_name, _reason| {
                log::info!("websocket '{read_label}' read loop shut down");
            },
            cancellation_token.clone(),
        );

        let ping_connection = self.clone();
        let ping_token = cancellation_token.clone();
        let ping_label = self.label.clone();
        spawn_future(
            "websocket ping loop",
            SpawnFutureFlags::STOP_BY_TOKEN,
            async move {
                ping_connection.ping_loop(ping_token).await;
                Ok(())
            },
            move |_name, _reason| {
                log::info!("websocket '{ping_label}' ping loop shut down");
            },
            cancellation_token,
        );

        Ok(())
    }

    async fn read_loop(self: Arc<Self>, mut source: WsSource, cancellation_token: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancellation_token.when_cancelled() => return,
                frame = source.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            let _ = self.inbound.send(text);
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            self.last_pong_millis.store(get_current_milliseconds() as u64, Ordering::SeqCst);
                        }
                        Some(Ok(WsMessage::Ping(payload))) => {
                            let mut writer = self.writer.lock().await;
                            if let Some(sink) = writer.as_mut() {
                                let _ = sink.send(WsMessage::Pong(payload)).await;
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            log::warn!("websocket '{}' closed by peer: {:?}", self.label, frame);
                            self.handle_disconnect(cancellation_token.clone()).await;
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            log::warn!("websocket '{}' read error: {err}", self.label);
                            self.handle_disconnect(cancellation_token.clone()).await;
                            return;
                        }
                        None => {
                            self.handle_disconnect(cancellation_token.clone()).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn ping_loop(self: Arc<Self>, cancellation_token: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.ping_interval);
        loop {
            tokio::select! {
                _ = cancellation_token.when_cancelled() => return,
                _ = interval.tick() => {
                    if self.state() != ConnectionState::Connected {
                        return;
                    }

                    let since_pong = (get_current_milliseconds() as u64)
                        .saturating_sub(self.last_pong_millis.load(Ordering::SeqCst));
                    if since_pong > self.settings.pong_timeout.as_millis() as u64 {
                        log::warn!("websocket '{}' pong timeout, reconnecting", self.label);
                        self.handle_disconnect(cancellation_token.clone()).await;
                        return;
                    }

                    let mut writer = self.writer.lock().await;
                    if let Some(sink) = writer.as_mut() {
                        if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                            drop(writer);
                            self.handle_disconnect(cancellation_token.clone()).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// `reconnectInterval * 2^(attempts - 1)`, capped at 30s; gives up to
    /// `Disconnected` once `max_reconnect_attempts` is exceeded.
    async fn handle_disconnect(self: Arc<Self>, cancellation_token: CancellationToken) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        self.set_state(ConnectionState::Reconnecting);
        *self.writer.lock().await = None;

        loop {
            if cancellation_token.is_cancellation_requested() {
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.settings.max_reconnect_attempts {
                log::error!(
                    "websocket '{}' exceeded max reconnect attempts ({})",
                    self.label,
                    self.settings.max_reconnect_attempts
                );
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            let backoff = (self.settings.reconnect_interval.as_millis() as u64)
                .saturating_mul(1u64 << (attempt - 1).min(16))
                .min(30_000);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
                _ = cancellation_token.when_cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
            }

            match self.connect(cancellation_token.clone()).await {
                Ok(()) => return,
                Err(err) => {
                    log::warn!(
                        "websocket '{}' reconnect attempt {attempt} failed: {err}",
                        self.label
                    );
                }
            }
        }
    }

    pub async fn send_text(&self, message: String) -> Result<(), anyhow::Error> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(sink) => sink
                .send(WsMessage::Text(message))
                .await
                .map_err(|err| anyhow::anyhow!("websocket '{}' send failed: {err}", self.label)),
            None => Err(anyhow::anyhow!("websocket '{}' is not connected", self.label)),
        }
    }

    /// Idempotent: a second call on an already-closed connection is a no-op.
    pub async fn close(&self) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        self.set_state(ConnectionState::Closed);
        let mut writer = self.writer.lock().await;
        if let Some(sink) = writer.as_mut() {
            let _ = sink
                .send(WsMessage::Close(Some(CloseFrame {
                    code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Normal,
                    reason: "closing".into(),
                })))
                .await;
        }
        *writer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_documented_values() {
        let settings = WebSocketSettings::default();
        assert_eq!(settings.ping_interval, Duration::from_secs(30));
        assert_eq!(settings.pong_timeout, Duration::from_secs(60));
        assert_eq!(settings.max_reconnect_attempts, 10);
    }

    #[tokio::test]
    async fn fresh_connection_starts_disconnected() {
        let (connection, _rx) = WebSocketConnection::new(
            "wss://example.invalid/stream",
            "test",
            WebSocketSettings::default(),
        );
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_text_without_connecting_is_an_error() {
        let (connection, _rx) = WebSocketConnection::new(
            "wss://example.invalid/stream",
            "test",
            WebSocketSettings::default(),
        );
        assert!(connection.send_text("{}".to_owned()).await.is_err());
    }

    #[tokio::test]
    async fn close_before_connect_is_idempotent() {
        let (connection, _rx) = WebSocketConnection::new(
            "wss://example.invalid/stream",
            "test",
            WebSocketSettings::default(),
        );
        connection.close().await;
        connection.close().await;
        assert_eq!(connection.state(), ConnectionState::Closed);
    }
}
