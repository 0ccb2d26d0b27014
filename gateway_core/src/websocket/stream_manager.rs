use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use gateway_utils::cancellation_token::CancellationToken;
use gateway_utils::infrastructure::{spawn_future, SpawnFutureFlags};

use crate::websocket::connection::{ConnectionState, WebSocketConnection};

type Callback1<T> = Box<dyn Fn(T) + Send + Sync>;

/// Handlers the stream manager dispatches decoded events to. Each is
/// optional: a gateway subscribing only to the user-data stream never pays
/// for depth/ticker dispatch.
#[derive(Default)]
pub struct UserDataHandlers {
    pub on_execution_report: Option<Callback1<Value>>,
    pub on_account_update: Option<Callback1<Value>>,
    pub on_listen_key_expired: Option<Callback1<Value>>,
    pub on_depth_update: Option<Callback1<Value>>,
    pub on_ticker: Option<Callback1<Value>>,
    pub on_unmatched: Option<Callback1<Value>>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    e: Option<String>,
}

/// Subscription-state bookkeeping and event dispatch over a single
/// `WebSocketConnection` (C9). Detects a Disconnected->Connected transition
/// by polling connection state and resubscribes every previously-active
/// stream once reconnected.
pub struct StreamManager {
    connection: Arc<WebSocketConnection>,
    next_envelope_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<Value>>,
    subscriptions: Mutex<HashSet<String>>,
    handlers: Mutex<UserDataHandlers>,
}

impl StreamManager {
    pub fn new(
        connection: Arc<WebSocketConnection>,
        mut inbound: mpsc::UnboundedReceiver<String>,
        cancellation_token: CancellationToken,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            connection,
            next_envelope_id: AtomicU64::new(1),
            pending: DashMap::new(),
            subscriptions: Mutex::new(HashSet::new()),
            handlers: Mutex::new(UserDataHandlers::default()),
        });

        let dispatch_manager = manager.clone();
        let dispatch_token = cancellation_token.clone();
        spawn_future(
            "stream manager dispatch loop",
            SpawnFutureFlags::STOP_BY_TOKEN,
            async move {
                loop {
                    tokio::select! {
                        _ = dispatch_token.when_cancelled() => return Ok(()),
                        message = inbound.recv() => {
                            match message {
                                Some(text) => dispatch_manager.dispatch(&text),
                                None => return Ok(()),
                            }
                        }
                    }
                }
            },
            |_name, _reason| {},
            cancellation_token.clone(),
        );

        let resub_manager = manager.clone();
        let resub_token = cancellation_token.clone();
        spawn_future(
            "stream manager resubscribe watcher",
            SpawnFutureFlags::STOP_BY_TOKEN,
            async move { resub_manager.watch_for_reconnect(resub_token).await },
            |_name, _reason| {},
            cancellation_token,
        );

        manager
    }

    pub fn set_handlers(&self, handlers: UserDataHandlers) {
        *self.handlers.lock() = handlers;
    }

    /// Polls connection state every 100ms; on a Disconnected/Reconnecting ->
    /// Connected transition, snapshots the subscription set, clears it, and
    /// resubscribes every stream.
    async fn watch_for_reconnect(self: Arc<Self>, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let mut was_connected = self.connection.state() == ConnectionState::Connected;
        loop {
            tokio::select! {
                _ = cancellation_token.when_cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }

            let is_connected = self.connection.state() == ConnectionState::Connected;
            if is_connected && !was_connected {
                let streams: Vec<String> = {
                    let mut subs = self.subscriptions.lock();
                    let snapshot: Vec<String> = subs.iter().cloned().collect();
                    subs.clear();
                    snapshot
                };
                if !streams.is_empty() {
                    log::info!("websocket reconnected, resubscribing {} stream(s)", streams.len());
                    if let Err(err) = self.subscribe(streams).await {
                        log::error!("resubscribe after reconnect failed: {err}");
                    }
                }
            }
            was_connected = is_connected;
        }
    }

    fn next_id(&self) -> u64 {
        self.next_envelope_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Sends a `SUBSCRIBE` envelope and awaits the correlated response,
    /// recording every stream name as active on success.
    pub async fn subscribe(&self, streams: Vec<String>) -> Result<(), anyhow::Error> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let envelope = serde_json::json!({
            "method": "SUBSCRIBE",
            "params": streams,
            "id": id,
        });
        self.connection.send_text(envelope.to_string()).await?;

        match tokio::time::timeout(Duration::from_secs(10), rx).await {
            Ok(Ok(_response)) => {
                let mut subs = self.subscriptions.lock();
                subs.extend(streams);
                Ok(())
            }
            Ok(Err(_)) => Err(anyhow::anyhow!("subscribe response channel dropped")),
            Err(_) => {
                self.pending.remove(&id);
                Err(anyhow::anyhow!("subscribe request {id} timed out"))
            }
        }
    }

    pub async fn unsubscribe(&self, streams: Vec<String>) -> Result<(), anyhow::Error> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let envelope = serde_json::json!({
            "method": "UNSUBSCRIBE",
            "params": streams,
            "id": id,
        });
        self.connection.send_text(envelope.to_string()).await?;

        match tokio::time::timeout(Duration::from_secs(10), rx).await {
            Ok(Ok(_response)) => {
                let mut subs = self.subscriptions.lock();
                for stream in &streams {
                    subs.remove(stream);
                }
                Ok(())
            }
            Ok(Err(_)) => Err(anyhow::anyhow!("unsubscribe response channel dropped")),
            Err(_) => {
                self.pending.remove(&id);
                Err(anyhow::anyhow!("unsubscribe request {id} timed out"))
            }
        }
    }

    /// Correlates by envelope `id` first (subscribe/unsubscribe acks), then
    /// falls back to `{stream, data}` / `data.e` event-type routing.
    fn dispatch(&self, text: &str) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("failed to decode websocket frame: {err}");
                return;
            }
        };

        if let Some(id) = envelope.id {
            if let Some((_, sender)) = self.pending.remove(&id) {
                let _ = sender.send(envelope.data.clone().unwrap_or(Value::Null));
                return;
            }
        }

        let payload = envelope.data.clone().unwrap_or_else(|| {
            serde_json::from_str(text).unwrap_or(Value::Null)
        });
        let event_type = envelope
            .e
            .clone()
            .or_else(|| payload.get("e").and_then(Value::as_str).map(str::to_owned));

        let handlers = self.handlers.lock();
        match event_type.as_deref() {
            Some("executionReport") => call(&handlers.on_execution_report, payload),
            Some("outboundAccountPosition") | Some("outboundAccountInfo") => {
                call(&handlers.on_account_update, payload)
            }
            Some("listenKeyExpired") => call(&handlers.on_listen_key_expired, payload),
            Some("depthUpdate") => call(&handlers.on_depth_update, payload),
            Some("24hrTicker") => call(&handlers.on_ticker, payload),
            _ => call(&handlers.on_unmatched, payload),
        }
    }
}

fn call(handler: &Option<Callback1<Value>>, payload: Value) {
    if let Some(callback) = handler {
        callback(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::WebSocketSettings;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn dispatch_routes_execution_report_to_its_handler() {
        let (connection, inbound_rx) =
            WebSocketConnection::new("wss://example.invalid", "test", WebSocketSettings::default());
        let token = CancellationToken::new();
        let manager = StreamManager::new(connection, inbound_rx, token);

        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        manager.set_handlers(UserDataHandlers {
            on_execution_report: Some(Box::new(move |_value| {
                flag.store(true, Ordering::SeqCst);
            })),
            ..Default::default()
        });

        manager.dispatch(r#"{"e":"executionReport","s":"BTCUSDT"}"#);
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dispatch_routes_unmatched_events_to_fallback_handler() {
        let (connection, inbound_rx) =
            WebSocketConnection::new("wss://example.invalid", "test", WebSocketSettings::default());
        let token = CancellationToken::new();
        let manager = StreamManager::new(connection, inbound_rx, token);

        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        manager.set_handlers(UserDataHandlers {
            on_unmatched: Some(Box::new(move |_value| {
                flag.store(true, Ordering::SeqCst);
            })),
            ..Default::default()
        });

        manager.dispatch(r#"{"result":null,"id":999}"#);
        assert!(called.load(Ordering::SeqCst));
    }
}
