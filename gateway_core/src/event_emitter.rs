use std::time::Duration;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request};
use hyper_rustls::HttpsConnector;

use gateway_domain::order_update::OrderUpdateEvent;

/// Outbound hook for order-update events (C10). Emission is best-effort: a
/// failed emit never fails the originating order operation, it's only
/// logged.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: &OrderUpdateEvent);
}

/// POSTs the JSON event to a configured URL with a short timeout, accepting
/// 200/202 as success.
pub struct HttpEventEmitter {
    client: Client<HttpsConnector<HttpConnector>>,
    url: String,
    timeout: Duration,
}

impl HttpEventEmitter {
    pub fn new(url: impl Into<String>) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();

        Self {
            client: Client::builder().build(https),
            url: url.into(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl EventEmitter for HttpEventEmitter {
    async fn emit(&self, event: &OrderUpdateEvent) {
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(err) => {
                log::warn!("failed to serialize order_update.v1 event: {err:?}");
                return;
            }
        };

        let request = match Request::builder()
            .method(Method::POST)
            .uri(self.url.as_str())
            .header("content-type", "application/json")
            .body(Body::from(body))
        {
            Ok(req) => req,
            Err(err) => {
                log::warn!("failed to build event emitter request: {err:?}");
                return;
            }
        };

        let send = self.client.request(request);
        let outcome = tokio::select! {
            res = send => res.map_err(|e| e.to_string()),
            _ = tokio::time::sleep(self.timeout) => Err("emit timed out".to_owned()),
        };

        match outcome {
            Ok(response) if response.status().as_u16() == 200 || response.status().as_u16() == 202 => {}
            Ok(response) => {
                log::warn!(
                    "event emitter received non-success status {} for client_order_id {}",
                    response.status(),
                    event.client_order_id
                );
            }
            Err(err) => {
                log::warn!(
                    "event emitter failed for client_order_id {}: {err}",
                    event.client_order_id
                );
            }
        }
    }
}

/// Writes a structured log record instead of performing network I/O. Useful
/// as the default sink and in tests.
pub struct LogEventEmitter;

#[async_trait]
impl EventEmitter for LogEventEmitter {
    async fn emit(&self, event: &OrderUpdateEvent) {
        log::info!(
            "{} symbol={} client_order_id={} status={} executed_qty={}",
            event.event_type,
            event.symbol,
            event.client_order_id,
            event.status,
            event.executed_qty
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_domain::market::Side;
    use gateway_domain::order::{ClientOrderId, OrderStatus, OrderType};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct RecordingEmitter(Arc<Mutex<Vec<OrderUpdateEvent>>>);

    #[async_trait]
    impl EventEmitter for RecordingEmitter {
        async fn emit(&self, event: &OrderUpdateEvent) {
            self.0.lock().await.push(event.clone());
        }
    }

    #[tokio::test]
    async fn log_emitter_never_panics_on_any_event() {
        let emitter = LogEventEmitter;
        let event = OrderUpdateEvent::new(
            "BTCUSDT".to_owned(),
            1,
            ClientOrderId::new("abc_MAIN_1"),
            OrderStatus::New,
            Side::Buy,
            OrderType::Market,
            dec!(0),
            dec!(0.001),
            dec!(0),
            1,
        );
        emitter.emit(&event).await;
    }

    #[tokio::test]
    async fn recording_emitter_captures_emitted_events() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let emitter = RecordingEmitter(sink.clone());
        let event = OrderUpdateEvent::new(
            "BTCUSDT".to_owned(),
            1,
            ClientOrderId::new("abc_MAIN_1"),
            OrderStatus::New,
            Side::Buy,
            OrderType::Market,
            dec!(0),
            dec!(0.001),
            dec!(0),
            1,
        );
        emitter.emit(&event).await;

        let captured = sink.lock().await;
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].status, OrderStatus::New);
    }
}
