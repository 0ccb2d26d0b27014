use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use gateway_domain::market::Side;
use gateway_domain::order::{ClientOrderId, OrderStatus, OrderType};
use gateway_domain::order_update::OrderUpdateEvent;
use gateway_utils::cancellation_token::CancellationToken;
use gateway_utils::infrastructure::{spawn_future, SpawnFutureFlags};
use gateway_utils::time::get_current_milliseconds;
use gateway_utils::value_to_decimal::GetOrErr;

use crate::error::GatewayError;
use crate::event_emitter::EventEmitter;
use crate::websocket::connection::{WebSocketConnection, WebSocketSettings};
use crate::websocket::stream_manager::{StreamManager, UserDataHandlers};

/// Binance requires a listen key refresh at least once every 60 minutes;
/// the source keeps its own key alive well inside that window.
const LISTEN_KEY_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Mints and refreshes the opaque listen key that authorizes a user-data
/// WebSocket subscription. Implemented per-market by the venue client so
/// this module stays venue-agnostic, mirroring
/// [`crate::exchange_info::SymbolRuleSource`].
#[async_trait]
pub trait ListenKeySource: Send + Sync {
    async fn request_listen_key(&self) -> Result<String, GatewayError>;
    async fn keepalive_listen_key(&self, listen_key: &str) -> Result<(), GatewayError>;
}

/// Owns the user-data WebSocket connection for one market (C8+C9 wired to
/// C10): mints a listen key, connects to `{ws_host}/ws/{listenKey}`, keeps
/// the key alive, and translates `executionReport` frames into
/// `order_update.v1` events. User-data streams carry events immediately --
/// there is no SUBSCRIBE envelope to send, unlike the public stream manager.
pub struct UserDataStreamSupervisor {
    ws_host: String,
    source: Arc<dyn ListenKeySource>,
    emitter: Arc<dyn EventEmitter>,
}

impl UserDataStreamSupervisor {
    pub fn new(
        ws_host: impl Into<String>,
        source: Arc<dyn ListenKeySource>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            ws_host: ws_host.into(),
            source,
            emitter,
        }
    }

    /// Requests an initial listen key, connects, wires the execution-report
    /// handler, and spawns the keepalive ticker. Returns once the initial
    /// connection attempt has been issued; reconnects happen in the
    /// background per [`WebSocketConnection`]'s own policy.
    pub async fn start(
        self: Arc<Self>,
        cancellation_token: CancellationToken,
    ) -> Result<(), GatewayError> {
        let listen_key = self.source.request_listen_key().await?;
        let url = format!("{}/ws/{listen_key}", self.ws_host);
        let (connection, inbound) =
            WebSocketConnection::new(url, "user-data-stream", WebSocketSettings::default());

        connection
            .connect(cancellation_token.clone())
            .await
            .map_err(|err| GatewayError::Validation(format!("user-data stream connect failed: {err}")))?;

        let manager = StreamManager::new(connection, inbound, cancellation_token.clone());
        let emitter = self.emitter.clone();
        manager.set_handlers(UserDataHandlers {
            on_execution_report: Some(Box::new(move |payload| {
                let emitter = emitter.clone();
                let event = match execution_report_to_event(&payload) {
                    Ok(event) => event,
                    Err(err) => {
                        log::warn!("failed to decode executionReport: {err}");
                        return;
                    }
                };
                tokio::spawn(async move {
                    emitter.emit(&event).await;
                });
            })),
            on_listen_key_expired: Some(Box::new(|_payload| {
                log::warn!("user-data stream listen key expired; relying on ping/pong liveness to reconnect");
            })),
            ..Default::default()
        });

        let keepalive_source = self.source.clone();
        let keepalive_key = listen_key;
        let keepalive_token = cancellation_token.clone();
        spawn_future(
            "user-data stream listen key keepalive",
            SpawnFutureFlags::STOP_BY_TOKEN,
            async move {
                let mut interval = tokio::time::interval(LISTEN_KEY_KEEPALIVE_INTERVAL);
                loop {
                    tokio::select! {
                        _ = keepalive_token.when_cancelled() => return Ok(()),
                        _ = interval.tick() => {
                            if let Err(err) = keepalive_source.keepalive_listen_key(&keepalive_key).await {
                                log::warn!("listen key keepalive failed: {err}");
                            }
                        }
                    }
                }
            },
            |_name, _reason| {},
            cancellation_token,
        );

        Ok(())
    }
}

fn execution_report_to_event(payload: &Value) -> Result<OrderUpdateEvent, anyhow::Error> {
    let symbol = payload.get_as_str("s")?;
    let client_order_id = payload.get_as_str("c")?;
    let side = parse_side(&payload.get_as_str("S")?)?;
    let order_type = parse_order_type(&payload.get_as_str("o")?)?;
    let status = parse_status(&payload.get_as_str("X")?);
    let order_id = payload.get_as_i64("i")?;
    let price = payload.get_as_decimal("p").unwrap_or(Decimal::ZERO);
    let quantity = payload.get_as_decimal("q").unwrap_or(Decimal::ZERO);
    let executed_qty = payload.get_as_decimal("z").unwrap_or(Decimal::ZERO);
    let update_time = payload
        .get("E")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| get_current_milliseconds() as i64);

    Ok(OrderUpdateEvent::new(
        symbol,
        order_id,
        ClientOrderId::new(client_order_id),
        status,
        side,
        order_type,
        price,
        quantity,
        executed_qty,
        update_time,
    ))
}

fn parse_side(raw: &str) -> Result<Side, anyhow::Error> {
    match raw {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(anyhow::anyhow!("unrecognized order side '{other}'")),
    }
}

fn parse_order_type(raw: &str) -> Result<OrderType, anyhow::Error> {
    match raw {
        "MARKET" => Ok(OrderType::Market),
        "LIMIT" => Ok(OrderType::Limit),
        "STOP_LOSS_LIMIT" => Ok(OrderType::StopLossLimit),
        "TAKE_PROFIT_LIMIT" => Ok(OrderType::TakeProfitLimit),
        "STOP_MARKET" => Ok(OrderType::StopMarket),
        other => Err(anyhow::anyhow!("unrecognized order type '{other}'")),
    }
}

fn parse_status(raw: &str) -> OrderStatus {
    match raw {
        "NEW" => OrderStatus::New,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" => OrderStatus::Canceled,
        "REJECTED" => OrderStatus::Rejected,
        "EXPIRED" => OrderStatus::Expired,
        _ => OrderStatus::New,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn execution_report_to_event_maps_binance_field_codes() {
        let payload = json!({
            "e": "executionReport",
            "s": "BTCUSDT",
            "c": "abc_MAIN_1",
            "S": "BUY",
            "o": "LIMIT",
            "X": "FILLED",
            "i": 42,
            "p": "50000.00",
            "q": "0.001",
            "z": "0.001",
            "E": 1_700_000_000_000i64,
        });

        let event = execution_report_to_event(&payload).expect("should decode");
        assert_eq!(event.symbol, "BTCUSDT");
        assert_eq!(event.client_order_id.as_str(), "abc_MAIN_1");
        assert_eq!(event.side, Side::Buy);
        assert_eq!(event.order_type, OrderType::Limit);
        assert_eq!(event.status, OrderStatus::Filled);
        assert_eq!(event.order_id, 42);
        assert_eq!(event.price, dec!(50000.00));
        assert_eq!(event.executed_qty, dec!(0.001));
        assert_eq!(event.update_time, 1_700_000_000_000);
    }

    #[test]
    fn execution_report_to_event_rejects_unrecognized_side() {
        let payload = json!({
            "s": "BTCUSDT", "c": "x", "S": "SIDEWAYS", "o": "LIMIT", "X": "NEW", "i": 1,
        });
        assert!(execution_report_to_event(&payload).is_err());
    }
}
