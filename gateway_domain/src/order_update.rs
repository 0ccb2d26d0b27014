use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::Side;
use crate::order::{ClientOrderId, OrderStatus, OrderType};

pub const ORDER_UPDATE_EVENT_TYPE: &str = "order_update.v1";

/// Emitted by the event emitter (C10) whenever an order changes state,
/// whether observed over the user-data WebSocket stream or synthesized
/// locally right after a successful REST placement. Monotonic in
/// `update_time` per `client_order_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdateEvent {
    pub event_type: &'static str,
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: ClientOrderId,
    pub status: OrderStatus,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
    pub executed_qty: Decimal,
    pub update_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OrderUpdateEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: String,
        order_id: i64,
        client_order_id: ClientOrderId,
        status: OrderStatus,
        side: Side,
        order_type: OrderType,
        price: Decimal,
        quantity: Decimal,
        executed_qty: Decimal,
        update_time: i64,
    ) -> Self {
        Self {
            event_type: ORDER_UPDATE_EVENT_TYPE,
            symbol,
            order_id,
            client_order_id,
            status,
            side,
            order_type,
            price,
            quantity,
            executed_qty,
            update_time,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
