use async_trait::async_trait;
use rust_decimal::Decimal;

use gateway_domain::market::Side;
use gateway_domain::order::{ClientOrderId, OrderType, TimeInForce};
use gateway_utils::cancellation_token::CancellationToken;

use crate::error::GatewayError;

/// No real account on this venue can margin or fund an order this large;
/// past this, a request is rejected locally as an early
/// insufficient-balance/margin signal rather than burning a round trip.
const MAX_PLAUSIBLE_QUANTITY: Decimal = rust_decimal_macros::dec!(1_000_000_000);

/// A single order placement request, shaped so one struct covers both the
/// spot and futures wire formats -- fields irrelevant to a given `order_type`
/// or market are simply left `None`.
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: ClientOrderId,
    pub reduce_only: bool,
    pub close_position: bool,
}

impl PlaceOrderRequest {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.symbol.is_empty() {
            return Err(GatewayError::Validation("symbol is required".to_owned()));
        }
        if self.order_type.requires_price() && self.price.is_none() {
            return Err(GatewayError::Validation(format!(
                "order type {} requires a price",
                self.order_type
            )));
        }
        if self.order_type.requires_stop_price() && self.stop_price.is_none() {
            return Err(GatewayError::Validation(format!(
                "order type {} requires a stopPrice",
                self.order_type
            )));
        }
        if self.quantity.is_none() && !self.close_position {
            return Err(GatewayError::Validation(
                "quantity is required unless closePosition=true".to_owned(),
            ));
        }
        if let Some(quantity) = self.quantity {
            if quantity > MAX_PLAUSIBLE_QUANTITY {
                return Err(GatewayError::Validation(format!(
                    "quantity {quantity} exceeds the plausible maximum {MAX_PLAUSIBLE_QUANTITY}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOrderResponse {
    pub order_id: i64,
    pub client_order_id: ClientOrderId,
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct CancelOrderRequest {
    pub symbol: String,
    pub order_id: Option<i64>,
    pub client_order_id: Option<ClientOrderId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: i64,
    pub client_order_id: ClientOrderId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
    pub executed_qty: Decimal,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountInfo {
    pub balances: Vec<AssetBalance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Domain facade over the signed REST transport plus the exchange-info
/// cache, scoped to one market (C6). One instance per market (spot,
/// futures); the bracket orchestrator selects between the two by
/// `req.is_futures`.
#[async_trait]
pub trait VenueClient: Send + Sync {
    async fn place_order(
        &self,
        request: PlaceOrderRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<PlaceOrderResponse, GatewayError>;

    async fn cancel_order(
        &self,
        request: CancelOrderRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<(), GatewayError>;

    async fn get_open_orders(
        &self,
        symbol: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<OpenOrder>, GatewayError>;

    /// Cached with a short TTL (~30s, double-checked under a lock): account
    /// reads are frequent and the venue rate-limits them.
    async fn get_account_info(
        &self,
        cancellation_token: &CancellationToken,
    ) -> Result<AccountInfo, GatewayError>;

    /// Rounds `price`/`quantity` through the market's exchange-info cache
    /// and validates notional. Used by the bracket orchestrator to normalize
    /// every leg before placement.
    async fn round_price(&self, symbol: &str, price: Decimal) -> Result<Decimal, GatewayError>;
    async fn round_quantity(&self, symbol: &str, quantity: Decimal) -> Result<Decimal, GatewayError>;
    async fn validate_notional(
        &self,
        symbol: &str,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<(), GatewayError>;

    fn is_futures(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_price_for_limit() {
        let req = PlaceOrderRequest {
            symbol: "BTCUSDT".to_owned(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: Some(Decimal::ONE),
            price: None,
            stop_price: None,
            time_in_force: Some(TimeInForce::Gtc),
            client_order_id: ClientOrderId::new("x"),
            reduce_only: false,
            close_position: false,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_allows_missing_quantity_when_close_position() {
        let req = PlaceOrderRequest {
            symbol: "BTCUSDT".to_owned(),
            side: Side::Sell,
            order_type: OrderType::StopMarket,
            quantity: None,
            price: None,
            stop_price: Some(Decimal::ONE),
            time_in_force: None,
            client_order_id: ClientOrderId::new("x"),
            reduce_only: true,
            close_position: true,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn validate_rejects_implausibly_large_quantity() {
        let req = PlaceOrderRequest {
            symbol: "BTCUSDT".to_owned(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: Some(MAX_PLAUSIBLE_QUANTITY + Decimal::ONE),
            price: None,
            stop_price: None,
            time_in_force: None,
            client_order_id: ClientOrderId::new("x"),
            reduce_only: false,
            close_position: false,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_stop_price_for_stop_types() {
        let req = PlaceOrderRequest {
            symbol: "BTCUSDT".to_owned(),
            side: Side::Sell,
            order_type: OrderType::StopLossLimit,
            quantity: Some(Decimal::ONE),
            price: Some(Decimal::ONE),
            stop_price: None,
            time_in_force: Some(TimeInForce::Gtc),
            client_order_id: ClientOrderId::new("x"),
            reduce_only: false,
            close_position: false,
        };
        assert!(req.validate().is_err());
    }
}
