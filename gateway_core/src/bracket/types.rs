use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gateway_domain::market::{Market, Side};
use gateway_domain::order::ClientOrderId;

use crate::error::GatewayError;

/// Request to place a coordinated bracket: one entry leg, one or more
/// take-profit legs, and a stop-loss leg.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBracketRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    /// Zero means a market entry.
    #[serde(default)]
    pub entry_price: Decimal,
    pub take_profit_prices: Vec<Decimal>,
    pub stop_loss_price: Decimal,
    #[serde(default)]
    pub is_futures: bool,
    /// Overrides the inferred entry order type (MARKET when entry_price is
    /// zero, else LIMIT).
    #[serde(default)]
    pub order_type: Option<String>,
}

impl PlaceBracketRequest {
    /// Validates the creation-time invariants from the data model. Rejects
    /// with a precise message on the first violation found.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.symbol.is_empty() {
            return Err(GatewayError::Validation("symbol is required".to_owned()));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(GatewayError::Validation(
                "quantity must be greater than zero".to_owned(),
            ));
        }
        if self.take_profit_prices.is_empty() {
            return Err(GatewayError::Validation(
                "at least one take-profit price is required".to_owned(),
            ));
        }
        if self.take_profit_prices.iter().any(|p| *p <= Decimal::ZERO) {
            return Err(GatewayError::Validation(
                "every take-profit price must be greater than zero".to_owned(),
            ));
        }
        if self.stop_loss_price <= Decimal::ZERO {
            return Err(GatewayError::Validation(
                "stopLossPrice must be greater than zero".to_owned(),
            ));
        }

        if self.entry_price > Decimal::ZERO {
            match self.side {
                Side::Buy => {
                    if self.stop_loss_price >= self.entry_price {
                        return Err(GatewayError::Validation(
                            "for BUY, stopLossPrice must be below entryPrice".to_owned(),
                        ));
                    }
                    if self.take_profit_prices.iter().any(|p| *p <= self.entry_price) {
                        return Err(GatewayError::Validation(
                            "for BUY, every take-profit price must be above entryPrice".to_owned(),
                        ));
                    }
                }
                Side::Sell => {
                    if self.stop_loss_price <= self.entry_price {
                        return Err(GatewayError::Validation(
                            "for SELL, stopLossPrice must be above entryPrice".to_owned(),
                        ));
                    }
                    if self.take_profit_prices.iter().any(|p| *p >= self.entry_price) {
                        return Err(GatewayError::Validation(
                            "for SELL, every take-profit price must be below entryPrice".to_owned(),
                        ));
                    }
                }
            }
        } else {
            // market entry: TP/SL ordering relative to a fill price can't be
            // checked up front, only relative to each other.
            match self.side {
                Side::Buy if self.stop_loss_price >= *self
                    .take_profit_prices
                    .iter()
                    .min()
                    .expect("validated non-empty above") =>
                {
                    return Err(GatewayError::Validation(
                        "for BUY, stopLossPrice must be below every take-profit price".to_owned(),
                    ));
                }
                Side::Sell if self.stop_loss_price <= *self
                    .take_profit_prices
                    .iter()
                    .max()
                    .expect("validated non-empty above") =>
                {
                    return Err(GatewayError::Validation(
                        "for SELL, stopLossPrice must be above every take-profit price".to_owned(),
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIds {
    pub main: ClientOrderId,
    pub take_profits: Vec<ClientOrderId>,
    pub stop_loss: ClientOrderId,
}

/// A bracket order record, owned by the orchestrator for the lifetime of the
/// process.
#[derive(Debug, Clone)]
pub struct BracketOrder {
    pub id: Uuid,
    pub symbol: String,
    pub market: Market,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub take_profit_prices: Vec<Decimal>,
    pub stop_loss_price: Decimal,
    pub client_ids: ClientIds,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBracketResponse {
    pub bracket_order_id: Uuid,
    pub client_order_ids: ClientIds,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partial_failure: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// One leg's failure, tagged by which leg it was.
#[derive(Debug, Clone)]
pub struct LegError {
    pub order_type: String,
    pub error: GatewayError,
}

pub const MAIN_LEG: &str = "MAIN";

/// Bundles per-leg placement errors. `has_critical_error` is true iff any
/// entry has `order_type == "MAIN"` -- that's what distinguishes an aborted
/// bracket from a partial-failure response.
#[derive(Debug, Clone, Default)]
pub struct BracketOrderError {
    pub legs: Vec<LegError>,
}

impl BracketOrderError {
    pub fn push(&mut self, order_type: impl Into<String>, error: GatewayError) {
        self.legs.push(LegError {
            order_type: order_type.into(),
            error,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.legs.is_empty()
    }

    pub fn has_critical_error(&self) -> bool {
        self.legs.iter().any(|leg| leg.order_type == MAIN_LEG)
    }

    /// The classified error's bare text for the MAIN leg, if it failed --
    /// this is what the HTTP layer surfaces for a critical failure, matching
    /// the "never surface stack traces, just the classified error's text"
    /// rule (never a leg-tagged `to_messages()` line).
    pub fn critical_message(&self) -> Option<String> {
        self.legs
            .iter()
            .find(|leg| leg.order_type == MAIN_LEG)
            .map(|leg| leg.error.message())
    }

    pub fn to_messages(&self) -> Vec<String> {
        self.legs
            .iter()
            .map(|leg| format!("{}: {}", leg.order_type, leg.error.message()))
            .collect()
    }
}

impl std::fmt::Display for BracketOrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_messages().join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_request() -> PlaceBracketRequest {
        PlaceBracketRequest {
            symbol: "BTCUSDT".to_owned(),
            side: Side::Buy,
            quantity: dec!(0.001),
            entry_price: dec!(50000),
            take_profit_prices: vec![dec!(51000)],
            stop_loss_price: dec!(49000),
            is_futures: false,
            order_type: None,
        }
    }

    #[test]
    fn valid_buy_bracket_passes() {
        assert!(base_request().validate().is_ok());
    }

    #[test]
    fn buy_rejects_stop_loss_above_entry() {
        let mut req = base_request();
        req.stop_loss_price = dec!(50500);
        assert!(req.validate().is_err());
    }

    #[test]
    fn buy_rejects_take_profit_below_entry() {
        let mut req = base_request();
        req.take_profit_prices = vec![dec!(49500)];
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_zero_quantity() {
        let mut req = base_request();
        req.quantity = Decimal::ZERO;
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_empty_take_profits() {
        let mut req = base_request();
        req.take_profit_prices = vec![];
        assert!(req.validate().is_err());
    }

    #[test]
    fn market_entry_only_checks_relative_ordering() {
        let mut req = base_request();
        req.entry_price = Decimal::ZERO;
        assert!(req.validate().is_ok());

        req.stop_loss_price = dec!(52000);
        assert!(req.validate().is_err());
    }

    #[test]
    fn sell_bracket_validates_opposite_direction() {
        let req = PlaceBracketRequest {
            symbol: "BTCUSDT".to_owned(),
            side: Side::Sell,
            quantity: dec!(0.001),
            entry_price: dec!(50000),
            take_profit_prices: vec![dec!(49000)],
            stop_loss_price: dec!(51000),
            is_futures: false,
            order_type: None,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn bracket_order_error_critical_iff_main_present() {
        let mut err = BracketOrderError::default();
        assert!(!err.has_critical_error());

        err.push("SL", GatewayError::Validation("MIN_NOTIONAL".to_owned()));
        assert!(!err.has_critical_error());
        assert!(err.has_errors());

        err.push(MAIN_LEG, GatewayError::Validation("insufficient balance".to_owned()));
        assert!(err.has_critical_error());
    }

    #[test]
    fn critical_message_is_the_bare_main_leg_text() {
        let mut err = BracketOrderError::default();
        assert_eq!(err.critical_message(), None);

        err.push(MAIN_LEG, GatewayError::Validation("insufficient balance".to_owned()));
        assert_eq!(err.critical_message(), Some("insufficient balance".to_owned()));
    }
}
