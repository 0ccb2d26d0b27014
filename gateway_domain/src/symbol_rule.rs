use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::Market;

/// Per-symbol trading rules as published by the venue's exchange-info
/// endpoint: precision, price/quantity bounds and rounding granularity, and
/// the minimum notional. Refreshed as a whole snapshot by the exchange-info
/// cache; individual entries are never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRule {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub tick_size: Decimal,
    pub min_quantity: Decimal,
    pub max_quantity: Decimal,
    pub step_size: Decimal,
    pub min_notional: Decimal,
    pub market: Market,
}

impl SymbolRule {
    pub fn is_tradeable(&self) -> bool {
        self.status.eq_ignore_ascii_case("TRADING")
    }
}
