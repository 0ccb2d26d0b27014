use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use gateway_domain::market::Market;
use gateway_domain::symbol_rule::SymbolRule;

use crate::error::GatewayError;

/// Fetches a whole fresh snapshot of symbol rules from the venue. Implemented
/// per-market by the venue client (C6); kept as a narrow capability here so
/// the cache itself stays venue-agnostic.
#[async_trait]
pub trait SymbolRuleSource: Send + Sync {
    async fn fetch_symbol_rules(&self, market: Market) -> Result<Vec<SymbolRule>, GatewayError>;
}

struct Snapshot {
    rules: Vec<SymbolRule>,
    fetched_at: Instant,
}

/// TTL-cached symbol rules plus the price/quantity rounding and notional
/// validation that depend on them (C5). A snapshot older than `ttl` is
/// refreshed under a write lock with double-checked staleness.
pub struct ExchangeInfoCache {
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl ExchangeInfoCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    fn is_stale(snapshot: &Option<Snapshot>, ttl: Duration) -> bool {
        match snapshot {
            None => true,
            Some(s) => s.fetched_at.elapsed() >= ttl,
        }
    }

    /// Snapshot-read; refreshes under a write lock with double-check when
    /// stale. Returns an error if the refreshed snapshot still lacks the
    /// symbol, or the entry's market doesn't match `market`.
    pub async fn get_symbol_rule(
        &self,
        source: &dyn SymbolRuleSource,
        symbol: &str,
        market: Market,
    ) -> Result<SymbolRule, GatewayError> {
        if Self::is_stale(&self.snapshot.read(), self.ttl) {
            self.refresh(source, market).await?;
        }

        let guard = self.snapshot.read();
        let rules = &guard
            .as_ref()
            .expect("snapshot populated by refresh above")
            .rules;
        Self::find(rules, symbol, market)
    }

    async fn refresh(
        &self,
        source: &dyn SymbolRuleSource,
        market: Market,
    ) -> Result<(), GatewayError> {
        // Double-check: another task may have refreshed between our first
        // staleness check and acquiring intent to refresh.
        if !Self::is_stale(&self.snapshot.read(), self.ttl) {
            return Ok(());
        }

        let rules = source.fetch_symbol_rules(market).await?;

        let mut guard = self.snapshot.write();
        if Self::is_stale(&guard, self.ttl) {
            *guard = Some(Snapshot {
                rules,
                fetched_at: Instant::now(),
            });
        }
        Ok(())
    }

    fn find(rules: &[SymbolRule], symbol: &str, market: Market) -> Result<SymbolRule, GatewayError> {
        rules
            .iter()
            .find(|r| r.symbol.eq_ignore_ascii_case(symbol) && r.market == market)
            .cloned()
            .ok_or_else(|| {
                GatewayError::Validation(format!(
                    "no symbol rule for {symbol} on market {market}"
                ))
            })
    }

    /// Clamp to `[minPrice, maxPrice]`, then round to the nearest integer
    /// multiple of `tickSize`; if `tickSize` is zero, round to
    /// `pricePrecision` decimal digits instead.
    pub fn round_price(rule: &SymbolRule, price: Decimal) -> Decimal {
        let clamped = clamp(price, rule.min_price, rule.max_price);

        if rule.tick_size.is_zero() {
            return clamped.round_dp(rule.price_precision);
        }

        round_to_multiple(clamped, rule.tick_size, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Clamp to `[minQuantity, maxQuantity]`, then floor to an integer
    /// multiple of `stepSize` -- never round up, the venue rejects oversize.
    pub fn round_quantity(rule: &SymbolRule, quantity: Decimal) -> Decimal {
        let clamped = clamp(quantity, rule.min_quantity, rule.max_quantity);

        if rule.step_size.is_zero() {
            return clamped.round_dp_with_strategy(rule.quantity_precision, RoundingStrategy::ToZero);
        }

        round_to_multiple(clamped, rule.step_size, RoundingStrategy::ToZero)
    }

    /// Rejects iff `price * quantity < minNotional`.
    pub fn validate_notional(
        rule: &SymbolRule,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<(), GatewayError> {
        let notional = price * quantity;
        if notional < rule.min_notional {
            return Err(GatewayError::Validation(format!(
                "MIN_NOTIONAL: order notional {notional} is below minimum {} for {}",
                rule.min_notional, rule.symbol
            )));
        }
        Ok(())
    }
}

fn clamp(value: Decimal, min: Decimal, max: Decimal) -> Decimal {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Rounds `value` to the nearest (or floor, depending on `strategy`) integer
/// multiple of `step`, computed by dividing into units of `step`, rounding
/// the unit count, then multiplying back.
fn round_to_multiple(value: Decimal, step: Decimal, strategy: RoundingStrategy) -> Decimal {
    let units = value / step;
    let rounded_units = units.round_dp_with_strategy(0, strategy);
    (rounded_units * step).normalize()
}

/// Precision hint used when a rule carries `tick_size`/`step_size` of zero
/// and we have to fall back to plain decimal-digit rounding.
pub fn decimal_places(value: Decimal) -> u32 {
    value.scale()
}

pub fn to_f64_lossy(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_rule(market: Market) -> SymbolRule {
        SymbolRule {
            symbol: "BTCUSDT".to_owned(),
            base_asset: "BTC".to_owned(),
            quote_asset: "USDT".to_owned(),
            status: "TRADING".to_owned(),
            price_precision: 2,
            quantity_precision: 5,
            min_price: dec!(0.01),
            max_price: dec!(1000000),
            tick_size: dec!(0.01),
            min_quantity: dec!(0.00001),
            max_quantity: dec!(9000),
            step_size: dec!(0.00001),
            min_notional: dec!(10),
            market,
        }
    }

    #[test]
    fn round_price_is_multiple_of_tick_and_close_to_input() {
        let rule = btc_rule(Market::Spot);
        let price = dec!(50000.017);
        let rounded = ExchangeInfoCache::round_price(&rule, price);

        assert_eq!(rounded % rule.tick_size, Decimal::ZERO);
        assert!((rounded - price).abs() <= rule.tick_size / dec!(2) + dec!(0.0001));
    }

    #[test]
    fn round_price_clamps_to_bounds() {
        let rule = btc_rule(Market::Spot);
        assert_eq!(
            ExchangeInfoCache::round_price(&rule, dec!(0.0001)),
            rule.min_price
        );
        assert_eq!(
            ExchangeInfoCache::round_price(&rule, dec!(9999999)),
            rule.max_price
        );
    }

    #[test]
    fn round_quantity_floors_and_never_exceeds_input() {
        let rule = btc_rule(Market::Spot);
        let qty = dec!(0.0019999);
        let rounded = ExchangeInfoCache::round_quantity(&rule, qty);

        assert!(rounded <= qty);
        assert_eq!(rounded % rule.step_size, Decimal::ZERO);
    }

    #[test]
    fn validate_notional_rejects_below_minimum() {
        let rule = btc_rule(Market::Spot);
        assert!(ExchangeInfoCache::validate_notional(&rule, dec!(1), dec!(1)).is_err());
        assert!(ExchangeInfoCache::validate_notional(&rule, dec!(50000), dec!(0.001)).is_ok());
    }

    #[test]
    fn validate_notional_accepts_exact_minimum() {
        let rule = btc_rule(Market::Spot);
        assert!(ExchangeInfoCache::validate_notional(&rule, dec!(10), dec!(1)).is_ok());
    }

    struct StaticSource(Vec<SymbolRule>);

    #[async_trait]
    impl SymbolRuleSource for StaticSource {
        async fn fetch_symbol_rules(&self, _market: Market) -> Result<Vec<SymbolRule>, GatewayError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn get_symbol_rule_refreshes_once_and_caches() {
        let cache = ExchangeInfoCache::new(Duration::from_secs(60));
        let source = StaticSource(vec![btc_rule(Market::Spot)]);

        let rule = cache
            .get_symbol_rule(&source, "BTCUSDT", Market::Spot)
            .await
            .expect("in test");
        assert_eq!(rule.symbol, "BTCUSDT");

        // second call hits the cache, no staleness-triggered refresh error
        let rule2 = cache
            .get_symbol_rule(&source, "btcusdt", Market::Spot)
            .await
            .expect("in test");
        assert_eq!(rule2.symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn get_symbol_rule_errors_on_unknown_symbol() {
        let cache = ExchangeInfoCache::new(Duration::from_secs(60));
        let source = StaticSource(vec![btc_rule(Market::Spot)]);

        let result = cache.get_symbol_rule(&source, "ETHUSDT", Market::Spot).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_symbol_rule_errors_on_market_mismatch() {
        let cache = ExchangeInfoCache::new(Duration::from_secs(60));
        let source = StaticSource(vec![btc_rule(Market::Spot)]);

        let result = cache.get_symbol_rule(&source, "BTCUSDT", Market::Futures).await;
        assert!(result.is_err());
    }
}
