use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use gateway_core::venue_client::{AccountInfo, AssetBalance, OpenOrder, PlaceOrderResponse};
use gateway_domain::market::{Market, Side};
use gateway_domain::order::{ClientOrderId, OrderType};
use gateway_domain::symbol_rule::SymbolRule;
use gateway_utils::value_to_decimal::GetOrErr;

/// Parses `GET .../exchangeInfo` into the rule set the exchange-info cache
/// keys off. Symbols carrying a `"_<number>"` suffix (Binance's marker for a
/// delisted/legacy symbol code) or not currently `TRADING` are dropped.
pub fn parse_exchange_info(body: &str, market: Market) -> Result<Vec<SymbolRule>> {
    let parsed: Value = serde_json::from_str(body).context("unable to parse exchangeInfo response")?;
    let symbols = parsed
        .get("symbols")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("exchangeInfo response is missing a symbols array"))?;

    let mut rules = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol_code = symbol.get_as_str("symbol")?;
        let status = symbol.get_as_str("status")?;
        if symbol_code.contains('_') || !status.eq_ignore_ascii_case("TRADING") {
            continue;
        }

        let base_asset = symbol.get_as_str("baseAsset")?;
        let quote_asset = symbol.get_as_str("quoteAsset")?;

        let mut min_price = None;
        let mut max_price = None;
        let mut tick_size = None;
        let mut min_quantity = None;
        let mut max_quantity = None;
        let mut step_size = None;
        let mut min_notional = None;

        let filters = symbol
            .get("filters")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("symbol {symbol_code} is missing a filters array"))?;
        for filter in filters {
            match filter.get_as_str("filterType")?.as_str() {
                "PRICE_FILTER" => {
                    min_price = filter.get_as_decimal("minPrice");
                    max_price = filter.get_as_decimal("maxPrice");
                    tick_size = filter.get_as_decimal("tickSize");
                }
                "LOT_SIZE" => {
                    min_quantity = filter.get_as_decimal("minQty");
                    max_quantity = filter.get_as_decimal("maxQty");
                    step_size = filter.get_as_decimal("stepSize");
                }
                "MIN_NOTIONAL" => {
                    min_notional = if market.is_futures() {
                        filter.get_as_decimal("notional")
                    } else {
                        filter.get_as_decimal("minNotional")
                    };
                }
                _ => {}
            }
        }

        let price_precision = decimal_places(tick_size);
        let quantity_precision = decimal_places(step_size);

        rules.push(SymbolRule {
            symbol: symbol_code,
            base_asset,
            quote_asset,
            status,
            price_precision,
            quantity_precision,
            min_price: min_price.unwrap_or(Decimal::ZERO),
            max_price: max_price.unwrap_or(Decimal::MAX),
            tick_size: tick_size.unwrap_or(Decimal::ZERO),
            min_quantity: min_quantity.unwrap_or(Decimal::ZERO),
            max_quantity: max_quantity.unwrap_or(Decimal::MAX),
            step_size: step_size.unwrap_or(Decimal::ZERO),
            min_notional: min_notional.unwrap_or(Decimal::ZERO),
            market,
        });
    }

    Ok(rules)
}

fn decimal_places(step: Option<Decimal>) -> u32 {
    step.map(|s| s.normalize().scale()).unwrap_or(0)
}

pub fn parse_side(raw: &str) -> Result<Side> {
    match raw {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => bail!("unrecognized order side '{other}'"),
    }
}

pub fn parse_order_type(raw: &str) -> Result<OrderType> {
    match raw {
        "MARKET" => Ok(OrderType::Market),
        "LIMIT" => Ok(OrderType::Limit),
        "STOP_LOSS_LIMIT" => Ok(OrderType::StopLossLimit),
        "TAKE_PROFIT_LIMIT" => Ok(OrderType::TakeProfitLimit),
        "STOP_MARKET" => Ok(OrderType::StopMarket),
        other => bail!("unrecognized order type '{other}'"),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResponse {
    order_id: i64,
    client_order_id: String,
    symbol: String,
    status: String,
}

pub fn parse_place_order_response(body: &str) -> Result<PlaceOrderResponse> {
    let parsed: CreateOrderResponse =
        serde_json::from_str(body).context("unable to parse order placement response")?;
    Ok(PlaceOrderResponse {
        order_id: parsed.order_id,
        client_order_id: ClientOrderId::new(parsed.client_order_id),
        symbol: parsed.symbol,
        status: parsed.status,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrderEntry {
    order_id: i64,
    client_order_id: String,
    symbol: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    price: Decimal,
    orig_qty: Decimal,
    executed_qty: Decimal,
    status: String,
}

pub fn parse_open_orders(body: &str) -> Result<Vec<OpenOrder>> {
    let entries: Vec<OpenOrderEntry> =
        serde_json::from_str(body).context("unable to parse open orders response")?;

    entries
        .into_iter()
        .map(|entry| {
            Ok(OpenOrder {
                order_id: entry.order_id,
                client_order_id: ClientOrderId::new(entry.client_order_id),
                symbol: entry.symbol,
                side: parse_side(&entry.side)?,
                order_type: parse_order_type(&entry.order_type)?,
                price: entry.price,
                quantity: entry.orig_qty,
                executed_qty: entry.executed_qty,
                status: entry.status,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SpotBalance {
    asset: String,
    free: Decimal,
    locked: Decimal,
}

#[derive(Debug, Deserialize)]
struct SpotAccountInfo {
    balances: Vec<SpotBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesAsset {
    asset: String,
    available_balance: Decimal,
    wallet_balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct FuturesAccountInfo {
    assets: Vec<FuturesAsset>,
}

pub fn parse_listen_key(body: &str) -> Result<String> {
    let parsed: Value = serde_json::from_str(body).context("unable to parse listen key response")?;
    parsed
        .get("listenKey")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("listen key response is missing the listenKey field"))
}

pub fn parse_account_info(body: &str, market: Market) -> Result<AccountInfo> {
    if market.is_futures() {
        let parsed: FuturesAccountInfo =
            serde_json::from_str(body).context("unable to parse futures account response")?;
        let balances = parsed
            .assets
            .into_iter()
            .map(|asset| AssetBalance {
                free: asset.available_balance,
                locked: asset.wallet_balance - asset.available_balance,
                asset: asset.asset,
            })
            .collect();
        Ok(AccountInfo { balances })
    } else {
        let parsed: SpotAccountInfo =
            serde_json::from_str(body).context("unable to parse spot account response")?;
        let balances = parsed
            .balances
            .into_iter()
            .map(|balance| AssetBalance {
                asset: balance.asset,
                free: balance.free,
                locked: balance.locked,
            })
            .collect();
        Ok(AccountInfo { balances })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXCHANGE_INFO: &str = r#"{
        "symbols": [
            {
                "symbol": "BTCUSDT",
                "status": "TRADING",
                "baseAsset": "BTC",
                "quoteAsset": "USDT",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "0.01", "maxPrice": "1000000.00", "tickSize": "0.01"},
                    {"filterType": "LOT_SIZE", "minQty": "0.00001", "maxQty": "9000.00000000", "stepSize": "0.00001"},
                    {"filterType": "MIN_NOTIONAL", "minNotional": "10.00000000"}
                ]
            },
            {
                "symbol": "OLDCOIN_1",
                "status": "TRADING",
                "baseAsset": "OLD",
                "quoteAsset": "USDT",
                "filters": []
            },
            {
                "symbol": "BREAK",
                "status": "BREAK",
                "baseAsset": "BRK",
                "quoteAsset": "USDT",
                "filters": []
            }
        ]
    }"#;

    #[test]
    fn parses_tradeable_symbol_and_skips_legacy_and_halted() {
        let rules = parse_exchange_info(EXCHANGE_INFO, Market::Spot).expect("should parse");
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.symbol, "BTCUSDT");
        assert_eq!(rule.tick_size.to_string(), "0.01");
        assert_eq!(rule.min_notional.to_string(), "10.00000000");
    }

    #[test]
    fn futures_min_notional_reads_notional_field() {
        let body = r#"{
            "symbols": [{
                "symbol": "BTCUSDT",
                "status": "TRADING",
                "baseAsset": "BTC",
                "quoteAsset": "USDT",
                "filters": [
                    {"filterType": "MIN_NOTIONAL", "notional": "5.00000000"}
                ]
            }]
        }"#;
        let rules = parse_exchange_info(body, Market::Futures).expect("should parse");
        assert_eq!(rules[0].min_notional.to_string(), "5.00000000");
    }

    #[test]
    fn parses_place_order_response() {
        let body = r#"{"orderId":123,"clientOrderId":"entry-1","symbol":"BTCUSDT","status":"NEW"}"#;
        let response = parse_place_order_response(body).expect("should parse");
        assert_eq!(response.order_id, 123);
        assert_eq!(response.client_order_id.as_str(), "entry-1");
    }

    #[test]
    fn parses_open_orders_list() {
        let body = r#"[{
            "orderId": 1,
            "clientOrderId": "entry-1",
            "symbol": "BTCUSDT",
            "side": "BUY",
            "type": "LIMIT",
            "price": "50000",
            "origQty": "0.01",
            "executedQty": "0.00",
            "status": "NEW"
        }]"#;
        let orders = parse_open_orders(body).expect("should parse");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].order_type, OrderType::Limit);
    }

    #[test]
    fn parses_spot_account_info() {
        let body = r#"{"balances":[{"asset":"BTC","free":"1.5","locked":"0.0"}]}"#;
        let info = parse_account_info(body, Market::Spot).expect("should parse");
        assert_eq!(info.balances[0].asset, "BTC");
        assert_eq!(info.balances[0].free.to_string(), "1.5");
    }

    #[test]
    fn rejects_unrecognized_order_type() {
        assert!(parse_order_type("UNKNOWN").is_err());
    }

    #[test]
    fn parses_listen_key() {
        let body = r#"{"listenKey":"abc123"}"#;
        assert_eq!(parse_listen_key(body).expect("should parse"), "abc123");
    }

    #[test]
    fn rejects_listen_key_response_missing_field() {
        assert!(parse_listen_key("{}").is_err());
    }
}
