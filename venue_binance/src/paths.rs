use gateway_domain::market::Market;

/// Picks the spot or futures REST path for an operation that differs only
/// by market-specific prefix (`/api/v3/...` vs `/fapi/v1/...`).
pub fn select<'a>(market: Market, futures_path: &'a str, spot_path: &'a str) -> &'a str {
    match market {
        Market::Futures => futures_path,
        Market::Spot => spot_path,
    }
}

pub fn exchange_info(market: Market) -> &'static str {
    select(market, "/fapi/v1/exchangeInfo", "/api/v3/exchangeInfo")
}

pub fn order(market: Market) -> &'static str {
    select(market, "/fapi/v1/order", "/api/v3/order")
}

pub fn open_orders(market: Market) -> &'static str {
    select(market, "/fapi/v1/openOrders", "/api/v3/openOrders")
}

pub fn account(market: Market) -> &'static str {
    select(market, "/fapi/v2/account", "/api/v3/account")
}

pub fn user_data_stream(market: Market) -> &'static str {
    select(market, "/fapi/v1/listenKey", "/api/v3/userDataStream")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_futures_prefix_for_futures_market() {
        assert_eq!(exchange_info(Market::Futures), "/fapi/v1/exchangeInfo");
        assert_eq!(order(Market::Futures), "/fapi/v1/order");
        assert_eq!(account(Market::Futures), "/fapi/v2/account");
    }

    #[test]
    fn picks_spot_prefix_for_spot_market() {
        assert_eq!(exchange_info(Market::Spot), "/api/v3/exchangeInfo");
        assert_eq!(order(Market::Spot), "/api/v3/order");
        assert_eq!(account(Market::Spot), "/api/v3/account");
    }

    #[test]
    fn picks_user_data_stream_prefix_per_market() {
        assert_eq!(user_data_stream(Market::Spot), "/api/v3/userDataStream");
        assert_eq!(user_data_stream(Market::Futures), "/fapi/v1/listenKey");
    }
}
