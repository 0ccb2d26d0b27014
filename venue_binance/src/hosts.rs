use gateway_domain::market::Market;

/// REST authority (no scheme) for a market, suitable for `RestTransport::new`.
pub fn rest_host(market: Market) -> &'static str {
    match market {
        Market::Spot => "api.binance.com",
        Market::Futures => "fapi.binance.com",
    }
}

/// Default public WebSocket base URL for a market.
pub fn websocket_host(market: Market) -> &'static str {
    match market {
        Market::Spot => "wss://stream.binance.com:9443",
        Market::Futures => "wss://fstream.binance.com",
    }
}

/// Testnet counterparts, used when the gateway is configured against the
/// venue's sandbox instead of production.
pub fn testnet_rest_host(market: Market) -> &'static str {
    match market {
        Market::Spot => "testnet.binance.vision",
        Market::Futures => "testnet.binancefuture.com",
    }
}

pub fn testnet_websocket_host(market: Market) -> &'static str {
    match market {
        Market::Spot => "wss://testnet.binance.vision",
        Market::Futures => "wss://stream.binancefuture.com",
    }
}
