use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use gateway_core::account_cache::{AccountInfoCache, AccountInfoSource};
use gateway_core::error::GatewayError;
use gateway_core::exchange_info::{ExchangeInfoCache, SymbolRuleSource};
use gateway_core::rest_transport::{RequestMethod, RestTransport};
use gateway_core::user_stream::ListenKeySource;
use gateway_core::venue_client::{
    AccountInfo, CancelOrderRequest, OpenOrder, PlaceOrderRequest, PlaceOrderResponse, VenueClient,
};
use gateway_domain::market::Market;
use gateway_domain::symbol_rule::SymbolRule;
use gateway_utils::cancellation_token::CancellationToken;

use crate::{params, parsing, paths};

/// Account reads are frequent (reconcile, balance checks) and the venue
/// rate-limits them harder than order placement; a short TTL keeps a busy
/// gateway well clear of that limit without serving stale balances for long.
const ACCOUNT_INFO_TTL: Duration = Duration::from_secs(30);

/// `VenueClient` realized against Binance's spot and futures REST API (C6).
/// One instance per market: `market` picks the path prefix and response
/// shape, the underlying `RestTransport` already points at the matching
/// host (see [`crate::hosts`]).
pub struct BinanceClient {
    transport: RestTransport,
    exchange_info: ExchangeInfoCache,
    account_info: AccountInfoCache,
    market: Market,
}

impl BinanceClient {
    pub fn new(transport: RestTransport, exchange_info: ExchangeInfoCache, market: Market) -> Self {
        Self {
            transport,
            exchange_info,
            account_info: AccountInfoCache::new(ACCOUNT_INFO_TTL),
            market,
        }
    }

    async fn symbol_rule(&self, symbol: &str) -> Result<SymbolRule, GatewayError> {
        self.exchange_info
            .get_symbol_rule(self, symbol, self.market)
            .await
    }
}

#[async_trait]
impl AccountInfoSource for BinanceClient {
    async fn fetch_account_info(&self) -> Result<AccountInfo, GatewayError> {
        let token = CancellationToken::new();
        let body = self
            .transport
            .do_request(RequestMethod::Get, paths::account(self.market), Vec::new(), true, &token)
            .await?;
        parsing::parse_account_info(&body, self.market)
            .map_err(|err| GatewayError::Validation(format!("unable to parse account info: {err}")))
    }
}

#[async_trait]
impl ListenKeySource for BinanceClient {
    async fn request_listen_key(&self) -> Result<String, GatewayError> {
        let token = CancellationToken::new();
        let body = self
            .transport
            .do_request(
                RequestMethod::Post,
                paths::user_data_stream(self.market),
                Vec::new(),
                false,
                &token,
            )
            .await?;
        parsing::parse_listen_key(&body)
            .map_err(|err| GatewayError::Validation(format!("unable to parse listen key response: {err}")))
    }

    async fn keepalive_listen_key(&self, listen_key: &str) -> Result<(), GatewayError> {
        let token = CancellationToken::new();
        let query = vec![("listenKey".to_owned(), listen_key.to_owned())];
        self.transport
            .do_request(
                RequestMethod::Put,
                paths::user_data_stream(self.market),
                query,
                false,
                &token,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SymbolRuleSource for BinanceClient {
    async fn fetch_symbol_rules(&self, market: Market) -> Result<Vec<SymbolRule>, GatewayError> {
        let token = CancellationToken::new();
        let body = self
            .transport
            .do_request(RequestMethod::Get, paths::exchange_info(market), Vec::new(), false, &token)
            .await?;
        parsing::parse_exchange_info(&body, market)
            .map_err(|err| GatewayError::Validation(format!("unable to parse exchangeInfo: {err}")))
    }
}

#[async_trait]
impl VenueClient for BinanceClient {
    async fn place_order(
        &self,
        request: PlaceOrderRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<PlaceOrderResponse, GatewayError> {
        request.validate()?;
        let query = params::create_order_params(self.market, &request);
        let body = self
            .transport
            .do_request(RequestMethod::Post, paths::order(self.market), query, true, cancellation_token)
            .await?;
        parsing::parse_place_order_response(&body)
            .map_err(|err| GatewayError::Validation(format!("unable to parse order response: {err}")))
    }

    async fn cancel_order(
        &self,
        request: CancelOrderRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let query = params::cancel_order_params(&request);
        self.transport
            .do_request(
                RequestMethod::Delete,
                paths::order(self.market),
                query,
                true,
                cancellation_token,
            )
            .await?;
        Ok(())
    }

    async fn get_open_orders(
        &self,
        symbol: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<OpenOrder>, GatewayError> {
        let query = vec![("symbol".to_owned(), symbol.to_owned())];
        let body = self
            .transport
            .do_request(
                RequestMethod::Get,
                paths::open_orders(self.market),
                query,
                true,
                cancellation_token,
            )
            .await?;
        parsing::parse_open_orders(&body)
            .map_err(|err| GatewayError::Validation(format!("unable to parse open orders: {err}")))
    }

    async fn get_account_info(
        &self,
        _cancellation_token: &CancellationToken,
    ) -> Result<AccountInfo, GatewayError> {
        self.account_info.get(self).await
    }

    async fn round_price(&self, symbol: &str, price: Decimal) -> Result<Decimal, GatewayError> {
        let rule = self.symbol_rule(symbol).await?;
        Ok(ExchangeInfoCache::round_price(&rule, price))
    }

    async fn round_quantity(&self, symbol: &str, quantity: Decimal) -> Result<Decimal, GatewayError> {
        let rule = self.symbol_rule(symbol).await?;
        Ok(ExchangeInfoCache::round_quantity(&rule, quantity))
    }

    async fn validate_notional(
        &self,
        symbol: &str,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<(), GatewayError> {
        let rule = self.symbol_rule(symbol).await?;
        ExchangeInfoCache::validate_notional(&rule, price, quantity)
    }

    fn is_futures(&self) -> bool {
        self.market.is_futures()
    }
}
