use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use uuid::Uuid;

use gateway_domain::market::{Market, Side};
use gateway_domain::order::{ClientOrderId, OrderStatus, OrderType, TimeInForce};
use gateway_domain::order_update::OrderUpdateEvent;
use gateway_utils::cancellation_token::CancellationToken;

use crate::bracket::types::{
    BracketOrder, BracketOrderError, ClientIds, PlaceBracketRequest, PlaceBracketResponse,
    MAIN_LEG,
};
use crate::error::GatewayError;
use crate::event_emitter::EventEmitter;
use crate::venue_client::{CancelOrderRequest, PlaceOrderRequest, VenueClient};

const TAKE_PROFIT_LEG: &str = "TP";
const STOP_LOSS_LEG: &str = "SL";

/// 0.5% offset applied to a spot STOP_LOSS_LIMIT's limit price relative to
/// its stop price, so the limit order has room to fill once triggered.
const STOP_LIMIT_OFFSET: Decimal = rust_decimal_macros::dec!(0.005);

/// Coordinates multi-leg bracket placement against a pair of per-market
/// venue clients (C7). Owns the bracket registry for the lifetime of the
/// process: no persistence, no process-wide singleton.
pub struct BracketOrchestrator {
    spot: Option<Arc<dyn VenueClient>>,
    futures: Option<Arc<dyn VenueClient>>,
    emitter: Arc<dyn EventEmitter>,
    brackets: RwLock<HashMap<Uuid, BracketOrder>>,
    client_id_index: DashMap<String, Uuid>,
    seen_client_ids: DashMap<String, ()>,
}

impl BracketOrchestrator {
    pub fn new(
        spot: Option<Arc<dyn VenueClient>>,
        futures: Option<Arc<dyn VenueClient>>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            spot,
            futures,
            emitter,
            brackets: RwLock::new(HashMap::new()),
            client_id_index: DashMap::new(),
            seen_client_ids: DashMap::new(),
        }
    }

    fn venue_for(&self, is_futures: bool) -> Result<Arc<dyn VenueClient>, GatewayError> {
        let client = if is_futures { &self.futures } else { &self.spot };
        client
            .clone()
            .ok_or_else(|| GatewayError::Validation(format!(
                "no venue client configured for market {}",
                Market::from_is_futures(is_futures)
            )))
    }

    /// `"{first 8 chars of bracketId}_{legTag}_{nanosTimestamp}"`, retried
    /// with a bumped timestamp on the (practically impossible, clock
    /// resolution permitting) chance of a collision within this process.
    fn mint_client_id(&self, bracket_id: Uuid, leg_tag: &str) -> ClientOrderId {
        let prefix = &bracket_id.simple().to_string()[..8];
        loop {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock is after the epoch")
                .as_nanos();
            let candidate = format!("{prefix}_{leg_tag}_{nanos}");
            if self.seen_client_ids.insert(candidate.clone(), ()).is_none() {
                return ClientOrderId::new(candidate);
            }
        }
    }

    /// Rounds `price`/`quantity` through the venue's exchange-info cache and
    /// validates notional for non-market entries. Market entries (price ==
    /// 0) skip the notional gate: the fill price isn't known up front.
    async fn normalize(
        &self,
        venue: &dyn VenueClient,
        symbol: &str,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<(Decimal, Decimal), GatewayError> {
        let rounded_quantity = venue.round_quantity(symbol, quantity).await?;
        if price <= Decimal::ZERO {
            return Ok((Decimal::ZERO, rounded_quantity));
        }
        let rounded_price = venue.round_price(symbol, price).await?;
        venue
            .validate_notional(symbol, rounded_price, rounded_quantity)
            .await?;
        Ok((rounded_price, rounded_quantity))
    }

    /// Splits `quantity` evenly across `n` take-profit legs, rounding every
    /// share through the venue's step size and assigning what's left over
    /// after rounding the first `n - 1` shares to the final leg.
    async fn split_quantity(
        &self,
        venue: &dyn VenueClient,
        symbol: &str,
        quantity: Decimal,
        n: usize,
    ) -> Result<Vec<Decimal>, GatewayError> {
        let n_dec = Decimal::from(n as u64);
        let mut shares = Vec::with_capacity(n);
        let mut allocated = Decimal::ZERO;

        for _ in 0..n.saturating_sub(1) {
            let share = venue.round_quantity(symbol, quantity / n_dec).await?;
            allocated += share;
            shares.push(share);
        }
        let remainder = venue
            .round_quantity(symbol, quantity - allocated)
            .await?;
        shares.push(remainder);
        Ok(shares)
    }

    /// Places the bracket's three leg groups in strict order: MAIN first
    /// (abort on failure, no legs placed after it survive), then every
    /// take-profit leg, then the stop-loss leg (both TP/SL non-aborting:
    /// their failures are reported, not unwound).
    pub async fn place_bracket(
        &self,
        request: PlaceBracketRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<PlaceBracketResponse, BracketOrderError> {
        request
            .validate()
            .map_err(|err| single_error(MAIN_LEG, err))?;

        let venue = self
            .venue_for(request.is_futures)
            .map_err(|err| single_error(MAIN_LEG, err))?;

        let (entry_price, quantity) = self
            .normalize(
                venue.as_ref(),
                &request.symbol,
                request.entry_price,
                request.quantity,
            )
            .await
            .map_err(|err| single_error(MAIN_LEG, err))?;

        let bracket_id = Uuid::new_v4();
        let mut errors = BracketOrderError::default();

        let main_client_id = self.mint_client_id(bracket_id, "MAIN");
        let main_order_type = match &request.order_type {
            Some(raw) if raw.eq_ignore_ascii_case("LIMIT") => OrderType::Limit,
            Some(raw) if raw.eq_ignore_ascii_case("MARKET") => OrderType::Market,
            _ if entry_price > Decimal::ZERO => OrderType::Limit,
            _ => OrderType::Market,
        };

        let main_request = PlaceOrderRequest {
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: main_order_type,
            quantity: Some(quantity),
            price: if main_order_type.requires_price() {
                Some(entry_price)
            } else {
                None
            },
            stop_price: None,
            time_in_force: if main_order_type.requires_price() {
                Some(TimeInForce::Gtc)
            } else {
                None
            },
            client_order_id: main_client_id.clone(),
            reduce_only: false,
            close_position: false,
        };

        let main_response = match venue.place_order(main_request, cancellation_token).await {
            Ok(response) => response,
            Err(err) => {
                errors.push(MAIN_LEG, err);
                return Err(errors);
            }
        };

        let take_profit_shares = self
            .split_quantity(
                venue.as_ref(),
                &request.symbol,
                quantity,
                request.take_profit_prices.len(),
            )
            .await
            .unwrap_or_else(|_| {
                vec![quantity / Decimal::from(request.take_profit_prices.len() as u64); request.take_profit_prices.len()]
            });

        let mut take_profit_client_ids = Vec::with_capacity(request.take_profit_prices.len());
        for (idx, raw_price) in request.take_profit_prices.iter().enumerate() {
            let leg_tag = format!("{TAKE_PROFIT_LEG}{}", idx + 1);
            let client_id = self.mint_client_id(bracket_id, &leg_tag);

            let outcome = self
                .place_take_profit_leg(
                    venue.as_ref(),
                    &request,
                    *raw_price,
                    take_profit_shares[idx],
                    client_id.clone(),
                    cancellation_token,
                )
                .await;

            if let Err(err) = outcome {
                errors.push(leg_tag, err);
                take_profit_client_ids.push(ClientOrderId::new(String::new()));
            } else {
                take_profit_client_ids.push(client_id);
            }
        }

        let stop_loss_client_id = self.mint_client_id(bracket_id, STOP_LOSS_LEG);
        let stop_loss_outcome = self
            .place_stop_loss_leg(
                venue.as_ref(),
                &request,
                quantity,
                stop_loss_client_id.clone(),
                cancellation_token,
            )
            .await;
        let stop_loss_client_id = if let Err(err) = stop_loss_outcome {
            errors.push(STOP_LOSS_LEG, err);
            ClientOrderId::new(String::new())
        } else {
            stop_loss_client_id
        };

        let now = Utc::now();
        let client_ids = ClientIds {
            main: main_client_id.clone(),
            take_profits: take_profit_client_ids,
            stop_loss: stop_loss_client_id,
        };

        let record = BracketOrder {
            id: bracket_id,
            symbol: request.symbol.clone(),
            market: Market::from_is_futures(request.is_futures),
            side: request.side,
            quantity,
            entry_price,
            take_profit_prices: request.take_profit_prices.clone(),
            stop_loss_price: request.stop_loss_price,
            client_ids: client_ids.clone(),
            created_at: now,
            updated_at: now,
        };
        self.index_bracket(record);

        self.emit_best_effort(
            &request.symbol,
            main_response.order_id,
            main_client_id,
            request.side,
            main_order_type,
            entry_price,
            quantity,
            now,
        )
        .await;

        Ok(PlaceBracketResponse {
            bracket_order_id: bracket_id,
            client_order_ids: client_ids,
            symbol: request.symbol,
            side: request.side,
            quantity,
            created_at: now,
            partial_failure: errors.has_errors(),
            errors: errors.to_messages(),
        })
    }

    async fn place_take_profit_leg(
        &self,
        venue: &dyn VenueClient,
        request: &PlaceBracketRequest,
        raw_price: Decimal,
        share: Decimal,
        client_id: ClientOrderId,
        cancellation_token: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let price = venue.round_price(&request.symbol, raw_price).await?;
        let order = PlaceOrderRequest {
            symbol: request.symbol.clone(),
            side: request.side.opposite(),
            order_type: OrderType::Limit,
            quantity: Some(share),
            price: Some(price),
            stop_price: None,
            time_in_force: Some(TimeInForce::Gtc),
            client_order_id: client_id,
            reduce_only: request.is_futures,
            close_position: false,
        };
        venue.place_order(order, cancellation_token).await?;
        Ok(())
    }

    async fn place_stop_loss_leg(
        &self,
        venue: &dyn VenueClient,
        request: &PlaceBracketRequest,
        quantity: Decimal,
        client_id: ClientOrderId,
        cancellation_token: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let stop_price = venue
            .round_price(&request.symbol, request.stop_loss_price)
            .await?;

        let order = if request.is_futures {
            PlaceOrderRequest {
                symbol: request.symbol.clone(),
                side: request.side.opposite(),
                order_type: OrderType::StopMarket,
                quantity: None,
                price: None,
                stop_price: Some(stop_price),
                time_in_force: None,
                client_order_id: client_id,
                reduce_only: true,
                close_position: true,
            }
        } else {
            let offset = Decimal::ONE
                + match request.side {
                    Side::Buy => -STOP_LIMIT_OFFSET,
                    Side::Sell => STOP_LIMIT_OFFSET,
                };
            let limit_price = venue
                .round_price(&request.symbol, stop_price * offset)
                .await?;

            PlaceOrderRequest {
                symbol: request.symbol.clone(),
                side: request.side.opposite(),
                order_type: OrderType::StopLossLimit,
                quantity: Some(quantity),
                price: Some(limit_price),
                stop_price: Some(stop_price),
                time_in_force: Some(TimeInForce::Gtc),
                client_order_id: client_id,
                reduce_only: false,
                close_position: false,
            }
        };

        venue.place_order(order, cancellation_token).await?;
        Ok(())
    }

    fn index_bracket(&self, record: BracketOrder) {
        let bracket_id = record.id;
        self.client_id_index
            .insert(record.client_ids.main.as_str().to_owned(), bracket_id);
        for tp in &record.client_ids.take_profits {
            if !tp.as_str().is_empty() {
                self.client_id_index.insert(tp.as_str().to_owned(), bracket_id);
            }
        }
        if !record.client_ids.stop_loss.as_str().is_empty() {
            self.client_id_index
                .insert(record.client_ids.stop_loss.as_str().to_owned(), bracket_id);
        }
        self.brackets.write().insert(bracket_id, record);
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_best_effort(
        &self,
        symbol: &str,
        order_id: i64,
        client_order_id: ClientOrderId,
        side: Side,
        order_type: OrderType,
        price: Decimal,
        quantity: Decimal,
        now: chrono::DateTime<Utc>,
    ) {
        let event = OrderUpdateEvent::new(
            symbol.to_owned(),
            order_id,
            client_order_id,
            OrderStatus::New,
            side,
            order_type,
            price,
            quantity,
            Decimal::ZERO,
            now.timestamp_millis(),
        );
        self.emitter.emit(&event).await;
    }

    /// Cancels an order, trying the spot venue first and falling back to
    /// futures if the spot venue reports it doesn't know the order. Either
    /// venue not being configured is treated as that attempt failing.
    pub async fn cancel_order(
        &self,
        request: CancelOrderRequest,
        cancellation_token: &CancellationToken,
    ) -> Result<(), GatewayError> {
        if let Some(spot) = &self.spot {
            match spot.cancel_order(request.clone(), cancellation_token).await {
                Ok(()) => return Ok(()),
                Err(GatewayError::Venue(err)) if err.is_order_error() => {}
                Err(err) => {
                    if self.futures.is_none() {
                        return Err(err);
                    }
                }
            }
        }

        match &self.futures {
            Some(futures) => futures.cancel_order(request, cancellation_token).await,
            None => Err(GatewayError::Validation(
                "no venue accepted the cancel request".to_owned(),
            )),
        }
    }

    /// Cancels every open order for `symbol` on the selected market,
    /// aggregating failures and returning the last one encountered.
    pub async fn close_all_positions(
        &self,
        symbol: &str,
        is_futures: bool,
        cancellation_token: &CancellationToken,
    ) -> Result<(), GatewayError> {
        if symbol.is_empty() {
            return Err(GatewayError::Validation("symbol is required".to_owned()));
        }

        let venue = self.venue_for(is_futures)?;
        let open_orders = venue.get_open_orders(symbol, cancellation_token).await?;

        let mut last_error = None;
        for order in open_orders {
            let request = CancelOrderRequest {
                symbol: symbol.to_owned(),
                order_id: Some(order.order_id),
                client_order_id: None,
            };
            if let Err(err) = venue.cancel_order(request, cancellation_token).await {
                last_error = Some(err);
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Looks up the bracket owning `client_order_id`, re-queries the correct
    /// venue's open orders for the bracket's symbol, and emits an
    /// `order_update.v1` for the matching order if one is still open.
    pub async fn reconcile(
        &self,
        client_order_id: &ClientOrderId,
        cancellation_token: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let bracket_id = self
            .client_id_index
            .get(client_order_id.as_str())
            .map(|entry| *entry)
            .ok_or_else(|| {
                GatewayError::Validation(format!(
                    "no bracket found for client order id {client_order_id}"
                ))
            })?;

        let record = self
            .brackets
            .read()
            .get(&bracket_id)
            .cloned()
            .ok_or_else(|| GatewayError::Validation("bracket no longer tracked".to_owned()))?;

        let venue = self.venue_for(record.market.is_futures())?;
        let open_orders = venue
            .get_open_orders(&record.symbol, cancellation_token)
            .await?;

        if let Some(order) = open_orders
            .iter()
            .find(|order| order.client_order_id == *client_order_id)
        {
            let event = OrderUpdateEvent::new(
                order.symbol.clone(),
                order.order_id,
                order.client_order_id.clone(),
                parse_status(&order.status),
                order.side,
                order.order_type,
                order.price,
                order.quantity,
                order.executed_qty,
                Utc::now().timestamp_millis(),
            );
            self.emitter.emit(&event).await;
        }

        Ok(())
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

fn single_error(leg: &str, err: GatewayError) -> BracketOrderError {
    let mut errors = BracketOrderError::default();
    errors.push(leg, err);
    errors
}
