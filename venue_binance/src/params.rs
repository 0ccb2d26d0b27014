use gateway_core::venue_client::{CancelOrderRequest, PlaceOrderRequest};
use gateway_domain::market::Market;

/// Builds the unsigned parameter list for order placement. Field order
/// matches the teacher's request-building style: symbol, side, type, then
/// the fields specific to the order type.
pub fn create_order_params(market: Market, request: &PlaceOrderRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("symbol".to_owned(), request.symbol.clone()),
        ("side".to_owned(), request.side.as_str().to_owned()),
        ("type".to_owned(), request.order_type.as_str().to_owned()),
    ];

    if let Some(quantity) = request.quantity {
        params.push(("quantity".to_owned(), quantity.to_string()));
    }
    params.push((
        "newClientOrderId".to_owned(),
        request.client_order_id.as_str().to_owned(),
    ));

    if request.order_type.requires_price() {
        if let Some(price) = request.price {
            params.push(("price".to_owned(), price.to_string()));
        }
        if let Some(tif) = request.time_in_force {
            params.push(("timeInForce".to_owned(), tif.as_str().to_owned()));
        }
    }

    if request.order_type.requires_stop_price() {
        if let Some(stop_price) = request.stop_price {
            params.push(("stopPrice".to_owned(), stop_price.to_string()));
        }
    }

    if market.is_futures() {
        if request.reduce_only {
            params.push(("reduceOnly".to_owned(), "true".to_owned()));
        }
        if request.close_position {
            params.push(("closePosition".to_owned(), "true".to_owned()));
        }
    }

    params
}

/// Builds the unsigned parameter list for order cancellation: `symbol` plus
/// either `orderId` or `origClientOrderId`, whichever the caller supplied.
pub fn cancel_order_params(request: &CancelOrderRequest) -> Vec<(String, String)> {
    let mut params = vec![("symbol".to_owned(), request.symbol.clone())];

    if let Some(order_id) = request.order_id {
        params.push(("orderId".to_owned(), order_id.to_string()));
    } else if let Some(client_order_id) = &request.client_order_id {
        params.push((
            "origClientOrderId".to_owned(),
            client_order_id.as_str().to_owned(),
        ));
    }

    params
}
