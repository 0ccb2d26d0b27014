use actix_web::{get, post, web, HttpRequest, HttpResponse};
use gateway_core::bracket::types::PlaceBracketRequest;
use gateway_core::error::GatewayError;
use gateway_core::venue_client::CancelOrderRequest;
use gateway_domain::order::ClientOrderId;
use gateway_utils::cancellation_token::CancellationToken;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

const API_KEY_HEADER: &str = "X-API-KEY";

fn api_key_is_valid(req: &HttpRequest, expected: &Option<String>) -> bool {
    match expected {
        None => true,
        Some(expected) => req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            == Some(expected.as_str()),
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(err: &GatewayError) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorBody { error: err.message() })
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[post("/place_bracket")]
pub async fn place_bracket(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<PlaceBracketRequest>,
) -> HttpResponse {
    if !api_key_is_valid(&req, &state.http_api_key) {
        return HttpResponse::Unauthorized().json(ErrorBody {
            error: "invalid or missing X-API-KEY".to_owned(),
        });
    }

    let cancellation_token = CancellationToken::new();
    match state
        .orchestrator
        .place_bracket(body.into_inner(), &cancellation_token)
        .await
    {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(err) => {
            warn!("place_bracket rejected: {err}");
            let message = err.critical_message().unwrap_or_else(|| err.to_string());
            HttpResponse::BadRequest().json(ErrorBody { error: message })
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelHttpRequest {
    pub symbol: String,
    pub order_id: Option<i64>,
    pub client_order_id: Option<String>,
}

#[post("/cancel")]
pub async fn cancel(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CancelHttpRequest>,
) -> HttpResponse {
    if !api_key_is_valid(&req, &state.http_api_key) {
        return HttpResponse::Unauthorized().json(ErrorBody {
            error: "invalid or missing X-API-KEY".to_owned(),
        });
    }

    let body = body.into_inner();
    let request = CancelOrderRequest {
        symbol: body.symbol,
        order_id: body.order_id,
        client_order_id: body.client_order_id.map(ClientOrderId::new),
    };

    let cancellation_token = CancellationToken::new();
    match state.orchestrator.cancel_order(request, &cancellation_token).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "status": "success" })),
        Err(err) => {
            warn!("cancel rejected: {}", err.message());
            error_response(&err)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseAllHttpRequest {
    pub symbol: String,
    #[serde(default)]
    pub is_futures: bool,
}

#[post("/close_all")]
pub async fn close_all(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CloseAllHttpRequest>,
) -> HttpResponse {
    if !api_key_is_valid(&req, &state.http_api_key) {
        return HttpResponse::Unauthorized().json(ErrorBody {
            error: "invalid or missing X-API-KEY".to_owned(),
        });
    }

    let body = body.into_inner();
    let cancellation_token = CancellationToken::new();
    match state
        .orchestrator
        .close_all_positions(&body.symbol, body.is_futures, &cancellation_token)
        .await
    {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "status": "success" })),
        Err(err) => {
            warn!("close_all rejected: {}", err.message());
            error_response(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn missing_expected_api_key_always_passes() {
        let req = TestRequest::default().to_http_request();
        assert!(api_key_is_valid(&req, &None));
    }

    #[test]
    fn matching_api_key_header_passes() {
        let req = TestRequest::default()
            .insert_header((API_KEY_HEADER, "operator-secret"))
            .to_http_request();
        assert!(api_key_is_valid(&req, &Some("operator-secret".to_owned())));
    }

    #[test]
    fn wrong_or_missing_api_key_header_fails() {
        let req = TestRequest::default().to_http_request();
        assert!(!api_key_is_valid(&req, &Some("operator-secret".to_owned())));

        let req = TestRequest::default()
            .insert_header((API_KEY_HEADER, "wrong"))
            .to_http_request();
        assert!(!api_key_is_valid(&req, &Some("operator-secret".to_owned())));
    }
}
