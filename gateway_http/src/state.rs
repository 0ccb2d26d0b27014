use std::sync::Arc;
use std::time::Duration;

use gateway_core::bracket::orchestrator::BracketOrchestrator;
use gateway_core::config::GatewaySettings;
use gateway_core::event_emitter::{EventEmitter, LogEventEmitter};
use gateway_core::exchange_info::ExchangeInfoCache;
use gateway_core::rate_limiter::RateLimiter;
use gateway_core::rest_transport::RestTransport;
use gateway_core::signer::Signer;
use gateway_core::user_stream::UserDataStreamSupervisor;
use gateway_core::venue_client::VenueClient;
use gateway_domain::market::Market;
use gateway_utils::cancellation_token::CancellationToken;
use venue_binance::BinanceClient;

const EXCHANGE_INFO_TTL: Duration = Duration::from_secs(60 * 60);

/// Shared state handed to every request handler (`web::Data<AppState>`). One
/// `BinanceClient` is built for whichever market `exchange.is_margin_trading`
/// selects; the orchestrator's other venue slot stays `None`. The same
/// client doubles as the listen-key source for the user-data stream
/// supervisor started alongside the HTTP server (see
/// [`AppState::spawn_user_data_stream`]).
pub struct AppState {
    pub orchestrator: Arc<BracketOrchestrator>,
    pub http_api_key: Option<String>,
    venue: Arc<BinanceClient>,
    ws_host: &'static str,
    emitter: Arc<dyn EventEmitter>,
}

impl AppState {
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        let market = Market::from_is_futures(settings.exchange.is_margin_trading);
        let venue = Arc::new(build_client(settings, market));
        let emitter: Arc<dyn EventEmitter> = Arc::new(LogEventEmitter);

        let (spot, futures) = match market {
            Market::Spot => (Some(venue.clone() as Arc<dyn VenueClient>), None),
            Market::Futures => (None, Some(venue.clone() as Arc<dyn VenueClient>)),
        };

        Self {
            orchestrator: Arc::new(BracketOrchestrator::new(spot, futures, emitter.clone())),
            http_api_key: settings.http.api_key.clone(),
            venue,
            ws_host: venue_binance::websocket_host(market),
            emitter,
        }
    }

    /// Starts the user-data WebSocket stream (C8+C9) in the background,
    /// feeding `executionReport` updates into the same event emitter the
    /// orchestrator uses for its best-effort post-placement events.
    pub async fn spawn_user_data_stream(&self, cancellation_token: CancellationToken) {
        let supervisor = Arc::new(UserDataStreamSupervisor::new(
            self.ws_host,
            self.venue.clone(),
            self.emitter.clone(),
        ));
        if let Err(err) = supervisor.start(cancellation_token).await {
            log::error!("unable to start user-data stream: {err}");
        }
    }
}

fn build_client(settings: &GatewaySettings, market: Market) -> BinanceClient {
    let exchange = &settings.exchange;
    let host = venue_binance::rest_host(market);
    let signer = Signer::new(exchange.secret_key.clone(), Some(exchange.recv_window_ms));
    let rate_limiter = RateLimiter::new(exchange.rate_limit.rate, exchange.rate_limit.burst);
    let retry = exchange.rest.to_retry_policy();
    let transport = RestTransport::new(
        host,
        Some(exchange.api_key.clone()),
        signer,
        rate_limiter,
        retry,
        exchange.rest.request_timeout(),
    );
    let exchange_info = ExchangeInfoCache::new(EXCHANGE_INFO_TTL);
    BinanceClient::new(transport, exchange_info, market)
}
