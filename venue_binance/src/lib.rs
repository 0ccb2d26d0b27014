//! Concrete venue implementation against the Binance spot/futures REST and
//! WebSocket APIs, realizing `gateway_core`'s venue-agnostic traits (C6, C5).

pub mod client;
pub mod hosts;
pub mod params;
pub mod parsing;
pub mod paths;

pub use client::BinanceClient;
pub use hosts::{rest_host, websocket_host};
