#![deny(
    non_ascii_idents,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_must_use
)]

mod handlers;
mod state;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use gateway_core::config::{try_load_settings, CONFIG_PATH, CREDENTIALS_PATH};
use gateway_utils::cancellation_token::CancellationToken;
use log::info;

use crate::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    gateway_utils::logger::init_logger();
    gateway_utils::panic::set_panic_hook();

    let settings = try_load_settings(CONFIG_PATH, CREDENTIALS_PATH)
        .context("unable to load gateway settings at startup")?;
    let bind_addr = settings.http.bind_addr.clone();

    info!(
        "starting gateway_http on {bind_addr} for account {}",
        settings.exchange.exchange_account_id
    );

    let app_state = web::Data::new(AppState::from_settings(&settings));

    let stream_cancellation_token = CancellationToken::new();
    app_state
        .spawn_user_data_stream(stream_cancellation_token)
        .await;

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(64 * 1024))
            .service(handlers::health)
            .service(handlers::place_bracket)
            .service(handlers::cancel)
            .service(handlers::close_all)
    })
    .bind(&bind_addr)
    .with_context(|| format!("unable to bind gateway_http to {bind_addr}"))?
    .workers(2)
    .run()
    .await
    .context("gateway_http server exited with an error")?;

    Ok(())
}
