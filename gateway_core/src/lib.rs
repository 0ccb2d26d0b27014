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

pub mod account_cache;
pub mod bracket;
pub mod config;
pub mod error;
pub mod event_emitter;
pub mod exchange_info;
pub mod rate_limiter;
pub mod rest_transport;
pub mod signer;
pub mod user_stream;
pub mod venue_client;
pub mod websocket;
