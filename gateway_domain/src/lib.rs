pub mod market;
pub mod order;
pub mod order_update;
pub mod symbol_rule;

pub type Price = rust_decimal::Decimal;
pub type Quantity = rust_decimal::Decimal;
