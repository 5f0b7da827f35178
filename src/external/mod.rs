pub mod market_data;
pub mod publisher;
