//! Model provider gateway adapters

mod http;

pub use http::{HttpGatewayConfig, HttpModelGateway};
