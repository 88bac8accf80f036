pub mod base;
pub mod http_gateway;

pub use base::{bounded, AuthGateway, GatewayError};
pub use http_gateway::HttpAuthGateway;
