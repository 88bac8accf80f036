//! Library exports for sessiontron, shared between the binary and tests.

pub mod client;
pub mod config;
pub mod gateway;
pub mod models;
pub mod session;
pub mod startup;
pub mod state;
pub mod store;
pub mod utils;
