pub mod authenticated;

pub use authenticated::{AuthenticatedClient, ClientError};
