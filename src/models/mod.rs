pub mod credentials;
pub mod session;
pub mod token;

pub use credentials::{Credentials, Registration};
pub use session::{Identity, Session};
pub use token::{decode_expiry, TokenGrant};
