pub mod controller;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod scheduler;

pub use controller::SessionController;
pub use coordinator::{RefreshCoordinator, RefreshOutcome};
pub use error::SessionError;
pub use lifecycle::{LogoutReason, SessionState};
pub use scheduler::{RefreshScheduler, DEFAULT_REFRESH_SKEW};
