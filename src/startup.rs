//! Application startup.
//!
//! Builds the token store, the auth gateway and the session controller from
//! configuration, then restores any persisted session.

use std::sync::Arc;

use tracing::info;

use crate::client::AuthenticatedClient;
use crate::config::ConfigV1;
use crate::gateway::{AuthGateway, HttpAuthGateway};
use crate::session::SessionController;
use crate::state::AppState;
use crate::store::{create_store, TokenStore};

/// Wires everything against the HTTP backend named in `config.gateway`.
///
/// # Errors
///
/// Returns an error if the HTTP clients cannot be built or the persisted
/// session cannot be read.
pub async fn build(config: Arc<ConfigV1>) -> Result<AppState, Box<dyn std::error::Error>> {
    let gateway: Arc<dyn AuthGateway> = Arc::new(HttpAuthGateway::new(&config.gateway)?);
    build_with_gateway(config, gateway).await
}

/// Same as [`build`] with a caller-supplied gateway.
pub async fn build_with_gateway(
    config: Arc<ConfigV1>,
    gateway: Arc<dyn AuthGateway>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let store = TokenStore::new(create_store(&config.store), config.session.default_window());
    if !store.is_durable() {
        info!("Sessions will not survive a restart");
    }

    let session = Arc::new(SessionController::new(
        store.clone(),
        gateway,
        &config.session,
        config.gateway.timeout(),
    ));
    let state = session.hydrate().await?;
    info!("Session state after startup: {:?}", state);

    let client = AuthenticatedClient::new(&config.gateway, store.clone(), session.clone())?;

    Ok(AppState {
        config,
        store,
        session,
        client,
    })
}
