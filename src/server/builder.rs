// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::config::{AppConfig, ConfigError};
use crate::router::Router;
use crate::server::listener::Listener;

pub const PRIMARY_SURFACE: &str = "primary";
pub const UPGRADE_SURFACE: &str = "upgrade";

/// Build an unbound listener with a primary surface in its request slot and a
/// separate upgrade surface in its upgrade slot.
///
/// Returns `(primary, upgrade, listener)`. Nothing is bound; call
/// [`Listener::listen`] with a target such as
/// [`ListenTarget::from_config`](crate::server::ListenTarget::from_config).
/// An invalid `config` is rejected before the listener is created.
pub fn create_application(config: &AppConfig) -> Result<(Router, Router, Listener), ConfigError> {
    config.validate()?;

    let listener = Listener::new();

    let app = Router::new(PRIMARY_SURFACE);
    listener.on_request(app.clone());

    let ws_app = Router::new(UPGRADE_SURFACE);
    listener.on_upgrade(ws_app.clone());

    Ok((app, ws_app, listener))
}
