//
// src/router/mod.rs
//
mod handler;
mod surface;
pub mod upgrade;

pub use handler::{text_response, Flow, Handler, Middleware, SurfaceError};
pub use surface::Router;
pub use upgrade::{is_upgrade_request, switching_protocols};
