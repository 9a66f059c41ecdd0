pub mod address;
pub mod builder;
pub mod handler;
pub mod listener;

pub use address::{resolve_address, AddressError};
pub use builder::create_application;
pub use handler::{DispatchError, Dispatcher, RequestKind};
pub use listener::{BoundAddress, ListenTarget, Listener, ListenerError};
