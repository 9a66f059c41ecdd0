// src/server/address.rs
use super::listener::{BoundAddress, Listener};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The listener has never been bound, or has been closed.
    #[error("server has no address")]
    Unbound,
}

/// Canonical address string for `listener` as it is bound right now.
///
/// Named addresses (socket paths, preformatted URLs) come back untouched.
/// Host/port addresses become `http://<host>:<port>` with the host exactly as
/// the socket reports it, so the IPv6 wildcard gives `http://:::<port>`.
pub fn resolve_address(listener: &Listener) -> Result<String, AddressError> {
    listener
        .address()
        .map(|address| format_address(&address))
        .ok_or(AddressError::Unbound)
}

pub fn format_address(address: &BoundAddress) -> String {
    match address {
        BoundAddress::Named(name) => name.clone(),
        BoundAddress::HostPort { host, port } => format!("http://{host}:{port}"),
    }
}
