// src/router/upgrade.rs
// Detection and acceptance of HTTP/1.1 protocol upgrades (WebSocket and friends).
use super::handler::text_response;
use hyper::header::{HeaderValue, CONNECTION, UPGRADE};
use hyper::{Body, Method, Request, Response, StatusCode};

/// True when `req` asks to switch protocols: an `Upgrade` header plus an
/// `upgrade` token in `Connection`. `CONNECT` tunnels are not upgrades.
pub fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    if req.method() == Method::CONNECT || !req.headers().contains_key(UPGRADE) {
        return false;
    }

    req.headers()
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// The protocol named in the request's `Upgrade` header.
pub fn requested_protocol<B>(req: &Request<B>) -> Option<&HeaderValue> {
    req.headers().get(UPGRADE)
}

/// `101 Switching Protocols` answer for `protocol`.
///
/// The handler must also take the request's `hyper::upgrade::on` future to
/// get hold of the raw connection once this response has been written.
pub fn switching_protocols(protocol: HeaderValue) -> Response<Body> {
    let mut response = text_response(StatusCode::SWITCHING_PROTOCOLS, Body::empty());
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("upgrade"));
    response.headers_mut().insert(UPGRADE, protocol);
    response
}
