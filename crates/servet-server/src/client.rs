//! Client address extraction.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::connect_info::MockConnectInfo;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{Extensions, request::Parts};

/// Identity used when the connection carries no peer address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// The caller's source address (IP only, no port).
///
/// Requires the router to be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`; otherwise every
/// request resolves to [`UNKNOWN_CLIENT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

impl ClientAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientAddress {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(client_address(&parts.extensions)))
    }
}

/// Resolve the peer address from request extensions.
///
/// A `MockConnectInfo` layer is honoured when no real connect info exists.
pub fn client_address(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr)
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| addr)
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_info_ip_only() {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 55123))));
        assert_eq!(client_address(&extensions), "10.1.2.3");
    }

    #[test]
    fn test_mock_connect_info() {
        let mut extensions = Extensions::new();
        extensions.insert(MockConnectInfo(SocketAddr::from(([192, 0, 2, 4], 1))));
        assert_eq!(client_address(&extensions), "192.0.2.4");
    }

    #[test]
    fn test_missing_connect_info() {
        assert_eq!(client_address(&Extensions::new()), UNKNOWN_CLIENT);
    }
}
