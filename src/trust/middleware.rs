use crate::http::types::{ErrorResponse, ErrorType};
use crate::trust::{resolve_direct_peer, resolve_effective_client, TrustConfig, FORWARDED_FOR};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Which gate applies to a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    /// Administrative and introspection routes
    Admin,
}

impl RouteClass {
    pub fn of(path: &str) -> Self {
        if path == "/admin" || path.starts_with("/admin/") || path == "/metrics" {
            RouteClass::Admin
        } else {
            RouteClass::Public
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Public => "public",
            RouteClass::Admin => "admin",
        }
    }
}

/// Axum middleware enforcing the global and admin trust gates
///
/// The resolved [`ClientAddress`](crate::trust::ClientAddress) is stored in the
/// request extensions for downstream handlers.
pub async fn trust_gate(
    State(trust): State<Arc<TrustConfig>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let route = RouteClass::of(request.uri().path());

    let Some(ConnectInfo(peer)) = connect_info else {
        if trust.requires_trust(route) {
            tracing::warn!(
                route = route.as_str(),
                "Rejecting request: peer address unavailable"
            );
            return forbidden(route);
        }
        return next.run(request).await;
    };

    let direct_peer = resolve_direct_peer(&peer);
    let forwarded = request
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok());
    let client = resolve_effective_client(direct_peer, forwarded, &trust.trusted_proxy_networks);

    if trust.requires_trust(route) && !trust.is_trusted(client.effective) {
        // Only the resolved address is logged; an untrusted forwarded value never is
        tracing::warn!(
            route = route.as_str(),
            path = request.uri().path(),
            direct_peer = %client.direct_peer,
            effective_client = %client.effective,
            via_proxy = client.forwarded,
            "Rejecting untrusted caller"
        );
        return forbidden(route);
    }

    request.extensions_mut().insert(client);
    next.run(request).await
}

fn forbidden(route: RouteClass) -> Response {
    metrics::counter!("gateway_trust_rejected", "route" => route.as_str()).increment(1);
    let err = ErrorResponse::new("caller is not inside a trusted network", ErrorType::Forbidden);
    <(StatusCode, Json<ErrorResponse>)>::from(err).into_response()
}
