use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tracing::warn;

use crate::{
    models::error::Error,
    utils::{rate_limiter::retry_after_secs, state::AppState},
};

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, Error> {
    let ip = client_ip(&req);

    if let Err(delay) = state.rate_limiter.check(ip) {
        let secs = retry_after_secs(delay);
        warn!(%ip, path = %req.uri().path(), retry_after = secs, "Rate limit exceeded");
        return Err(Error::rate_limited(secs));
    }

    Ok(next.run(req).await)
}

/// First `X-Forwarded-For` hop, else the socket peer.
pub fn client_ip(req: &Request) -> IpAddr {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
