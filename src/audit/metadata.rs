use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use ipnet::IpNet;

use crate::error::AppError;
use crate::models::AuditMetadata;
use crate::state::SharedState;

/// Where a mutation entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Api,
    OrderCreate,
    VisitSchedule,
    VisitUpdate,
    Rollback,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Api => "api",
            Source::OrderCreate => "order_create",
            Source::VisitSchedule => "visit_schedule",
            Source::VisitUpdate => "visit_update",
            Source::Rollback => "rollback",
        }
    }
}

/// Client provenance taken from the connection, never from the request body.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMeta {
    pub ip: String,
    pub user_agent: String,
}

impl RequestMeta {
    pub fn from_headers(
        headers: &HeaderMap,
        peer_addr: Option<IpAddr>,
        trusted_proxies: &[IpNet],
    ) -> Self {
        let user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        RequestMeta {
            ip: extract_ip(headers, peer_addr, trusted_proxies),
            user_agent,
        }
    }

    pub fn stamp(&self, source: Source, actor_id: String) -> AuditMetadata {
        AuditMetadata {
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
            source: source.as_str().to_string(),
            actor_id: Some(actor_id),
            rolled_back_log_id: None,
        }
    }
}

impl FromRequestParts<SharedState> for RequestMeta {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(RequestMeta::from_headers(
            &parts.headers,
            peer,
            &state.config.trusted_proxies,
        ))
    }
}

fn extract_ip(headers: &HeaderMap, peer_addr: Option<IpAddr>, trusted_proxies: &[IpNet]) -> String {
    let peer = peer_addr.unwrap_or(IpAddr::from([127, 0, 0, 1]));

    // X-Forwarded-For only counts when the direct peer is a trusted proxy
    if !trusted_proxies.is_empty() && trusted_proxies.iter().any(|net| net.contains(&peer)) {
        if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            for ip_str in xff.split(',').map(|s| s.trim()) {
                if let Ok(ip) = ip_str.parse::<IpAddr>() {
                    if !trusted_proxies.iter().any(|net| net.contains(&ip)) {
                        return ip.to_string();
                    }
                }
            }
        }
    }

    peer.to_string()
}
