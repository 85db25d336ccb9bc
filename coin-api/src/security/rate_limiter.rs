use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use dashmap::DashMap;
use futures::future::{ok, LocalBoxFuture, Ready};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tracing::warn;

use crate::error::ApiError;

const WINDOW: Duration = Duration::from_secs(60);
// Expired windows are dropped once every this many requests.
const SWEEP_EVERY: usize = 1024;

// Per-IP fixed window: request count and when the window opened.
type IpWindows = Arc<DashMap<String, (usize, Instant)>>;

#[derive(Clone)]
pub struct RateLimiter {
    // Requests per minute allowed
    requests_per_minute: usize,
    // Key on X-Forwarded-For / Forwarded instead of the socket peer
    trust_forwarded: bool,
    ip_tracking: IpWindows,
    seen: Arc<AtomicUsize>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: usize) -> Self {
        RateLimiter {
            requests_per_minute,
            trust_forwarded: false,
            ip_tracking: Arc::new(DashMap::new()),
            seen: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Only enable behind a proxy that overwrites the forwarding headers.
    pub fn trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }
}

/// Drops every window that has already run out.
fn sweep(windows: &IpWindows, now: Instant) {
    windows.retain(|_, (_, opened)| now.duration_since(*opened) <= WINDOW);
}

fn client_key(req: &ServiceRequest, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(ip) = req.connection_info().realip_remote_addr() {
            return ip.to_string();
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Counts one request from `ip`; `false` once the window's budget is spent.
fn admit(windows: &IpWindows, limit: usize, ip: &str, now: Instant) -> bool {
    let mut entry = windows.entry(ip.to_string()).or_insert((0, now));
    let (count, opened) = *entry;

    if now.duration_since(opened) > WINDOW {
        *entry = (1, now);
        true
    } else if count >= limit {
        false
    } else {
        *entry = (count + 1, opened);
        true
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimiterMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimiterMiddleware {
            service,
            requests_per_minute: self.requests_per_minute,
            trust_forwarded: self.trust_forwarded,
            ip_tracking: self.ip_tracking.clone(),
            seen: self.seen.clone(),
        })
    }
}

pub struct RateLimiterMiddleware<S> {
    service: S,
    requests_per_minute: usize,
    trust_forwarded: bool,
    ip_tracking: IpWindows,
    seen: Arc<AtomicUsize>,
}

impl<S, B> Service<ServiceRequest> for RateLimiterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Skip rate limiting for health checks
        if req.path() == "/health" {
            return Box::pin(self.service.call(req));
        }

        let ip = client_key(&req, self.trust_forwarded);
        let now = Instant::now();

        if self.seen.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            sweep(&self.ip_tracking, now);
        }

        if !admit(&self.ip_tracking, self.requests_per_minute, &ip, now) {
            warn!("Rate limit exceeded for {}", ip);
            return Box::pin(async move {
                Err(ApiError::RateLimited(
                    "Too many requests. Try again later.".to_string(),
                )
                .into())
            });
        }

        Box::pin(self.service.call(req))
    }
}
