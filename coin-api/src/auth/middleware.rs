use super::validate_token;
use crate::error::ApiError;
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    Error, HttpMessage,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::{
    rc::Rc,
    task::{Context, Poll},
};

/// Paths reachable without a bearer token.
const PUBLIC_ROUTES: [&str; 6] = [
    "/",
    "/health",
    "/metrics",
    "/api/auth/login",
    "/api/auth/register",
    "/api/rewards/leaderboard",
];

pub struct AuthenticationMiddleware {
    jwt_secret: Rc<str>,
    exclude_routes: Rc<Vec<String>>,
}

impl AuthenticationMiddleware {
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            jwt_secret: Rc::from(jwt_secret),
            exclude_routes: Rc::new(PUBLIC_ROUTES.iter().map(|r| r.to_string()).collect()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthenticationMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthenticationMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthenticationMiddlewareService {
            service,
            jwt_secret: self.jwt_secret.clone(),
            exclude_routes: self.exclude_routes.clone(),
        })
    }
}

pub struct AuthenticationMiddlewareService<S> {
    service: S,
    jwt_secret: Rc<str>,
    exclude_routes: Rc<Vec<String>>,
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|auth_str| auth_str.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
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
        // Skip authentication for public routes and CORS preflight
        let is_public = self.exclude_routes.iter().any(|r| r == req.path());
        if is_public || *req.method() == Method::OPTIONS {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        let token = match bearer_token(&req) {
            Some(token) => token,
            None => {
                return Box::pin(async move {
                    Err(ApiError::Unauthorized("Missing authorization token".to_string()).into())
                });
            }
        };

        let claims = match validate_token(&token, &self.jwt_secret) {
            Ok(claims) => claims,
            Err(e) => return Box::pin(async move { Err(e.into()) }),
        };

        // Add claims to request extensions
        req.extensions_mut().insert(claims);

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res)
        })
    }
}
