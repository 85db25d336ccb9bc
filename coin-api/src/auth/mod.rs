use actix_web::{dev::Payload, web, Error, FromRequest, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use common::{models::UserId, utils::Role};
use futures::future::{err, ok, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, state::AppState};

mod middleware;
pub mod password;

pub use middleware::AuthenticationMiddleware;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub role: Role,
    pub exp: usize, // Expiration timestamp
    pub iat: usize, // Issued at timestamp
}

/// Caller identity resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub role: Role,
}

fn authenticated(req: &HttpRequest) -> Result<AuthenticatedUser, ApiError> {
    // Claims are placed in the request extensions by the auth middleware
    let extensions = req.extensions();
    let claims = extensions
        .get::<Claims>()
        .ok_or_else(|| ApiError::Unauthorized("User not authenticated".to_string()))?;

    let user_id = claims
        .sub
        .parse::<UserId>()
        .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;

    Ok(AuthenticatedUser {
        user_id,
        role: claims.role,
    })
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match authenticated(req) {
            Ok(user) => ok(user),
            Err(e) => err(e.into()),
        }
    }
}

/// An [`AuthenticatedUser`] whose stored role is admin.
///
/// The role in the token is only as fresh as the last login, so the store
/// is consulted on every admin request.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequest for AdminUser {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let caller = authenticated(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let caller = caller?;
            let state =
                state.ok_or_else(|| ApiError::Internal("Application state missing".to_string()))?;

            let stored = state
                .store
                .find_user(caller.user_id)
                .await
                .map_err(ApiError::from)?
                .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;
            if stored.role != Role::Admin {
                return Err(ApiError::Forbidden("Admin access required".to_string()).into());
            }

            Ok(AdminUser(AuthenticatedUser {
                user_id: stored.id,
                role: stored.role,
            }))
        })
    }
}

pub fn create_token(
    user_id: UserId,
    role: Role,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let exp = (now + Duration::seconds(expiration_seconds as i64)).timestamp() as usize;
    let iat = now.timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp,
        iat,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Token creation error: {}", e)))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ApiError::Unauthorized("Token expired".to_string())
        }
        _ => ApiError::Unauthorized("Invalid token".to_string()),
    })
}
