use actix_web::{web, HttpResponse, Scope};
use chrono::{DateTime, Utc};
use common::{
    models::{CompletedMission, NewTaskLog, NewUser, User, UserId},
    utils::Role,
    StoreError,
};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use super::Message;
use crate::{
    auth::{
        create_token,
        password::{hash_password, verify_password},
        AuthenticatedUser,
    },
    engine::claims::apply_referral_bonus,
    error::ApiError,
    metrics,
    state::AppState,
};

const REFERRAL_CODE_LEN: usize = 6;
const USER_EXISTS: &str = "User already exists";
const INVALID_CREDENTIALS: &str = "Invalid credentials";

pub fn scope() -> Scope {
    web::scope("/auth")
        .service(register)
        .service(login)
        .service(me)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64, message = "Username is required"))]
    pub username: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Subset of the profile the client caches right after login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub coins: i64,
    pub referral_code: String,
    pub role: Role,
    pub last_spin: Option<DateTime<Utc>>,
    pub last_scratch: Option<DateTime<Utc>>,
    pub completed_missions: Vec<CompletedMission>,
}

impl From<User> for SessionUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            coins: user.coins,
            referral_code: user.referral_code,
            role: user.role,
            last_spin: user.last_spin,
            last_scratch: user.last_scratch,
            completed_missions: user.completed_missions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: SessionUser,
}

fn random_referral_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFERRAL_CODE_LEN)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

async fn unused_referral_code(state: &AppState) -> Result<String, ApiError> {
    loop {
        let code = random_referral_code();
        if state.store.find_user_by_referral_code(&code).await?.is_none() {
            return Ok(code);
        }
    }
}

/// Credits the owner of `code`. A failure here never undoes the registration.
async fn credit_referrer(state: &AppState, code: &str) -> Result<(), ApiError> {
    let Some(mut referrer) = state.store.find_user_by_referral_code(code).await? else {
        info!("Referral code {} does not match any user", code);
        return Ok(());
    };

    let receipt = apply_referral_bonus(&mut referrer)
        .map_err(|e| ApiError::Internal(format!("referral bonus: {}", e)))?;
    let log = NewTaskLog {
        user_id: referrer.id,
        task_type: receipt.task_type,
        coins_earned: receipt.coins_earned,
    };
    let referrer = state.store.save_claim(&referrer, Some(log)).await?;
    metrics::record_credit(receipt.task_type.as_str(), receipt.coins_earned);

    info!(
        "Credited referrer {} with {} coins",
        referrer.id, receipt.coins_earned
    );
    Ok(())
}

#[actix_web::post("/register")]
async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Validation(USER_EXISTS.to_string()));
    }

    let password_hash = hash_password(req.password, state.config.bcrypt_cost).await?;
    let referred_by = req
        .referral_code
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());

    let new_user = NewUser {
        username: req.username.trim().to_string(),
        email,
        password_hash,
        referral_code: unused_referral_code(&state).await?,
        referred_by: referred_by.clone(),
    };

    let user = match state.store.create_user(new_user).await {
        Ok(user) => user,
        Err(StoreError::Duplicate(what)) => {
            info!("Registration lost a uniqueness race on {}", what);
            return Err(ApiError::Validation(USER_EXISTS.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    info!("Registered user {} ({})", user.id, user.username);
    metrics::record_registration();

    if let Some(code) = referred_by {
        if let Err(e) = credit_referrer(&state, &code).await {
            warn!("Referral bonus for code {} failed: {}", code, e);
        }
    }

    Ok(HttpResponse::Ok().json(Message::new("Registered successfully")))
}

#[actix_web::post("/login")]
async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();
    req.validate()?;

    let email = req.email.trim().to_lowercase();
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::Validation(INVALID_CREDENTIALS.to_string()))?;

    if !verify_password(req.password, user.password_hash.clone()).await? {
        info!("Failed login for user {}", user.id);
        return Err(ApiError::Validation(INVALID_CREDENTIALS.to_string()));
    }

    let token = create_token(
        user.id,
        user.role,
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        token,
        user: user.into(),
    }))
}

#[actix_web::get("/me")]
async fn me(
    caller: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user = state.load_user(caller.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}
