use std::str::FromStr;

use actix_web::{web, HttpResponse, Scope};
use chrono::{DateTime, Utc};
use common::{
    models::{CompletedMission, NewTaskLog, User, UserId},
    StoreError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    auth::AuthenticatedUser,
    engine::claims::{
        apply_claim, apply_daily_login, ClaimError, ClaimPayload, ClaimReceipt, ClaimType,
    },
    error::ApiError,
    metrics,
    state::AppState,
};

const LEADERBOARD_SIZE: i64 = 10;

pub fn scope() -> Scope {
    web::scope("/rewards")
        .service(daily_login)
        .service(earn)
        .service(leaderboard)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnRequest {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub watch_time: Option<f64>,
    pub amount: Option<i64>,
    pub mission_id: Option<String>,
}

impl EarnRequest {
    fn payload(&self) -> ClaimPayload {
        ClaimPayload {
            watch_time: self.watch_time,
            amount: self.amount,
            mission_id: self.mission_id.clone(),
        }
    }
}

/// Balance plus every timestamp the client renders its cooldowns from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub coins: i64,
    pub coins_earned: i64,
    pub daily_streak: i32,
    pub last_daily_login: Option<DateTime<Utc>>,
    pub last_spin: Option<DateTime<Utc>>,
    pub last_scratch: Option<DateTime<Utc>>,
    pub last_video_reward: Option<DateTime<Utc>>,
    pub completed_missions: Vec<CompletedMission>,
    pub message: String,
}

impl ClaimResponse {
    fn new(user: User, coins_earned: i64, message: String) -> Self {
        Self {
            coins: user.coins,
            coins_earned,
            daily_streak: user.daily_streak,
            last_daily_login: user.last_daily_login,
            last_spin: user.last_spin,
            last_scratch: user.last_scratch,
            last_video_reward: user.last_video_reward,
            completed_missions: user.completed_missions,
            message,
        }
    }
}

pub(crate) fn refusal(err: ClaimError, coins: i64) -> ApiError {
    if err.is_validation() {
        ApiError::Validation(err.to_string())
    } else {
        ApiError::ineligible(err.to_string(), coins)
    }
}

/// Task-log row for a receipt; zero-coin outcomes are not logged.
pub(crate) fn claim_log(user: &User, receipt: &ClaimReceipt) -> Option<NewTaskLog> {
    (receipt.coins_earned > 0).then(|| NewTaskLog {
        user_id: user.id,
        task_type: receipt.task_type,
        coins_earned: receipt.coins_earned,
    })
}

pub(crate) fn lost_write(receipt: &ClaimReceipt, err: StoreError) -> ApiError {
    metrics::record_claim(receipt.task_type.as_str(), "conflict");
    ApiError::from(err)
}

pub(crate) fn record_credited(receipt: &ClaimReceipt, user_id: UserId) {
    metrics::record_claim(receipt.task_type.as_str(), "credited");
    metrics::record_credit(receipt.task_type.as_str(), receipt.coins_earned);
    debug!(
        "User {} earned {} coins from {}",
        user_id, receipt.coins_earned, receipt.task_type
    );
}

/// Persists a mutated user together with its task log. Only the first writer
/// of a given version wins; everyone else gets a conflict and no coins.
pub(crate) async fn settle(
    state: &AppState,
    user: &User,
    receipt: &ClaimReceipt,
) -> Result<User, ApiError> {
    let saved = state
        .store
        .save_claim(user, claim_log(user, receipt))
        .await
        .map_err(|e| lost_write(receipt, e))?;
    record_credited(receipt, saved.id);
    Ok(saved)
}

#[actix_web::post("/daily-login")]
async fn daily_login(
    caller: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let mut user = state.load_user(caller.user_id).await?;
    let receipt = match apply_daily_login(&mut user, &state.rules(), state.now()) {
        Ok(receipt) => receipt,
        Err(e) => {
            metrics::record_claim(ClaimType::DailyLogin.as_str(), "refused");
            return Err(refusal(e, user.coins));
        }
    };

    let user = settle(&state, &user, &receipt).await?;
    info!("User {} daily login, streak {}", user.id, user.daily_streak);
    Ok(HttpResponse::Ok().json(ClaimResponse::new(
        user,
        receipt.coins_earned,
        receipt.message,
    )))
}

#[actix_web::post("/earn")]
async fn earn(
    caller: AuthenticatedUser,
    req: web::Json<EarnRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let mut user = state.load_user(caller.user_id).await?;

    let claim_type = match ClaimType::from_str(&req.claim_type) {
        Ok(claim_type) => claim_type,
        Err(_) => {
            // Unrecognised types credit nothing and touch nothing.
            debug!("Ignoring unknown claim type {:?}", req.claim_type);
            return Ok(HttpResponse::Ok().json(ClaimResponse::new(
                user,
                0,
                "Reward credited successfully".to_string(),
            )));
        }
    };

    let receipt = match apply_claim(
        &mut user,
        claim_type,
        &req.payload(),
        &state.rules(),
        state.now(),
    ) {
        Ok(receipt) => receipt,
        Err(e) => {
            metrics::record_claim(claim_type.as_str(), "refused");
            return Err(refusal(e, user.coins));
        }
    };

    let user = settle(&state, &user, &receipt).await?;
    Ok(HttpResponse::Ok().json(ClaimResponse::new(
        user,
        receipt.coins_earned,
        receipt.message,
    )))
}

#[actix_web::get("/leaderboard")]
async fn leaderboard(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let leaders = state.store.leaderboard(LEADERBOARD_SIZE).await?;
    Ok(HttpResponse::Ok().json(leaders))
}
