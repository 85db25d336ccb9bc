use actix_web::{web, HttpResponse, Scope};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::rewards::{claim_log, lost_write, record_credited, refusal};
use crate::{
    auth::AuthenticatedUser, engine::claims::apply_poll_vote, error::ApiError, metrics,
    state::AppState,
};

pub fn scope() -> Scope {
    web::scope("/poll").service(active_poll).service(vote)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub option_index: i64,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub message: String,
    pub coins: i64,
}

#[actix_web::get("")]
async fn active_poll(
    _caller: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    // Serialises to `null` when no poll has been published.
    let poll = state.store.active_poll().await?;
    Ok(HttpResponse::Ok().json(poll))
}

#[actix_web::post("/vote")]
async fn vote(
    caller: AuthenticatedUser,
    req: web::Json<VoteRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let mut user = state.load_user(caller.user_id).await?;

    let receipt = match apply_poll_vote(&mut user, &state.rules(), state.now()) {
        Ok(receipt) => receipt,
        Err(e) => {
            metrics::record_claim("poll-vote", "refused");
            return Err(refusal(e, user.coins));
        }
    };

    let poll = state
        .store
        .active_poll()
        .await?
        .ok_or_else(|| ApiError::NotFound("No poll found".to_string()))?;

    let option_index = usize::try_from(req.option_index)
        .ok()
        .filter(|i| *i < poll.options.len())
        .ok_or_else(|| ApiError::Validation("Invalid option".to_string()))?;

    // Credit, log and tally land together or not at all.
    let (user, poll) = state
        .store
        .save_vote(&user, claim_log(&user, &receipt), poll.id, option_index)
        .await
        .map_err(|e| lost_write(&receipt, e))?;
    record_credited(&receipt, user.id);
    info!("User {} voted option {} on poll {}", user.id, option_index, poll.id);

    Ok(HttpResponse::Ok().json(VoteResponse {
        message: receipt.message,
        coins: user.coins,
    }))
}
