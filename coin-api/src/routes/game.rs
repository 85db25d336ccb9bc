use std::str::FromStr;

use actix_web::{web, HttpResponse, Scope};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::{
    auth::AuthenticatedUser,
    engine::{
        jackpot::{debit_ticket, JackpotView, TICKET_PRICE},
        upgrades::{purchase_upgrade, UpgradeKind},
    },
    error::ApiError,
    metrics,
    state::AppState,
};

pub fn scope() -> Scope {
    web::scope("/game")
        .service(upgrade)
        .service(jackpot)
        .service(buy_ticket)
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    #[serde(rename = "type")]
    pub upgrade_type: String,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub message: String,
    pub coins: i64,
    pub tickets: usize,
    pub pot: i64,
}

#[actix_web::post("/upgrade")]
async fn upgrade(
    caller: AuthenticatedUser,
    req: web::Json<UpgradeRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let kind = UpgradeKind::from_str(&req.upgrade_type)
        .map_err(|_| ApiError::Validation("Invalid upgrade type".to_string()))?;

    let mut user = state.load_user(caller.user_id).await?;
    let tier = purchase_upgrade(&mut user, kind)
        .map_err(|e| ApiError::ineligible(e.to_string(), user.coins))?;

    let user = state.store.save_user(&user).await?;
    metrics::record_spend(kind.as_str(), tier.cost);
    info!("User {} bought {} level {}", user.id, kind, tier.level);

    // The level is reported under the field name of the ladder that moved.
    let mut body = Map::new();
    body.insert("message".to_string(), json!("Upgrade successful"));
    body.insert("coins".to_string(), json!(user.coins));
    body.insert(kind.level_field().to_string(), json!(kind.level_of(&user)));
    Ok(HttpResponse::Ok().json(Value::Object(body)))
}

#[actix_web::get("/jackpot")]
async fn jackpot(
    caller: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let pool = state.store.current_jackpot(state.now()).await?;
    Ok(HttpResponse::Ok().json(JackpotView::for_user(&pool, caller.user_id)))
}

#[actix_web::post("/jackpot/buy")]
async fn buy_ticket(
    caller: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let mut user = state.load_user(caller.user_id).await?;
    debit_ticket(&mut user).map_err(|e| ApiError::ineligible(e.to_string(), user.coins))?;

    let pool = state.store.current_jackpot(state.now()).await?;
    let (user, pool) = state
        .store
        .save_ticket_purchase(&user, pool.id, TICKET_PRICE)
        .await?;

    metrics::record_spend("jackpot", TICKET_PRICE);
    metrics::record_ticket();
    info!(
        "User {} bought a ticket for pool {}, pot {}",
        user.id, pool.id, pool.pot
    );

    Ok(HttpResponse::Ok().json(TicketResponse {
        message: "Ticket purchased".to_string(),
        coins: user.coins,
        tickets: pool.tickets_for(user.id),
        pot: pool.pot,
    }))
}
