use actix_web::{web, HttpResponse, Scope};
use common::{models::UserId, utils::Role};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::Message;
use crate::{auth::AdminUser, error::ApiError, state::AppState};

pub fn scope() -> Scope {
    web::scope("/admin")
        .service(list_users)
        .service(delete_user)
        .service(update_role)
        .service(create_poll)
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewPollRequest {
    #[validate(length(min = 1, message = "Question is required"))]
    pub question: String,
    pub options: Vec<String>,
}

impl NewPollRequest {
    fn cleaned_options(&self) -> Result<Vec<String>, ApiError> {
        let options: Vec<String> = self
            .options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if options.len() < 2 {
            return Err(ApiError::Validation(
                "A poll needs at least two options".to_string(),
            ));
        }
        Ok(options)
    }
}

#[actix_web::get("/users")]
async fn list_users(
    _admin: AdminUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let users = state.store.list_users().await?;
    Ok(HttpResponse::Ok().json(users))
}

#[actix_web::delete("/users/{id}")]
async fn delete_user(
    admin: AdminUser,
    path: web::Path<UserId>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    if !state.store.delete_user(user_id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    info!("Admin {} deleted user {}", admin.0.user_id, user_id);
    Ok(HttpResponse::Ok().json(Message::new("User deleted")))
}

#[actix_web::patch("/users/{id}/role")]
async fn update_role(
    admin: AdminUser,
    path: web::Path<UserId>,
    req: web::Json<RoleUpdate>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let mut user = state.load_user(path.into_inner()).await?;
    user.role = req.role;
    let user = state.store.save_user(&user).await?;

    info!("Admin {} set user {} role to {}", admin.0.user_id, user.id, user.role);
    Ok(HttpResponse::Ok().json(user))
}

#[actix_web::post("/polls")]
async fn create_poll(
    admin: AdminUser,
    req: web::Json<NewPollRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    req.validate()?;
    let options = req.cleaned_options()?;

    let poll = state
        .store
        .create_poll(req.question.trim(), &options, state.now())
        .await?;

    info!("Admin {} published poll {}", admin.0.user_id, poll.id);
    Ok(HttpResponse::Created().json(poll))
}
