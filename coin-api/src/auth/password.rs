use actix_web::web;

use crate::error::ApiError;

// bcrypt is CPU-bound; keep it off the async workers.

pub async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    let hashed = web::block(move || bcrypt::hash(password, cost)).await??;
    Ok(hashed)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    let matches = web::block(move || bcrypt::verify(password, &hash)).await??;
    Ok(matches)
}
