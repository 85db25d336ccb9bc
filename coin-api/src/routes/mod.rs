use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceFactory, ServiceRequest, ServiceResponse},
    error::JsonPayloadError,
    web, App, Error, HttpRequest, HttpResponse, Responder,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::{auth::AuthenticationMiddleware, error::ApiError, metrics, state::AppState};

pub mod admin;
pub mod auth;
pub mod game;
pub mod poll;
pub mod rewards;

#[cfg(test)]
mod tests;

#[derive(Debug, Serialize)]
pub(crate) struct Message {
    pub message: String,
}

impl Message {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[actix_web::get("/health")]
async fn health_check() -> impl Responder {
    debug!("Health check request arrived");
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[actix_web::get("/metrics")]
async fn metrics_endpoint() -> Result<HttpResponse, ApiError> {
    let body = metrics::render()?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> Error {
    info!("Rejected request body: {}", err);
    ApiError::Validation(format!("Invalid request body: {}", err)).into()
}

/// Mounts every route. Malformed JSON bodies become validation errors.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(health_check)
        .service(metrics_endpoint)
        .service(
            web::scope("/api")
                .service(auth::scope())
                .service(rewards::scope())
                .service(poll::scope())
                .service(game::scope())
                .service(admin::scope()),
        );
}

/// The application with state, routes and authentication wired in.
///
/// Transport concerns (CORS, rate limiting, access logs) are added by the
/// server in `main` so tests exercise the same routing without them.
pub fn build_app(
    state: web::Data<AppState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody>,
        Config = (),
        InitError = (),
        Error = Error,
    >,
> {
    let jwt_secret = state.config.jwt_secret.clone();
    App::new()
        .app_data(state)
        .configure(configure)
        .wrap(AuthenticationMiddleware::new(&jwt_secret))
        .wrap_fn(|req, srv| {
            metrics::record_request();
            srv.call(req)
        })
}
