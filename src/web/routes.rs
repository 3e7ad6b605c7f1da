use actix_web::web;
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(handlers::json_error))
        .route("/health", web::get().to(handlers::health_check))
        .route("/chat", web::post().to(handlers::chat))
        .route("/analyze", web::post().to(handlers::analyze))
        .route("/suggest", web::post().to(handlers::suggest));
}
