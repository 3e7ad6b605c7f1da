mod config;
mod model;
mod web;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web::Data};
use dotenv::dotenv;
use log::{info, error};

use config::Config;
use model::ModelManager;
use web::routes;

// App state structure
pub struct AppState {
    model: ModelManager,
}

fn cors(origins: &[String]) -> Cors {
    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting {}", web::handlers::SERVICE_NAME);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Provider choice is fixed for the life of the process
    let model = match ModelManager::from_config(&config) {
        Ok(model) => model,
        Err(e) => {
            error!("Failed to initialize LLM providers: {}", e);
            std::process::exit(1);
        }
    };

    let app_state = Data::new(AppState { model });
    let origins = config.cors_origins.clone();
    info!("CORS origins: {:?}", origins);
    info!("Listening on {}:{}", config.host, config.port);

    // Start web server
    HttpServer::new(move || {
        App::new()
            .wrap(cors(&origins))
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
