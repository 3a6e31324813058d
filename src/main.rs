use actix_web::{web, App, HttpServer};
use log::{error, info, warn};

use gallery_server::api;
use gallery_server::app_state::AppState;
use gallery_server::config::AppConfig;
use gallery_server::service::reconcile_worker::ReconcileWorker;

fn init_logging(config_file: &str) {
    if let Err(e) = log4rs::init_file(config_file, Default::default()) {
        // Fall back to RUST_LOG-driven stderr logging
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        warn!("Could not load log config {}: {}; using env_logger", config_file, e);
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::load().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    init_logging(&config.logging.config_file);
    config.log_startup();

    let app_state = AppState::from_config(config.clone()).map_err(|e| {
        error!("Failed to initialize stores: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    if config.reconcile.enabled {
        ReconcileWorker::new(app_state.gallery_service.clone(), &config.reconcile).start_background();
    } else {
        info!("Reconcile worker disabled");
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let max_payload_size = config.server.max_payload_size;
    info!("Starting gallery server on {}:{}", host, port);

    let data = web::Data::new(app_state);
    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(data.clone())
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .configure(api::configure)
    })
    .workers(config.server.workers.max(1))
    .bind((host.as_str(), port))?
    .run()
    .await
}
