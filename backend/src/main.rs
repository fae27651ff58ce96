mod inference;
mod model;
mod routes;
mod state;
mod upload;

use std::env;
use std::path::{Path, PathBuf};

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};

use model::Classifier;
use routes::configure_routes;
use state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let model_path =
        env::var("MODEL_PATH").unwrap_or_else(|_| "model/disease_model.ot".to_string());
    let classifier = match Classifier::load(Path::new(&model_path)) {
        Ok(classifier) => {
            log::info!("Loaded classifier from {}", model_path);
            Some(classifier)
        }
        Err(e) => {
            log::error!(
                "Failed to load classifier from {}: {}. Serving in degraded mode.",
                model_path,
                e
            );
            None
        }
    };

    let upload_dir = env::var("UPLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("leaf-uploads"));
    std::fs::create_dir_all(&upload_dir)?;

    let state = web::Data::new(AppState {
        classifier,
        upload_dir,
    });

    let port = env::var("PORT").unwrap_or_else(|_| "8081".to_string());
    let bind_address = format!("0.0.0.0:{}", port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(state.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
