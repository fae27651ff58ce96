use std::io::Write;

use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::error;
use serde_json::json;

use shared::HealthResponse;

use crate::inference::{self, ImageUpload, PredictError};
use crate::state::AppState;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/predict").route(web::post().to(handle_predict)));
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.classifier.is_some(),
    })
}

async fn handle_predict(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut upload: Option<ImageUpload> = None;

    while let Ok(Some(mut field)) = payload.try_next().await {
        let (is_file_field, filename) = {
            let disposition = field.content_disposition();
            (
                disposition.and_then(|d| d.get_name()) == Some("file"),
                disposition
                    .and_then(|d| d.get_filename())
                    .unwrap_or_default()
                    .to_string(),
            )
        };
        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            bytes.write_all(&data)?;
        }
        if !is_file_field {
            continue;
        }
        upload = Some(ImageUpload { filename, bytes });
    }

    let result = inference::predict(state.classifier.as_ref(), upload, &state.upload_dir);
    Ok(match result {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(PredictError::Unavailable) => {
            error!("Prediction requested while no model is loaded");
            HttpResponse::ServiceUnavailable().json(json!({
                "error": "Model not loaded",
                "status": "unavailable",
            }))
        }
        Err(PredictError::BadRequest(message)) => {
            HttpResponse::BadRequest().json(json!({ "error": message }))
        }
        Err(PredictError::Processing(details)) => {
            error!("Prediction failed: {}", details);
            HttpResponse::InternalServerError().json(json!({
                "error": "Prediction failed",
                "details": details,
            }))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Classifier;
    use actix_web::{App, test};
    use shared::net::leaf_cnn;
    use shared::{NUM_CLASSES, PredictionResponse};
    use std::io::Cursor;
    use std::path::Path;
    use tch::{Device, nn};

    const BOUNDARY: &str = "leafboundary";

    fn app_state(classifier: Option<Classifier>, upload_dir: &Path) -> web::Data<AppState> {
        web::Data::new(AppState {
            classifier,
            upload_dir: upload_dir.to_path_buf(),
        })
    }

    fn untrained_classifier(dir: &Path) -> Classifier {
        let weights = dir.join("weights.ot");
        let vs = nn::VarStore::new(Device::Cpu);
        let _net = leaf_cnn(&vs.root(), NUM_CLASSES);
        vs.save(&weights).unwrap();
        Classifier::load(&weights).unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            8,
            8,
            image::Rgb([30, 160, 60]),
        ));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn multipart_body(field_name: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field_name}\"; \
                 filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(field_name: &str, filename: &str, bytes: &[u8]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/predict")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart_body(field_name, filename, bytes))
    }

    #[actix_web::test]
    async fn health_reports_degraded_mode() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(app_state(None, dir.path()))
                .configure(configure_routes),
        )
        .await;

        let response = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model_loaded"], false);
    }

    #[actix_web::test]
    async fn health_reports_loaded_model() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = untrained_classifier(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(app_state(Some(classifier), dir.path()))
                .configure(configure_routes),
        )
        .await;

        let response = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["model_loaded"], true);
    }

    #[actix_web::test]
    async fn predict_without_model_is_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(app_state(None, dir.path()))
                .configure(configure_routes),
        )
        .await;

        let request = multipart_request("file", "leaf.png", &png_bytes()).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 503);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["status"], "unavailable");
    }

    #[actix_web::test]
    async fn predict_without_file_field_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = untrained_classifier(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(app_state(Some(classifier), dir.path()))
                .configure(configure_routes),
        )
        .await;

        let request = multipart_request("other", "leaf.png", &png_bytes()).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 400);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["error"], "no file provided");
    }

    #[actix_web::test]
    async fn predict_rejects_disallowed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = untrained_classifier(dir.path());
        let app = test::init_service(
            App::new()
                .app_data(app_state(Some(classifier), dir.path()))
                .configure(configure_routes),
        )
        .await;

        let request = multipart_request("file", "payload.exe", &png_bytes()).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 400);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["error"], "invalid file type");
    }

    #[actix_web::test]
    async fn predict_reports_decode_failures_and_cleans_up() {
        let weights_dir = tempfile::tempdir().unwrap();
        let upload_dir = tempfile::tempdir().unwrap();
        let classifier = untrained_classifier(weights_dir.path());
        let app = test::init_service(
            App::new()
                .app_data(app_state(Some(classifier), upload_dir.path()))
                .configure(configure_routes),
        )
        .await;

        let request = multipart_request("file", "broken.png", b"definitely not a png").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 500);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["error"], "Prediction failed");
        assert!(body["details"].is_string());
        assert_eq!(std::fs::read_dir(upload_dir.path()).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn predict_returns_full_prediction_payload() {
        let weights_dir = tempfile::tempdir().unwrap();
        let upload_dir = tempfile::tempdir().unwrap();
        let classifier = untrained_classifier(weights_dir.path());
        let app = test::init_service(
            App::new()
                .app_data(app_state(Some(classifier), upload_dir.path()))
                .configure(configure_routes),
        )
        .await;

        let request = multipart_request("file", "leaf.JPG.png", &png_bytes()).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 200);
        let body: PredictionResponse = test::read_body_json(response).await;
        assert!(shared::CLASS_NAMES.contains(&body.predicted_class.as_str()));
        assert_eq!(body.all_predictions.len(), 15);
        let total: f32 = body.all_predictions.values().sum();
        assert!((total - 100.0).abs() < 1e-2);
        assert_eq!(
            body.status,
            if body.is_healthy { "healthy" } else { "disease_detected" }
        );
        assert_eq!(std::fs::read_dir(upload_dir.path()).unwrap().count(), 0);
    }
}
