use std::path::Path;

use shared::{CLASS_NAMES, PredictionResponse, display_name, has_allowed_extension, is_healthy};

use crate::model::Classifier;
use crate::upload::TempUpload;

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("Model not loaded")]
    Unavailable,
    #[error("{0}")]
    BadRequest(String),
    #[error("Prediction failed: {0}")]
    Processing(String),
}

pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn predict(
    classifier: Option<&Classifier>,
    upload: Option<ImageUpload>,
    upload_dir: &Path,
) -> Result<PredictionResponse, PredictError> {
    let classifier = classifier.ok_or(PredictError::Unavailable)?;
    let upload = upload.ok_or_else(|| PredictError::BadRequest("no file provided".to_string()))?;
    if upload.filename.is_empty() {
        return Err(PredictError::BadRequest("no file selected".to_string()));
    }
    // Filename-string check only; the upload's content is not sniffed.
    if !has_allowed_extension(&upload.filename) {
        return Err(PredictError::BadRequest("invalid file type".to_string()));
    }

    let temp = TempUpload::write(upload_dir, &upload.filename, &upload.bytes)
        .map_err(|e| PredictError::Processing(e.to_string()))?;

    let img = image::open(temp.path()).map_err(|e| PredictError::Processing(e.to_string()))?;
    let input = shared::net::image_to_tensor(&img).unsqueeze(0);

    let probabilities = classifier
        .predict(&input)
        .map_err(|e| PredictError::Processing(e.to_string()))?;
    Ok(interpret(&probabilities))
}

pub fn interpret(probabilities: &[f32]) -> PredictionResponse {
    debug_assert_eq!(probabilities.len(), CLASS_NAMES.len());

    // Strictly-greater scan: ties resolve to the lowest index.
    let mut top_index = 0;
    let mut top_value = f32::NEG_INFINITY;
    for (index, probability) in probabilities.iter().enumerate() {
        if *probability > top_value {
            top_value = *probability;
            top_index = index;
        }
    }

    let label = CLASS_NAMES[top_index];
    let confidence = (f64::from(top_value) * 10000.0).round() / 100.0;
    let healthy = is_healthy(label);
    let all_predictions = CLASS_NAMES
        .iter()
        .zip(probabilities)
        .map(|(name, probability)| ((*name).to_string(), probability * 100.0))
        .collect();

    PredictionResponse {
        disease: display_name(label),
        predicted_class: label.to_string(),
        confidence,
        status: if healthy {
            "healthy".to_string()
        } else {
            "disease_detected".to_string()
        },
        is_healthy: healthy,
        all_predictions,
    }
}
