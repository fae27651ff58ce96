use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod net;

// Index order is the contract between the classifier's output vector and the
// label names. It matches the sorted class-directory order the trainer sees;
// never reorder without retraining.
pub const CLASS_NAMES: [&str; 15] = [
    "Pepper__bell___Bacterial_spot",
    "Pepper__bell___healthy",
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
    "Tomato_Bacterial_spot",
    "Tomato_Early_blight",
    "Tomato_Late_blight",
    "Tomato_Leaf_Mold",
    "Tomato_Septoria_leaf_spot",
    "Tomato_Spider_mites_Two_spotted_spider_mite",
    "Tomato_Target_Spot",
    "Tomato_Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato_Tomato_mosaic_virus",
    "Tomato_healthy",
];

pub const NUM_CLASSES: i64 = CLASS_NAMES.len() as i64;

// Square input size the classifier is trained and served at.
pub const IMAGE_SIZE: u32 = 224;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

pub fn has_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

// Double underscores become one space first, then remaining single
// underscores become spaces. The substitution order matters for class names
// like "Pepper__bell___Bacterial_spot".
pub fn display_name(label: &str) -> String {
    label.replace("__", " ").replace('_', " ")
}

pub fn is_healthy(label: &str) -> bool {
    label.to_lowercase().contains("healthy")
}

#[derive(Serialize, Deserialize, Clone)]
pub struct PredictionResponse {
    pub disease: String,
    pub predicted_class: String,
    pub confidence: f64,
    pub status: String,
    pub is_healthy: bool,
    pub all_predictions: BTreeMap<String, f32>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}
