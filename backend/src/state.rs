use std::path::PathBuf;

use crate::model::Classifier;

// Constructed once at startup and shared read-only with every worker. A
// missing classifier means degraded mode: health stays reachable,
// predictions return 503.
pub struct AppState {
    pub classifier: Option<Classifier>,
    pub upload_dir: PathBuf,
}
