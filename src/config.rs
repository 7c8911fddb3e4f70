use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Dossier";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sentence embedding model used by the ONNX similarity backend.
pub const EMBEDDING_MODEL_NAME: &str = "paraphrase-multilingual-MiniLM-L12-v2";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,dossier_lib=debug"
}

/// Application data directory: ~/Dossier/ (falls back to the working
/// directory when no home directory can be resolved).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the models directory (for ONNX embeddings, etc.)
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Embedding model directory (paraphrase-multilingual-MiniLM-L12-v2, covers Vietnamese)
pub fn embedding_model_dir() -> PathBuf {
    models_dir().join(EMBEDDING_MODEL_NAME)
}

/// Default location of the optional JSON pipeline configuration file.
pub fn pipeline_config_path() -> PathBuf {
    app_data_dir().join("pipeline.json")
}
