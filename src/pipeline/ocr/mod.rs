pub mod types;
pub mod confidence;
pub mod engines;
pub mod fusion;
pub mod tesseract;
pub mod vision;

pub use types::*;
pub use confidence::*;
pub use engines::*;
pub use fusion::*;
pub use tesseract::*;
pub use vision::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR engine not available: {0}")]
    EngineUnavailable(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("OCR engine {engine} exited with status {status}: {stderr}")]
    EngineExit {
        engine: String,
        status: i32,
        stderr: String,
    },

    #[error("Vision OCR failed: {0}")]
    Vision(String),
}
