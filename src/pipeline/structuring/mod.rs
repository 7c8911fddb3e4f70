pub mod types;
pub mod confidence;
pub mod catalog;
pub mod registry;
pub mod capability;
pub mod strategy;
pub mod pattern;
pub mod semantic;
pub mod entity;
pub mod embedder;
pub mod extractor;
pub mod prompt;
pub mod parser;
pub mod ollama;
pub mod openai;
pub mod remote;
pub mod fallback;
pub mod validation;

pub use types::*;
pub use confidence::*;
pub use registry::*;
pub use capability::*;
pub use strategy::*;
pub use entity::{EntityRanking, RegexEntityExtractor};
pub use embedder::*;
pub use extractor::*;
pub use ollama::*;
pub use openai::*;
pub use remote::*;
pub use fallback::*;
pub use validation::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::models::DocumentType;

#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("Ollama is not running at {0}")]
    OllamaConnection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    OllamaError { status: u16, body: String },

    #[error("Remote API returned error (status {status}): {body}")]
    RemoteApi { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Invalid pattern for field {field}: {message}")]
    InvalidPattern { field: String, message: String },

    #[error("No field set registered for document type {0}")]
    UnknownDocumentType(DocumentType),

    #[error("Capability not available: {0}")]
    CapabilityUnavailable(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Entity recognition failed: {0}")]
    EntityRecognition(String),

    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),
}
