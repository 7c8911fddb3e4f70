//! Document pipeline: recognize → fuse → extract → fallback → validate.
//!
//! All collaborators are injected, so the pipeline runs fully on mocks in
//! tests. `build_pipeline` wires the production ones from a `PipelineConfig`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::models::{DocumentRecord, DocumentType, ModelError, ProcessingStatus};
use crate::pipeline::ocr::{
    average_page_confidence, combined_text, EngineSet, OllamaVisionOcr, PageResult, RecognitionEngine,
    TesseractCli, PLAIN_TEXT_CONFIDENCE,
};
use crate::pipeline::structuring::{
    validate_fields, Capabilities, EntityExtractor, ExtractedField, ExtractionResult, FallbackController,
    FieldExtractor, FieldRegistry, FieldSpec, LazyCapability, LlmRemoteExtractor, OllamaClient, OllamaEmbedder,
    OpenAiClient, RegexEntityExtractor, RemoteExtractor, SimilarityModel, StructuringError, ValidationReport,
};
use crate::pipeline_config::{PipelineConfig, RemoteBackend, SimilarityBackend};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that cross the pipeline boundary. Everything else is absorbed
/// into lower confidence or a FAILED result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No field set registered for document type {0}")]
    UnknownDocumentType(DocumentType),

    #[error("Structuring setup failed: {0}")]
    Structuring(#[from] StructuringError),

    #[error("Invalid model value: {0}")]
    Model(#[from] ModelError),

    #[error("Pipeline setup failed: {0}")]
    Setup(String),
}

/// A document as handed to the pipeline.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    /// Already-extracted text; treated as one page.
    Text(String),
    /// One encoded image per page, in page order.
    Pages(Vec<Vec<u8>>),
}

/// Parse a document type name, reporting bad names as caller errors.
pub fn parse_document_type(name: &str) -> Result<DocumentType, PipelineError> {
    name.trim()
        .parse()
        .map_err(|e: ModelError| PipelineError::InvalidInput(e.to_string()))
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Pipeline {
    registry: FieldRegistry,
    engines: EngineSet,
    extractor: Arc<FieldExtractor>,
    fallback: FallbackController,
    min_confidence: f32,
}

/// Outcome of the extraction stages for one document.
struct StageOutcome {
    result: ExtractionResult,
    failed: bool,
}

impl Pipeline {
    pub fn new(
        registry: FieldRegistry,
        engines: EngineSet,
        extractor: FieldExtractor,
        fallback: FallbackController,
    ) -> Self {
        let min_confidence = fallback.policy().min_confidence;
        Self {
            registry,
            engines,
            extractor: Arc::new(extractor),
            fallback,
            min_confidence,
        }
    }

    /// Threshold for low-confidence validation warnings.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn engines(&self) -> &EngineSet {
        &self.engines
    }

    /// Recognize and fuse page images. One result per image, in order.
    pub async fn recognize_pages(&self, images: Vec<Vec<u8>>) -> Vec<PageResult> {
        self.engines.recognize_document(images).await
    }

    /// Extract the fields of `document_type` (plus `custom_fields`) from one
    /// document, with remote fallback when configured.
    pub async fn process(
        &self,
        input: DocumentInput,
        document_type: DocumentType,
        custom_fields: &[String],
    ) -> Result<ExtractionResult, PipelineError> {
        let fields = self.resolve_fields(document_type, custom_fields)?;
        let pages = self.pages_for(input).await;
        let text = combined_text(&pages);
        Ok(self.run_extraction(text, document_type, fields).await.result)
    }

    /// Full processing into a `DocumentRecord`. Without an explicit type,
    /// the type is detected from `filename`.
    pub async fn process_document(
        &self,
        filename: &str,
        input: DocumentInput,
        document_type: Option<DocumentType>,
        custom_fields: &[String],
    ) -> Result<DocumentRecord, PipelineError> {
        let document_type = document_type.unwrap_or_else(|| DocumentType::from_filename(filename));
        let fields = self.resolve_fields(document_type, custom_fields)?;
        let id = Uuid::new_v4();
        let span = tracing::info_span!("process_document", doc_id = %id, filename, %document_type);

        async move {
            let start = Instant::now();
            let mut record = DocumentRecord {
                id,
                filename: filename.to_string(),
                document_type,
                status: ProcessingStatus::Processing,
                ocr_results: Vec::new(),
                ai_extraction: ExtractionResult::failed(0.0),
                validation: ValidationReport::default(),
                total_pages: 0,
                ocr_confidence: 0.0,
                processing_time: 0.0,
                created_at: Utc::now(),
                updated_at: None,
            };

            record.ocr_results = self.pages_for(input).await;
            record.total_pages = record.ocr_results.len();
            record.ocr_confidence = average_page_confidence(&record.ocr_results);

            let outcome = self.run_extraction(record.combined_text(), document_type, fields).await;
            self.finish(&mut record, outcome, start);

            tracing::info!(
                status = %record.status,
                pages = record.total_pages,
                ocr_confidence = record.ocr_confidence,
                overall_confidence = record.ai_extraction.overall_confidence(),
                method = %record.ai_extraction.method,
                processing_time = record.processing_time,
                "Document processed"
            );
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Re-run extraction on stored OCR text, optionally as another document
    /// type. Page results are left as they are.
    pub async fn reprocess(
        &self,
        record: &mut DocumentRecord,
        document_type: Option<DocumentType>,
        custom_fields: &[String],
    ) -> Result<(), PipelineError> {
        let document_type = document_type.unwrap_or(record.document_type);
        let fields = self.resolve_fields(document_type, custom_fields)?;
        let span = tracing::info_span!("reprocess_document", doc_id = %record.id, %document_type);

        async move {
            let start = Instant::now();
            record.status = ProcessingStatus::Processing;
            let outcome = self.run_extraction(record.combined_text(), document_type, fields).await;
            record.document_type = document_type;
            self.finish(record, outcome, start);
            record.updated_at = Some(Utc::now());
            tracing::info!(status = %record.status, "Document reprocessed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub fn validate(&self, fields: &[ExtractedField]) -> ValidationReport {
        validate_fields(fields, self.min_confidence)
    }

    fn resolve_fields(
        &self,
        document_type: DocumentType,
        custom_fields: &[String],
    ) -> Result<Arc<[FieldSpec]>, PipelineError> {
        match self.registry.resolve(document_type, custom_fields) {
            Ok(fields) => Ok(fields.into()),
            Err(StructuringError::UnknownDocumentType(t)) => Err(PipelineError::UnknownDocumentType(t)),
            Err(e) => Err(e.into()),
        }
    }

    async fn pages_for(&self, input: DocumentInput) -> Vec<PageResult> {
        match input {
            DocumentInput::Text(text) if text.trim().is_empty() => vec![PageResult::empty(1)],
            DocumentInput::Text(text) => vec![PageResult {
                page_number: 1,
                text,
                confidence: PLAIN_TEXT_CONFIDENCE,
                bounding_box: None,
                sources: vec!["text".to_string()],
            }],
            DocumentInput::Pages(images) => self.recognize_pages(images).await,
        }
    }

    /// Local extraction on the blocking pool, then fallback. A panic during
    /// local extraction fails the document.
    async fn run_extraction(
        &self,
        text: String,
        document_type: DocumentType,
        fields: Arc<[FieldSpec]>,
    ) -> StageOutcome {
        let start = Instant::now();
        let extractor = Arc::clone(&self.extractor);
        let local_fields = Arc::clone(&fields);
        let local_text = text.clone();
        let local = tokio::task::spawn_blocking(move || extractor.extract(&local_text, &local_fields)).await;

        match local {
            Ok(local) => {
                let outcome = self.fallback.resolve(local, &text, document_type, &fields).await;
                StageOutcome {
                    result: outcome.result,
                    failed: false,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Local extraction aborted, document failed");
                StageOutcome {
                    result: ExtractionResult::failed(start.elapsed().as_secs_f64()),
                    failed: true,
                }
            }
        }
    }

    fn finish(&self, record: &mut DocumentRecord, outcome: StageOutcome, start: Instant) {
        if outcome.failed {
            record.status = ProcessingStatus::Failed;
            record.validation = ValidationReport {
                is_valid: false,
                errors: vec!["Extraction failed".to_string()],
                warnings: Vec::new(),
            };
        } else {
            record.status = ProcessingStatus::Completed;
            record.validation = self.validate(&outcome.result.fields);
        }
        record.ai_extraction = outcome.result;
        record.processing_time = start.elapsed().as_secs_f64();
    }
}

// ---------------------------------------------------------------------------
// Composition root
// ---------------------------------------------------------------------------

/// Wire production collaborators from `config`.
///
/// Checks OCR engines and builds blocking HTTP clients, so call it outside
/// the async runtime, or use [`build_pipeline_async`].
pub fn build_pipeline(config: &PipelineConfig) -> Result<Pipeline, PipelineError> {
    let registry = FieldRegistry::builtin()?;

    let mut engines: Vec<Arc<dyn RecognitionEngine>> = vec![Arc::new(TesseractCli::new(
        &config.tesseract_binary,
        &config.ocr_languages,
    ))];
    if let Some(model) = &config.vision_model {
        let client = Arc::new(OllamaClient::new(&config.ollama_url, config.engine_timeout_secs));
        engines.push(Arc::new(OllamaVisionOcr::new(client, model)));
    }
    let engines = EngineSet::new(engines)
        .with_timeout(config.engine_timeout())
        .with_policy(config.fusion_policy());

    let capabilities = Capabilities::new(
        similarity_capability(config),
        LazyCapability::ready("entities", Arc::new(RegexEntityExtractor::new()) as Arc<dyn EntityExtractor>),
    );
    let extractor = FieldExtractor::new(Arc::new(capabilities))
        .with_semantic_threshold(config.semantic_match_threshold)
        .with_entity_ranking(config.entity_ranking);

    let fallback = FallbackController::new(remote_extractor(config), config.fallback_policy());

    tracing::info!(
        engines = ?engines.engine_ids(),
        remote = ?config.remote_backend,
        similarity = ?config.similarity_backend,
        "Pipeline ready"
    );

    Ok(Pipeline::new(registry, engines, extractor, fallback).with_min_confidence(config.min_confidence_score))
}

/// [`build_pipeline`] on the blocking pool.
pub async fn build_pipeline_async(config: PipelineConfig) -> Result<Pipeline, PipelineError> {
    tokio::task::spawn_blocking(move || build_pipeline(&config))
        .await
        .map_err(|e| PipelineError::Setup(e.to_string()))?
}

fn similarity_capability(config: &PipelineConfig) -> LazyCapability<dyn SimilarityModel> {
    match config.similarity_backend {
        SimilarityBackend::None => LazyCapability::absent("similarity"),
        SimilarityBackend::Ollama => {
            let url = config.ollama_url.clone();
            let model = config.embedding_model.clone();
            let timeout = config.engine_timeout();
            LazyCapability::lazy("similarity", move || {
                Ok(Arc::new(OllamaEmbedder::new(&url, &model, timeout)) as Arc<dyn SimilarityModel>)
            })
        }
        #[cfg(feature = "onnx-embeddings")]
        SimilarityBackend::Onnx => LazyCapability::lazy("similarity", || {
            let embedder = crate::pipeline::structuring::OnnxEmbedder::load(&crate::config::embedding_model_dir())?;
            Ok(Arc::new(embedder) as Arc<dyn SimilarityModel>)
        }),
        #[cfg(not(feature = "onnx-embeddings"))]
        SimilarityBackend::Onnx => {
            tracing::warn!("ONNX similarity requested but the onnx-embeddings feature is off");
            LazyCapability::absent("similarity")
        }
    }
}

fn remote_extractor(config: &PipelineConfig) -> Option<Arc<dyn RemoteExtractor>> {
    match config.remote_backend {
        RemoteBackend::None => None,
        RemoteBackend::Ollama => {
            let client = Arc::new(OllamaClient::new(&config.ollama_url, config.remote_timeout_secs));
            Some(Arc::new(LlmRemoteExtractor::new(client, &config.remote_model)))
        }
        RemoteBackend::OpenAi => match &config.openai_api_key {
            Some(key) => {
                let client = Arc::new(OpenAiClient::new(
                    &config.openai_base_url,
                    key,
                    config.fallback_policy().remote_timeout,
                ));
                Some(Arc::new(LlmRemoteExtractor::new(client, &config.remote_model)))
            }
            None => {
                tracing::warn!("OpenAI remote extraction configured without OPENAI_API_KEY, disabled");
                None
            }
        },
    }
}
