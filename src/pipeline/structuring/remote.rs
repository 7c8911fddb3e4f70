use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::confidence::strategy_confidence::REMOTE_DEFAULT;
use super::parser::{parse_extraction_response, RawExtraction, RawField};
use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::registry::FieldSpec;
use super::types::{ExtractedField, ExtractionResult, LlmClient, RemoteExtractor};
use super::StructuringError;
use crate::models::{DocumentType, ExtractionMethod, StrategyKind};
use crate::pipeline::ocr::clamp_confidence;

/// Whole-document extraction by a hosted or local LLM.
pub struct LlmRemoteExtractor {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl LlmRemoteExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            llm,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl RemoteExtractor for LlmRemoteExtractor {
    fn extract(
        &self,
        text: &str,
        document_type: DocumentType,
        fields: &[FieldSpec],
    ) -> Result<ExtractionResult, StructuringError> {
        let start = Instant::now();
        let _span = tracing::info_span!("remote_extraction", model = %self.model, %document_type).entered();

        let prompt = build_extraction_prompt(text, document_type, fields);
        let response = self.llm.generate(&self.model, &prompt, EXTRACTION_SYSTEM_PROMPT)?;
        let raw = parse_extraction_response(&response)?;

        let result = normalize_remote_fields(raw, fields, start.elapsed().as_secs_f64());
        tracing::info!(
            fields = result.fields.len(),
            overall_confidence = result.overall_confidence(),
            "Remote extraction complete"
        );
        Ok(result)
    }
}

/// Map the model's answer onto the requested fields.
///
/// Output follows `fields` order with exactly one entry per spec. Names the
/// model invented are dropped; fields it skipped come back empty. A missing
/// confidence counts as 0.5, and an empty value always carries 0.
pub fn normalize_remote_fields(raw: RawExtraction, fields: &[FieldSpec], processing_time: f64) -> ExtractionResult {
    let mut by_name: HashMap<String, RawField> = HashMap::new();
    let mut unknown = 0usize;
    for field in raw.fields {
        if !fields.iter().any(|f| f.name == field.name) {
            unknown += 1;
            continue;
        }
        by_name.entry(field.name.clone()).or_insert(field);
    }
    if unknown > 0 {
        tracing::debug!(unknown, "Dropped fields not requested from the remote model");
    }

    let extracted = fields
        .iter()
        .map(|spec| match by_name.remove(&spec.name) {
            Some(raw) if !raw.value.is_empty() => ExtractedField {
                name: spec.name.clone(),
                value: raw.value,
                value_type: spec.value_type,
                confidence: clamp_confidence(raw.confidence.unwrap_or(REMOTE_DEFAULT)),
                is_required: spec.required,
                is_verified: false,
                original_text: raw.original_text,
                source_strategy: Some(StrategyKind::Remote),
            },
            _ => ExtractedField::empty(spec),
        })
        .collect();

    ExtractionResult::new(extracted, processing_time, ExtractionMethod::Remote)
}

// ──────────────────────────────────────────────
// Mock
// ──────────────────────────────────────────────

enum MockBehavior {
    Fixed(ExtractionResult),
    /// Every requested field gets the same value and confidence.
    Uniform { value: String, confidence: f32 },
    Fail,
}

/// Mock remote extractor with a call counter and optional delay.
pub struct MockRemoteExtractor {
    behavior: MockBehavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockRemoteExtractor {
    fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn returning(result: ExtractionResult) -> Self {
        Self::with_behavior(MockBehavior::Fixed(result))
    }

    pub fn uniform(value: &str, confidence: f32) -> Self {
        Self::with_behavior(MockBehavior::Uniform {
            value: value.to_string(),
            confidence,
        })
    }

    pub fn failing() -> Self {
        Self::with_behavior(MockBehavior::Fail)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteExtractor for MockRemoteExtractor {
    fn extract(
        &self,
        _text: &str,
        _document_type: DocumentType,
        fields: &[FieldSpec],
    ) -> Result<ExtractionResult, StructuringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match &self.behavior {
            MockBehavior::Fixed(result) => Ok(result.clone()),
            MockBehavior::Uniform { value, confidence } => Ok(ExtractionResult::new(
                fields
                    .iter()
                    .map(|spec| ExtractedField {
                        name: spec.name.clone(),
                        value: value.clone(),
                        value_type: spec.value_type,
                        confidence: *confidence,
                        is_required: spec.required,
                        is_verified: false,
                        original_text: String::new(),
                        source_strategy: Some(StrategyKind::Remote),
                    })
                    .collect(),
                0.0,
                ExtractionMethod::Remote,
            )),
            MockBehavior::Fail => Err(StructuringError::RemoteApi {
                status: 503,
                body: "unavailable".into(),
            }),
        }
    }
}
