use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use super::confidence::compute_overall_confidence;
use super::registry::FieldSpec;
use super::StructuringError;
use crate::models::{DocumentType, ExtractionMethod, FieldType, StrategyKind};

/// One strategy's answer for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCandidate {
    pub field_name: String,
    pub value: String,
    pub confidence: f32,
    pub source_strategy: StrategyKind,
    /// Text the value was taken from.
    pub original_span: String,
}

/// The kept value for one configured field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub value: String,
    pub value_type: FieldType,
    pub confidence: f32,
    pub is_required: bool,
    /// Set only when a person confirms the value.
    pub is_verified: bool,
    pub original_text: String,
    #[serde(default)]
    pub source_strategy: Option<StrategyKind>,
}

impl ExtractedField {
    /// Placeholder for a field no strategy could fill.
    pub fn empty(spec: &FieldSpec) -> Self {
        Self {
            name: spec.name.clone(),
            value: String::new(),
            value_type: spec.value_type,
            confidence: 0.0,
            is_required: spec.required,
            is_verified: false,
            original_text: String::new(),
            source_strategy: None,
        }
    }

    pub fn from_candidate(spec: &FieldSpec, candidate: FieldCandidate) -> Self {
        Self {
            name: spec.name.clone(),
            value: candidate.value,
            value_type: spec.value_type,
            confidence: candidate.confidence,
            is_required: spec.required,
            is_verified: false,
            original_text: candidate.original_span,
            source_strategy: Some(candidate.source_strategy),
        }
    }
}

/// Fields extracted by one attempt (local or remote).
///
/// The overall confidence is derived from `fields` on every read and on
/// serialization, so it cannot go stale when fields are edited.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractionResult {
    pub fields: Vec<ExtractedField>,
    /// Seconds spent producing this result.
    pub processing_time: f64,
    pub method: ExtractionMethod,
}

impl ExtractionResult {
    pub fn new(fields: Vec<ExtractedField>, processing_time: f64, method: ExtractionMethod) -> Self {
        Self {
            fields,
            processing_time,
            method,
        }
    }

    /// Result reported for a document whose processing failed.
    pub fn failed(processing_time: f64) -> Self {
        Self::new(Vec::new(), processing_time, ExtractionMethod::Failed)
    }

    /// Mean of the strictly positive field confidences; 0 if there are none.
    pub fn overall_confidence(&self) -> f32 {
        compute_overall_confidence(&self.fields)
    }

    pub fn field(&self, name: &str) -> Option<&ExtractedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ExtractionResult", 4)?;
        state.serialize_field("fields", &self.fields)?;
        state.serialize_field("overall_confidence", &self.overall_confidence())?;
        state.serialize_field("processing_time", &self.processing_time)?;
        state.serialize_field("method", &self.method)?;
        state.end()
    }
}

/// Named-entity labels the entity strategy understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityLabel {
    Date,
    Number,
    Person,
    Organization,
    Location,
    Misc,
}

/// An entity found in document text. `start`/`end` are byte offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub text: String,
    pub label: EntityLabel,
    pub start: usize,
    pub end: usize,
}

// ──────────────────────────────────────────────
// Capability traits (all mockable)
// ──────────────────────────────────────────────

/// LLM client abstraction (allows mocking)
pub trait LlmClient: Send + Sync {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, StructuringError>;

    fn is_model_available(&self, model: &str) -> Result<bool, StructuringError>;

    fn list_models(&self) -> Result<Vec<String>, StructuringError>;
}

/// LLM client that also accepts images (base64-encoded).
pub trait VisionClient: LlmClient {
    fn chat_with_images(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, StructuringError>;
}

/// Sentence embedding model used by the semantic strategy.
pub trait SimilarityModel: Send + Sync {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StructuringError>;
}

/// Named-entity recognizer used by the entity strategy.
pub trait EntityExtractor: Send + Sync {
    /// Entities in the recognizer's own order.
    fn extract(&self, text: &str) -> Result<Vec<Entity>, StructuringError>;
}

/// Costly whole-document extraction used as fallback.
pub trait RemoteExtractor: Send + Sync {
    fn extract(
        &self,
        text: &str,
        document_type: DocumentType,
        fields: &[FieldSpec],
    ) -> Result<ExtractionResult, StructuringError>;
}
