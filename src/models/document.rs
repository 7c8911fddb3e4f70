use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentType, ProcessingStatus};
use crate::pipeline::ocr::{combined_text, PageResult};
use crate::pipeline::structuring::{ExtractionResult, ValidationReport};

/// One processed document: fused OCR pages, the kept extraction and its
/// validation findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub filename: String,
    pub document_type: DocumentType,
    pub status: ProcessingStatus,
    pub ocr_results: Vec<PageResult>,
    pub ai_extraction: ExtractionResult,
    pub validation: ValidationReport,
    pub total_pages: usize,
    /// Mean confidence over fused pages.
    pub ocr_confidence: f32,
    /// Wall-clock seconds for the last processing pass.
    pub processing_time: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    /// Text the extraction stage sees: non-empty pages separated by a blank line.
    pub fn combined_text(&self) -> String {
        combined_text(&self.ocr_results)
    }
}
