//! Vision OCR engine: reads page images through a local vision model on Ollama.
//!
//! Vision models give no per-word confidence, so the engine estimates one
//! from the shape of the returned text.

use std::sync::Arc;

use base64::Engine as _;

use super::types::{EngineOutput, RecognitionEngine};
use super::OcrError;
use crate::pipeline::structuring::types::VisionClient;

// ──────────────────────────────────────────────
// Prompts
// ──────────────────────────────────────────────

const SYSTEM_PROMPT: &str = "\
You transcribe scanned Vietnamese administrative and archival documents. \
Output every visible character exactly as printed, keeping Vietnamese diacritics, \
line breaks and numbering. Do not translate, summarize or comment.";

const USER_PROMPT: &str = "\
Transcribe all text in this page image. Keep one output line per printed line.";

// ──────────────────────────────────────────────
// OllamaVisionOcr
// ──────────────────────────────────────────────

pub struct OllamaVisionOcr {
    vision_client: Arc<dyn VisionClient>,
    model_name: String,
    engine_id: String,
}

impl OllamaVisionOcr {
    pub fn new(vision_client: Arc<dyn VisionClient>, model_name: &str) -> Self {
        Self {
            vision_client,
            model_name: model_name.to_string(),
            engine_id: format!("vision:{model_name}"),
        }
    }
}

impl RecognitionEngine for OllamaVisionOcr {
    fn engine_id(&self) -> &str {
        &self.engine_id
    }

    fn is_available(&self) -> bool {
        match self.vision_client.is_model_available(&self.model_name) {
            Ok(available) => available,
            Err(e) => {
                tracing::warn!(model = %self.model_name, error = %e, "Vision model check failed");
                false
            }
        }
    }

    fn recognize(&self, image_bytes: &[u8]) -> Result<EngineOutput, OcrError> {
        let _span = tracing::info_span!(
            "vision_ocr",
            model = %self.model_name,
            image_size = image_bytes.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let images = vec![base64::engine::general_purpose::STANDARD.encode(image_bytes)];

        let raw = self
            .vision_client
            .chat_with_images(&self.model_name, USER_PROMPT, &images, Some(SYSTEM_PROMPT))
            .map_err(|e| OcrError::Vision(e.to_string()))?;

        let text = strip_code_fence(raw.trim()).to_string();
        let confidence = compute_heuristic_confidence(&text);

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = text.len(),
            confidence,
            "Vision OCR page complete"
        );

        Ok(EngineOutput::new(text, confidence))
    }
}

/// Some models wrap the transcription in a ``` block.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.strip_suffix("```").unwrap_or(body).trim()
}

// ──────────────────────────────────────────────
// Confidence heuristic
// ──────────────────────────────────────────────

/// Estimate confidence from output characteristics.
///
/// Base by character count: 0 → 0.0, under 50 → 0.2, under 200 → 0.4,
/// under 500 → 0.6, otherwise 0.75. Text with several lines gets +0.05 and
/// text carrying a dd/mm/yyyy date or a `số ...` reference gets +0.05.
/// Capped at 0.85.
pub fn compute_heuristic_confidence(text: &str) -> f32 {
    let len = text.chars().count();
    if len == 0 {
        return 0.0;
    }

    let base: f32 = if len < 50 {
        0.2
    } else if len < 200 {
        0.4
    } else if len < 500 {
        0.6
    } else {
        0.75
    };

    let multi_line = text.lines().filter(|l| !l.trim().is_empty()).count() >= 3;
    let lower = text.to_lowercase();
    let has_reference = lower.contains("số") || has_slash_date(text);

    let bonus = if multi_line { 0.05 } else { 0.0 } + if has_reference { 0.05 } else { 0.0 };

    (base + bonus).min(0.85)
}

fn has_slash_date(text: &str) -> bool {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .any(|token| {
            let token = token.trim_matches(|c: char| !c.is_ascii_digit());
            let parts: Vec<&str> = token.split(['/', '-']).collect();
            parts.len() == 3
                && parts[0].len() <= 2
                && parts[1].len() <= 2
                && parts[2].len() == 4
                && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        })
}
