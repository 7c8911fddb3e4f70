use super::types::PageResult;

/// Confidence thresholds shared by fusion, fallback and validation.
/// `PipelineConfig` starts from these and may override them.
pub mod thresholds {
    /// At or above this: local extraction is good enough. Below: validation warns.
    pub const MIN_CONFIDENCE_SCORE: f32 = 0.70;

    /// Below this: local extraction is bad enough to pay for remote extraction.
    pub const REMOTE_TRIGGER_THRESHOLD: f32 = 0.60;

    /// Above this an engine counts as strong; two strong engines trigger merging.
    pub const STRONG_ENGINE_THRESHOLD: f32 = 0.70;

    /// Above this an engine's text is included in a merged page.
    pub const MERGE_INCLUSION_THRESHOLD: f32 = 0.50;

    /// Above this a keyword/sentence similarity is accepted.
    pub const SEMANTIC_MATCH_THRESHOLD: f32 = 0.60;
}

/// Confidence assigned to caller-supplied text (no recognition involved).
pub const PLAIN_TEXT_CONFIDENCE: f32 = 0.99;

/// Clamp into [0, 1]; NaN becomes 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Join non-empty page texts with a blank line, in page order.
pub fn combined_text(pages: &[PageResult]) -> String {
    pages
        .iter()
        .map(|p| p.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Mean confidence over all pages (0 when there are none).
pub fn average_page_confidence(pages: &[PageResult]) -> f32 {
    if pages.is_empty() {
        return 0.0;
    }
    pages.iter().map(|p| p.confidence).sum::<f32>() / pages.len() as f32
}
