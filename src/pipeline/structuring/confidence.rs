use super::types::ExtractedField;

/// Fixed confidences per local strategy.
pub mod strategy_confidence {
    /// Pattern matched and a capture group isolated the value.
    pub const PATTERN_GROUP: f32 = 0.9;

    /// Pattern matched without a capture group.
    pub const PATTERN_WHOLE: f32 = 0.8;

    /// Ceiling for semantic matches, whatever the similarity.
    pub const SEMANTIC_CAP: f32 = 0.8;

    /// Entity label matched the field type.
    pub const ENTITY: f32 = 0.7;

    /// Used when a remote answer omits a field confidence.
    pub const REMOTE_DEFAULT: f32 = 0.5;
}

/// Mean of strictly positive field confidences (0 if none).
pub fn compute_overall_confidence(fields: &[ExtractedField]) -> f32 {
    let positive: Vec<f32> = fields
        .iter()
        .map(|f| f.confidence)
        .filter(|c| *c > 0.0)
        .collect();

    if positive.is_empty() {
        0.0
    } else {
        positive.iter().sum::<f32>() / positive.len() as f32
    }
}
