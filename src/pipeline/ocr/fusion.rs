//! Page fusion: pick the best engine reading of a page, or merge readings
//! when several engines are independently confident.
//!
//! Pure functions only; identical candidates always fuse to the same page.

use serde::{Deserialize, Serialize};

use super::confidence::{clamp_confidence, thresholds};
use super::types::{PageCandidate, PageResult};

const CONFIDENCE_WEIGHT: f32 = 0.7;
const LENGTH_WEIGHT: f32 = 0.3;
/// Text length at which the length bonus saturates.
const LENGTH_SATURATION_CHARS: f32 = 1000.0;

/// Thresholds steering the select-or-merge decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionPolicy {
    /// Engines above this are "strong"; more than one strong engine triggers merging.
    pub strong_engine_threshold: f32,
    /// Engines above this contribute text to a merged page.
    pub merge_inclusion_threshold: f32,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            strong_engine_threshold: thresholds::STRONG_ENGINE_THRESHOLD,
            merge_inclusion_threshold: thresholds::MERGE_INCLUSION_THRESHOLD,
        }
    }
}

/// Selection score: mostly engine confidence, with a capped bonus for longer text.
pub fn candidate_score(candidate: &PageCandidate) -> f32 {
    let length = candidate.text.chars().count() as f32;
    CONFIDENCE_WEIGHT * candidate.confidence
        + LENGTH_WEIGHT * (length / LENGTH_SATURATION_CHARS).min(1.0)
}

/// Fuse the candidates of one page into a single `PageResult`.
///
/// Candidates with blank text are ignored. No usable candidate yields an
/// empty page with confidence 0.
pub fn fuse(page_number: usize, candidates: &[PageCandidate], policy: &FusionPolicy) -> PageResult {
    let usable: Vec<&PageCandidate> = candidates
        .iter()
        .filter(|c| !c.text.trim().is_empty())
        .collect();

    if usable.is_empty() {
        tracing::debug!(page = page_number, "No engine produced text for page");
        return PageResult::empty(page_number);
    }

    let strong = usable
        .iter()
        .filter(|c| c.confidence > policy.strong_engine_threshold)
        .count();

    if strong > 1 {
        let merged = merge(page_number, &usable, policy);
        tracing::debug!(
            page = page_number,
            strong,
            sources = ?merged.sources,
            confidence = merged.confidence,
            "Merged page from agreeing engines"
        );
        return merged;
    }

    let best = select_best(&usable);
    tracing::debug!(
        page = page_number,
        engine = %best.engine_id,
        confidence = best.confidence,
        candidates = usable.len(),
        "Selected best engine for page"
    );

    PageResult {
        page_number,
        text: best.text.clone(),
        confidence: clamp_confidence(best.confidence),
        bounding_box: best.bounding_box,
        sources: vec![best.engine_id.clone()],
    }
}

/// Highest score wins; the earliest candidate wins ties.
fn select_best<'a>(candidates: &[&'a PageCandidate]) -> &'a PageCandidate {
    let mut best = candidates[0];
    let mut best_score = candidate_score(best);
    for candidate in &candidates[1..] {
        let score = candidate_score(candidate);
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }
    best
}

/// Concatenate the distinct texts of included engines, in engine order.
///
/// Confidence is the mean over every usable candidate, not only the included
/// ones, so weak engines still pull a merged page down.
fn merge(page_number: usize, candidates: &[&PageCandidate], policy: &FusionPolicy) -> PageResult {
    let mut texts: Vec<&str> = Vec::new();
    let mut sources = Vec::new();
    let mut included_confidence = 0.0f32;

    for candidate in candidates
        .iter()
        .filter(|c| c.confidence > policy.merge_inclusion_threshold)
    {
        sources.push(candidate.engine_id.clone());
        included_confidence += candidate.confidence;
        if !texts.contains(&candidate.text.as_str()) {
            texts.push(&candidate.text);
        }
    }

    // Included confidences over every usable candidate: weak engines dilute.
    let confidence = included_confidence / candidates.len() as f32;

    PageResult {
        page_number,
        text: texts.join(" "),
        confidence: clamp_confidence(confidence),
        bounding_box: None,
        sources,
    }
}
