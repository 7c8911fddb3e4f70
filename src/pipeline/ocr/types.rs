use serde::{Deserialize, Serialize};

use super::OcrError;

/// Bounding box for a text region, in page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Right edge, saturating at `u32::MAX`.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge, saturating at `u32::MAX`.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }
}

/// Raw output of one engine for one page image.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

impl EngineOutput {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            bounding_box: None,
        }
    }
}

/// One engine's reading of one page. Lives only for the fusion of that page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCandidate {
    pub engine_id: String,
    pub page_number: usize,
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

/// Fused text for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub page_number: usize,
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
    /// Engines whose text made it into `text`.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl PageResult {
    pub fn empty(page_number: usize) -> Self {
        Self {
            page_number,
            text: String::new(),
            confidence: 0.0,
            bounding_box: None,
            sources: Vec::new(),
        }
    }
}

/// A text recognition engine (allows mocking for tests).
///
/// Availability is queried once when the engine set is assembled; engines
/// reported unavailable are never called.
pub trait RecognitionEngine: Send + Sync {
    /// Stable identifier used in logs and `PageResult::sources`.
    fn engine_id(&self) -> &str;

    fn is_available(&self) -> bool;

    fn recognize(&self, image_bytes: &[u8]) -> Result<EngineOutput, OcrError>;
}
