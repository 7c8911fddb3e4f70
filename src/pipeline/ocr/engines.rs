//! Recognition capability adapter: runs every available engine on a page
//! concurrently and hands the non-empty readings to fusion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;

use super::confidence::clamp_confidence;
use super::fusion::{fuse, FusionPolicy};
use super::types::{PageCandidate, PageResult, RecognitionEngine};

/// Default per-engine, per-page time limit.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(60);

/// The engines usable for this process, fixed at construction.
pub struct EngineSet {
    engines: Vec<Arc<dyn RecognitionEngine>>,
    timeout: Duration,
    policy: FusionPolicy,
}

impl EngineSet {
    /// Check each engine once; unavailable engines are dropped for good.
    pub fn new(candidates: Vec<Arc<dyn RecognitionEngine>>) -> Self {
        let engines: Vec<_> = candidates
            .into_iter()
            .filter(|engine| {
                let available = engine.is_available();
                if available {
                    tracing::info!(engine = %engine.engine_id(), "OCR engine available");
                } else {
                    tracing::warn!(engine = %engine.engine_id(), "OCR engine unavailable, skipping");
                }
                available
            })
            .collect();

        if engines.is_empty() {
            tracing::warn!("No OCR engine available; page images will yield empty text");
        }

        Self {
            engines,
            timeout: DEFAULT_ENGINE_TIMEOUT,
            policy: FusionPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: FusionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn engine_ids(&self) -> Vec<String> {
        self.engines
            .iter()
            .map(|e| e.engine_id().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Run all engines on one page.
    ///
    /// Returns one candidate per engine that answered in time with non-blank
    /// text, in engine order. Errors, panics and timeouts drop that engine for
    /// this page only.
    pub async fn recognize_page(&self, page_number: usize, image: Arc<[u8]>) -> Vec<PageCandidate> {
        let calls = self.engines.iter().map(|engine| {
            let engine = Arc::clone(engine);
            let image = Arc::clone(&image);
            let timeout = self.timeout;
            async move {
                let engine_id = engine.engine_id().to_string();
                let start = Instant::now();
                let task = tokio::task::spawn_blocking(move || engine.recognize(&image));

                match tokio::time::timeout(timeout, task).await {
                    Ok(Ok(Ok(output))) => {
                        tracing::debug!(
                            page = page_number,
                            engine = %engine_id,
                            confidence = output.confidence,
                            text_len = output.text.len(),
                            elapsed_ms = %start.elapsed().as_millis(),
                            "Engine finished page"
                        );
                        if output.text.trim().is_empty() {
                            return None;
                        }
                        Some(PageCandidate {
                            engine_id,
                            page_number,
                            text: output.text,
                            confidence: clamp_confidence(output.confidence),
                            bounding_box: output.bounding_box,
                        })
                    }
                    Ok(Ok(Err(e))) => {
                        tracing::warn!(page = page_number, engine = %engine_id, error = %e, "OCR engine failed");
                        None
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(page = page_number, engine = %engine_id, error = %e, "OCR engine task aborted");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(
                            page = page_number,
                            engine = %engine_id,
                            timeout_secs = timeout.as_secs_f64(),
                            "OCR engine timed out"
                        );
                        None
                    }
                }
            }
        });

        join_all(calls).await.into_iter().flatten().collect()
    }

    /// Recognize and fuse every page. Pages are numbered from 1 in input order.
    pub async fn recognize_document(&self, pages: Vec<Vec<u8>>) -> Vec<PageResult> {
        let policy = self.policy;
        let jobs = pages.into_iter().enumerate().map(|(idx, bytes)| {
            let page_number = idx + 1;
            let image: Arc<[u8]> = Arc::from(bytes);
            async move {
                let candidates = self.recognize_page(page_number, image).await;
                fuse(page_number, &candidates, &policy)
            }
        });
        join_all(jobs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::tesseract::MockOcrEngine;

    fn set(engines: Vec<MockOcrEngine>) -> EngineSet {
        EngineSet::new(
            engines
                .into_iter()
                .map(|e| Arc::new(e) as Arc<dyn RecognitionEngine>)
                .collect(),
        )
    }

    #[test]
    fn unavailable_engines_are_dropped_at_construction() {
        let engines = set(vec![
            MockOcrEngine::new("a", "text", 0.9),
            MockOcrEngine::new("b", "text", 0.9).unavailable(),
        ]);
        assert_eq!(engines.engine_ids(), vec!["a"]);
    }

    #[test]
    fn availability_is_checked_once() {
        let engine = Arc::new(MockOcrEngine::new("a", "text", 0.9));
        let _set = EngineSet::new(vec![engine.clone() as Arc<dyn RecognitionEngine>]);
        assert_eq!(engine.availability_checks(), 1);
    }

    #[tokio::test]
    async fn candidates_keep_engine_order() {
        let engines = set(vec![
            MockOcrEngine::new("slow", "first", 0.8).with_delay(Duration::from_millis(40)),
            MockOcrEngine::new("fast", "second", 0.7),
        ]);
        let candidates = engines.recognize_page(1, Arc::from(&b"img"[..])).await;
        let ids: Vec<_> = candidates.iter().map(|c| c.engine_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn failing_and_empty_engines_yield_no_candidate() {
        let engines = set(vec![
            MockOcrEngine::new("broken", "x", 0.9).failing(),
            MockOcrEngine::new("blank", "   ", 0.9),
            MockOcrEngine::new("ok", "Số hồ sơ", 0.85),
        ]);
        let candidates = engines.recognize_page(1, Arc::from(&b"img"[..])).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].engine_id, "ok");
    }

    #[tokio::test]
    async fn panicking_engine_is_skipped() {
        let engines = set(vec![
            MockOcrEngine::new("panics", "x", 0.9).panicking(),
            MockOcrEngine::new("ok", "text", 0.6),
        ]);
        let candidates = engines.recognize_page(1, Arc::from(&b"img"[..])).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].engine_id, "ok");
    }

    #[tokio::test]
    async fn slow_engine_times_out_without_blocking_page() {
        let engines = set(vec![
            MockOcrEngine::new("slow", "late", 0.99).with_delay(Duration::from_millis(500)),
            MockOcrEngine::new("fast", "on time", 0.8),
        ])
        .with_timeout(Duration::from_millis(50));
        let candidates = engines.recognize_page(1, Arc::from(&b"img"[..])).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "on time");
    }

    #[tokio::test]
    async fn confidence_is_clamped() {
        let engines = set(vec![MockOcrEngine::new("hot", "text", 1.7)]);
        let candidates = engines.recognize_page(1, Arc::from(&b"img"[..])).await;
        assert_eq!(candidates[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn document_pages_are_contiguous_from_one() {
        let engines = set(vec![MockOcrEngine::new("a", "page text", 0.9)]);
        let pages = engines
            .recognize_document(vec![b"p1".to_vec(), b"p2".to_vec(), b"p3".to_vec()])
            .await;
        let numbers: Vec<_> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn no_engines_gives_empty_pages() {
        let engines = EngineSet::new(vec![]);
        assert!(engines.is_empty());
        let pages = engines.recognize_document(vec![b"p1".to_vec()]).await;
        assert_eq!(pages, vec![PageResult::empty(1)]);
    }
}
