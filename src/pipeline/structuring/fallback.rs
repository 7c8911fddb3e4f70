//! Document-level fallback: keep the local result unless it is weak enough to
//! justify one call to the remote extractor.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::registry::FieldSpec;
use super::types::{ExtractionResult, RemoteExtractor};
use crate::models::DocumentType;
use crate::pipeline::ocr::thresholds;

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackPolicy {
    /// At or above this, the local result is final.
    pub min_confidence: f32,
    /// Below this, the remote extractor is consulted.
    pub remote_trigger: f32,
    pub remote_timeout: Duration,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            min_confidence: thresholds::MIN_CONFIDENCE_SCORE,
            remote_trigger: thresholds::REMOTE_TRIGGER_THRESHOLD,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FallbackState {
    Local,
    Remote,
    Done,
}

#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub result: ExtractionResult,
    /// States visited, in order. Always starts with `Local`, ends with `Done`.
    pub states: Vec<FallbackState>,
    pub remote_invoked: bool,
}

pub struct FallbackController {
    remote: Option<Arc<dyn RemoteExtractor>>,
    policy: FallbackPolicy,
}

impl FallbackController {
    pub fn new(remote: Option<Arc<dyn RemoteExtractor>>, policy: FallbackPolicy) -> Self {
        Self { remote, policy }
    }

    /// Never calls out.
    pub fn local_only() -> Self {
        Self::new(None, FallbackPolicy::default())
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Decide between `local` and one remote attempt.
    ///
    /// Remote replaces local only with a strictly higher overall confidence.
    /// Remote errors, timeouts and panics leave the local result in place.
    pub async fn resolve(
        &self,
        local: ExtractionResult,
        text: &str,
        document_type: DocumentType,
        fields: &[FieldSpec],
    ) -> FallbackOutcome {
        let local_confidence = local.overall_confidence();
        let mut states = vec![FallbackState::Local];

        let remote = match &self.remote {
            Some(remote)
                if local_confidence < self.policy.min_confidence
                    && local_confidence < self.policy.remote_trigger =>
            {
                remote.clone()
            }
            _ => {
                tracing::debug!(
                    local_confidence,
                    min_confidence = self.policy.min_confidence,
                    remote_trigger = self.policy.remote_trigger,
                    remote_configured = self.remote.is_some(),
                    "Keeping local extraction"
                );
                states.push(FallbackState::Done);
                return FallbackOutcome {
                    result: local,
                    states,
                    remote_invoked: false,
                };
            }
        };

        states.push(FallbackState::Remote);
        tracing::info!(local_confidence, %document_type, "Local confidence low, trying remote extraction");

        let owned_text = text.to_string();
        let owned_fields = fields.to_vec();
        let call = tokio::task::spawn_blocking(move || {
            remote.extract(&owned_text, document_type, &owned_fields)
        });

        let result = match tokio::time::timeout(self.policy.remote_timeout, call).await {
            Ok(Ok(Ok(remote_result))) => {
                let remote_confidence = remote_result.overall_confidence();
                if remote_confidence > local_confidence {
                    tracing::info!(local_confidence, remote_confidence, "Using remote extraction");
                    remote_result
                } else {
                    tracing::info!(local_confidence, remote_confidence, "Remote not better, keeping local");
                    local
                }
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, "Remote extraction failed, keeping local");
                local
            }
            Ok(Err(join_error)) => {
                tracing::warn!(error = %join_error, "Remote extraction aborted, keeping local");
                local
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.policy.remote_timeout.as_secs_f64(),
                    "Remote extraction timed out, keeping local"
                );
                local
            }
        };

        states.push(FallbackState::Done);
        FallbackOutcome {
            result,
            states,
            remote_invoked: true,
        }
    }
}
