//! Pipeline configuration: thresholds, timeouts and the collaborators to wire.
//!
//! Defaults come from `pipeline::ocr::thresholds`. A JSON file can override
//! any subset of fields, and `DOSSIER_*` environment variables override both.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::ocr::{thresholds, FusionPolicy, DEFAULT_LANGUAGES};
use crate::pipeline::structuring::{EntityRanking, FallbackPolicy, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_URL};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which LLM backs the remote extractor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    /// No remote fallback.
    #[default]
    None,
    Ollama,
    OpenAi,
}

/// Which model backs the semantic strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityBackend {
    /// Semantic strategy disabled.
    #[default]
    None,
    Ollama,
    /// Requires the `onnx-embeddings` feature and a model under
    /// `config::embedding_model_dir()`.
    Onnx,
}

impl FromStr for RemoteBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown remote backend '{other}'")),
        }
    }
}

impl FromStr for SimilarityBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama),
            "onnx" => Ok(Self::Onnx),
            other => Err(format!("unknown similarity backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub min_confidence_score: f32,
    pub remote_trigger_threshold: f32,
    pub strong_engine_threshold: f32,
    pub merge_inclusion_threshold: f32,
    pub semantic_match_threshold: f32,
    pub entity_ranking: EntityRanking,
    /// Per engine, per page.
    pub engine_timeout_secs: u64,
    pub remote_timeout_secs: u64,
    pub ocr_languages: String,
    pub tesseract_binary: String,
    /// Ollama vision model used as an extra OCR engine, if any.
    pub vision_model: Option<String>,
    pub ollama_url: String,
    pub remote_backend: RemoteBackend,
    pub remote_model: String,
    pub openai_base_url: String,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    pub similarity_backend: SimilarityBackend,
    /// Ollama embedding model name.
    pub embedding_model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_confidence_score: thresholds::MIN_CONFIDENCE_SCORE,
            remote_trigger_threshold: thresholds::REMOTE_TRIGGER_THRESHOLD,
            strong_engine_threshold: thresholds::STRONG_ENGINE_THRESHOLD,
            merge_inclusion_threshold: thresholds::MERGE_INCLUSION_THRESHOLD,
            semantic_match_threshold: thresholds::SEMANTIC_MATCH_THRESHOLD,
            entity_ranking: EntityRanking::default(),
            engine_timeout_secs: 60,
            remote_timeout_secs: 120,
            ocr_languages: DEFAULT_LANGUAGES.to_string(),
            tesseract_binary: "tesseract".to_string(),
            vision_model: None,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            remote_backend: RemoteBackend::None,
            remote_model: "gpt-3.5-turbo".to_string(),
            openai_base_url: DEFAULT_OPENAI_URL.to_string(),
            openai_api_key: None,
            similarity_backend: SimilarityBackend::None,
            embedding_model: "nomic-embed-text".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// `config::pipeline_config_path()` if it exists, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = crate::config::pipeline_config_path();
        let mut config = if path.exists() {
            tracing::info!(path = %path.display(), "Loading pipeline config");
            Self::from_json_file(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `DOSSIER_*` overrides (and `OPENAI_API_KEY`) from `lookup`.
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        override_threshold(&lookup, "DOSSIER_MIN_CONFIDENCE", &mut self.min_confidence_score);
        override_threshold(&lookup, "DOSSIER_REMOTE_TRIGGER", &mut self.remote_trigger_threshold);
        override_threshold(&lookup, "DOSSIER_STRONG_ENGINE_THRESHOLD", &mut self.strong_engine_threshold);
        override_threshold(&lookup, "DOSSIER_MERGE_INCLUSION_THRESHOLD", &mut self.merge_inclusion_threshold);
        override_threshold(&lookup, "DOSSIER_SEMANTIC_THRESHOLD", &mut self.semantic_match_threshold);
        override_parsed(&lookup, "DOSSIER_ENGINE_TIMEOUT_SECS", &mut self.engine_timeout_secs);
        override_parsed(&lookup, "DOSSIER_REMOTE_TIMEOUT_SECS", &mut self.remote_timeout_secs);
        override_parsed(&lookup, "DOSSIER_REMOTE_BACKEND", &mut self.remote_backend);
        override_parsed(&lookup, "DOSSIER_SIMILARITY_BACKEND", &mut self.similarity_backend);

        if let Some(value) = lookup("DOSSIER_ENTITY_RANKING") {
            match value.trim() {
                "first_listed" => self.entity_ranking = EntityRanking::FirstListed,
                "earliest_span" => self.entity_ranking = EntityRanking::EarliestSpan,
                other => tracing::warn!(key = "DOSSIER_ENTITY_RANKING", value = other, "Ignoring invalid value"),
            }
        }

        if let Some(v) = lookup("DOSSIER_OCR_LANGUAGES") {
            self.ocr_languages = v;
        }
        if let Some(v) = lookup("DOSSIER_TESSERACT_BIN") {
            self.tesseract_binary = v;
        }
        if let Some(v) = lookup("DOSSIER_VISION_MODEL") {
            self.vision_model = Some(v);
        }
        if let Some(v) = lookup("DOSSIER_OLLAMA_URL") {
            self.ollama_url = v;
        }
        if let Some(v) = lookup("DOSSIER_REMOTE_MODEL") {
            self.remote_model = v;
        }
        if let Some(v) = lookup("DOSSIER_OPENAI_BASE_URL") {
            self.openai_base_url = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = Some(v);
        }
        if let Some(v) = lookup("DOSSIER_EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Derived policies
    // ═══════════════════════════════════════════════════════════

    pub fn fusion_policy(&self) -> FusionPolicy {
        FusionPolicy {
            strong_engine_threshold: self.strong_engine_threshold,
            merge_inclusion_threshold: self.merge_inclusion_threshold,
        }
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy {
            min_confidence: self.min_confidence_score,
            remote_trigger: self.remote_trigger_threshold,
            remote_timeout: Duration::from_secs(self.remote_timeout_secs),
        }
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }
}

fn override_parsed<T, L>(lookup: &L, key: &str, target: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(e) => tracing::warn!(key, value = %raw, error = %e, "Ignoring invalid value"),
        }
    }
}

/// Thresholds must parse as a number in [0, 1].
fn override_threshold<L>(lookup: &L, key: &str, target: &mut f32)
where
    L: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<f32>() {
            Ok(value) if (0.0..=1.0).contains(&value) => *target = value,
            _ => tracing::warn!(key, value = %raw, "Ignoring threshold outside [0, 1]"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_named_thresholds() {
        let config = PipelineConfig::default();
        assert!((config.min_confidence_score - 0.7).abs() < f32::EPSILON);
        assert!((config.remote_trigger_threshold - 0.6).abs() < f32::EPSILON);
        assert!((config.strong_engine_threshold - 0.7).abs() < f32::EPSILON);
        assert!((config.merge_inclusion_threshold - 0.5).abs() < f32::EPSILON);
        assert!((config.semantic_match_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.remote_backend, RemoteBackend::None);
        assert_eq!(config.ocr_languages, "vie+eng");
    }

    #[test]
    fn env_overrides_are_applied() {
        let mut config = PipelineConfig::default();
        config.apply_overrides(lookup_from(&[
            ("DOSSIER_REMOTE_TRIGGER", "0.7"),
            ("DOSSIER_REMOTE_BACKEND", "OpenAI"),
            ("DOSSIER_ENGINE_TIMEOUT_SECS", "15"),
            ("DOSSIER_ENTITY_RANKING", "earliest_span"),
            ("DOSSIER_VISION_MODEL", "qwen2.5vl:7b"),
            ("OPENAI_API_KEY", "sk-test"),
        ]));

        assert!((config.remote_trigger_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.remote_backend, RemoteBackend::OpenAi);
        assert_eq!(config.engine_timeout(), Duration::from_secs(15));
        assert_eq!(config.entity_ranking, EntityRanking::EarliestSpan);
        assert_eq!(config.vision_model.as_deref(), Some("qwen2.5vl:7b"));
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = PipelineConfig::default();
        config.apply_overrides(lookup_from(&[
            ("DOSSIER_MIN_CONFIDENCE", "1.5"),
            ("DOSSIER_SEMANTIC_THRESHOLD", "high"),
            ("DOSSIER_REMOTE_TIMEOUT_SECS", "-3"),
            ("DOSSIER_SIMILARITY_BACKEND", "bert"),
            ("DOSSIER_OLLAMA_URL", "   "),
        ]));
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn json_file_overrides_subset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"min_confidence_score": 0.8, "remote_backend": "ollama", "remote_model": "qwen2.5:7b"}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert!((config.min_confidence_score - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.remote_backend, RemoteBackend::Ollama);
        assert_eq!(config.remote_model, "qwen2.5:7b");
        assert_eq!(config.tesseract_binary, "tesseract");
    }

    #[test]
    fn bad_json_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json_file(Path::new("/nonexistent/pipeline.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn api_key_is_never_serialized() {
        let config = PipelineConfig {
            openai_api_key: Some("sk-secret".into()),
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn derived_policies_follow_config() {
        let config = PipelineConfig {
            strong_engine_threshold: 0.8,
            remote_trigger_threshold: 0.5,
            remote_timeout_secs: 10,
            ..PipelineConfig::default()
        };
        assert!((config.fusion_policy().strong_engine_threshold - 0.8).abs() < f32::EPSILON);
        let fallback = config.fallback_policy();
        assert!((fallback.remote_trigger - 0.5).abs() < f32::EPSILON);
        assert_eq!(fallback.remote_timeout, Duration::from_secs(10));
    }
}
