use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::SimilarityModel;
use super::StructuringError;

/// Embedding dimension of paraphrase-multilingual-MiniLM-L12-v2 and of the mock embedder.
pub const EMBEDDING_DIM: usize = 384;

// ═══════════════════════════════════════════════════════════
// ONNX embedder, behind the `onnx-embeddings` feature
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-embeddings")]
mod onnx {
    use super::{SimilarityModel, StructuringError, EMBEDDING_DIM};
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// Multilingual sentence embeddings through ONNX Runtime.
    ///
    /// `model_dir` holds `model.onnx` and `tokenizer.json`. The session sits
    /// behind a Mutex because `Session::run` takes `&mut self`.
    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: tokenizers::Tokenizer,
    }

    impl OnnxEmbedder {
        pub fn load(model_dir: &Path) -> Result<Self, StructuringError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            for path in [&model_path, &tokenizer_path] {
                if !path.exists() {
                    return Err(StructuringError::ModelNotFound(path.clone()));
                }
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| StructuringError::ModelInit(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| StructuringError::ModelInit(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e: ort::Error| StructuringError::ModelInit(format!("ONNX load failed: {e}")))?;

            let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| StructuringError::ModelInit(format!("Tokenizer load failed: {e}")))?;

            tracing::info!(model_dir = %model_dir.display(), "ONNX embedder loaded");

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
            })
        }

        /// Mean-pooled over the attention mask, then L2-normalized.
        fn infer(&self, text: &str) -> Result<Vec<f32>, StructuringError> {
            use ort::value::TensorRef;

            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| StructuringError::Tokenization(e.to_string()))?;

            let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let attention_mask: Vec<i64> =
                encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
            let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();
            let seq_len = input_ids.len();

            let to_array = |data: Vec<i64>| {
                ndarray::Array2::from_shape_vec((1, seq_len), data)
                    .map_err(|e| StructuringError::Embedding(e.to_string()))
            };
            let ids_array = to_array(input_ids)?;
            let mask_array = to_array(attention_mask.clone())?;
            let type_array = to_array(token_type_ids)?;

            let ids_tensor = TensorRef::from_array_view(&ids_array)
                .map_err(|e| StructuringError::Embedding(e.to_string()))?;
            let mask_tensor = TensorRef::from_array_view(&mask_array)
                .map_err(|e| StructuringError::Embedding(e.to_string()))?;
            let type_tensor = TensorRef::from_array_view(&type_array)
                .map_err(|e| StructuringError::Embedding(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| StructuringError::Embedding("Session lock poisoned".to_string()))?;

            // XLM-R exports take no token_type_ids.
            let takes_type_ids = session.inputs.iter().any(|input| input.name == "token_type_ids");
            let outputs = if takes_type_ids {
                session.run(ort::inputs![ids_tensor, mask_tensor, type_tensor])
            } else {
                session.run(ort::inputs![ids_tensor, mask_tensor])
            }
            .map_err(|e| StructuringError::Embedding(format!("ONNX inference failed: {e}")))?;

            let (shape, output_data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| StructuringError::Embedding(format!("Output extraction: {e}")))?;

            if shape.len() != 3 || shape[2] as usize != EMBEDDING_DIM {
                return Err(StructuringError::Embedding(format!(
                    "Unexpected output shape: {shape:?}, expected [1, {seq_len}, {EMBEDDING_DIM}]"
                )));
            }

            let mut pooled = vec![0.0f32; EMBEDDING_DIM];
            let mut mask_sum = 0.0f32;
            for (token_idx, &mask) in attention_mask.iter().enumerate() {
                let mask = mask as f32;
                mask_sum += mask;
                let offset = token_idx * EMBEDDING_DIM;
                for (dim_idx, p) in pooled.iter_mut().enumerate() {
                    *p += output_data[offset + dim_idx] * mask;
                }
            }
            if mask_sum > 0.0 {
                pooled.iter_mut().for_each(|v| *v /= mask_sum);
            }

            super::l2_normalize(&mut pooled);
            Ok(pooled)
        }
    }

    impl SimilarityModel for OnnxEmbedder {
        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StructuringError> {
            texts.iter().map(|t| self.infer(t)).collect()
        }
    }
}

#[cfg(feature = "onnx-embeddings")]
pub use onnx::OnnxEmbedder;

// ──────────────────────────────────────────────
// Ollama embeddings (/api/embed)
// ──────────────────────────────────────────────

/// Sentence embeddings served by a local Ollama instance.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl SimilarityModel for OllamaEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StructuringError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    StructuringError::OllamaConnection(self.base_url.clone())
                } else {
                    StructuringError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StructuringError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))?;
        Ok(parsed.embeddings)
    }
}

// ──────────────────────────────────────────────
// Mock
// ──────────────────────────────────────────────

/// Deterministic bag-of-words embedder for tests and offline runs.
///
/// Lowercased word tokens are hashed into `EMBEDDING_DIM` buckets, so texts
/// sharing words have a positive cosine similarity.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityModel for MockEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StructuringError> {
        Ok(texts.iter().map(|t| hashed_bag_of_words(t, self.dimension)).collect())
    }
}

fn hashed_bag_of_words(text: &str, dim: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dim];
    let lowered = text.to_lowercase();
    for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
        vector[fnv1a(token.as_bytes()) as usize % dim] += 1.0;
    }
    l2_normalize(&mut vector);
    vector
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::semantic::cosine_similarity;

    #[test]
    fn mock_embed_returns_one_vector_per_text() {
        let embedder = MockEmbedder::new();
        let vecs = embedder.embed(&["một", "hai", "ba"]).unwrap();
        assert_eq!(vecs.len(), 3);
        assert!(vecs.iter().all(|v| v.len() == EMBEDDING_DIM));
    }

    #[test]
    fn mock_embed_is_deterministic_and_normalized() {
        let embedder = MockEmbedder::new();
        let a = embedder.embed(&["Số hồ sơ"]).unwrap();
        let b = embedder.embed(&["Số hồ sơ"]).unwrap();
        assert_eq!(a, b);
        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "got norm = {norm}");
    }

    #[test]
    fn shared_words_raise_similarity() {
        let embedder = MockEmbedder::new();
        let v = embedder
            .embed(&["ngày bắt đầu", "Ngày bắt đầu 2020", "Kho lưu trữ"])
            .unwrap();
        let related = cosine_similarity(&v[0], &v[1]);
        let unrelated = cosine_similarity(&v[0], &v[2]);
        assert!(related > 0.6, "related = {related}");
        assert!(unrelated < related);
    }

    #[test]
    fn blank_text_embeds_to_zero_vector() {
        let v = MockEmbedder::new().embed(&["  "]).unwrap();
        assert!(v[0].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn ollama_embedder_trims_trailing_slash() {
        let embedder = OllamaEmbedder::new("http://localhost:11434/", "nomic-embed-text", Duration::from_secs(5));
        assert_eq!(embedder.base_url, "http://localhost:11434");
        assert_eq!(embedder.model(), "nomic-embed-text");
    }
}
