use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use super::confidence::strategy_confidence::SEMANTIC_CAP;
use super::registry::FieldSpec;
use super::strategy::StrategyContext;
use super::types::FieldCandidate;
use super::StructuringError;
use crate::models::{FieldType, StrategyKind};
use crate::pipeline::ocr::clamp_confidence;

static DATE_IN_SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}[/\-]\d{1,2}[/\-]\d{4}").unwrap());

static NUMBER_IN_SENTENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Find the sentence closest in meaning to any of the field's keywords.
#[derive(Debug, Clone)]
pub struct SemanticStrategy {
    keywords: Vec<String>,
    /// `\b<keyword>[:\s]*`, case-insensitive, one per keyword.
    keyword_strippers: Vec<Regex>,
}

impl SemanticStrategy {
    pub fn new(keywords: &[&str]) -> Result<Self, StructuringError> {
        let keyword_strippers = keywords
            .iter()
            .map(|kw| {
                RegexBuilder::new(&format!(r"\b{}[:\s]*", regex::escape(kw)))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| StructuringError::InvalidPattern {
                        field: kw.to_string(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            keyword_strippers,
        })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Needs a similarity model in `ctx`; without one there is no candidate.
    pub fn evaluate(
        &self,
        text: &str,
        spec: &FieldSpec,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<FieldCandidate>, StructuringError> {
        let Some(model) = ctx.similarity else {
            return Ok(None);
        };
        let sentences = split_sentences(text);
        if sentences.is_empty() || self.keywords.is_empty() {
            return Ok(None);
        }

        let keywords: Vec<&str> = self.keywords.iter().map(String::as_str).collect();
        let keyword_vectors = model.embed(&keywords)?;
        let sentence_vectors = model.embed(&sentences)?;
        if keyword_vectors.len() != keywords.len() || sentence_vectors.len() != sentences.len() {
            return Err(StructuringError::Embedding(format!(
                "expected {} + {} vectors, got {} + {}",
                keywords.len(),
                sentences.len(),
                keyword_vectors.len(),
                sentence_vectors.len()
            )));
        }

        let Some((index, similarity)) = best_match(&keyword_vectors, &sentence_vectors) else {
            return Ok(None);
        };
        if similarity <= ctx.semantic_threshold {
            return Ok(None);
        }

        let sentence = sentences[index];
        let value = self.value_from_sentence(sentence, spec.value_type);
        if value.is_empty() {
            return Ok(None);
        }

        tracing::debug!(field = %spec.name, similarity, sentence, "Semantic match");

        Ok(Some(FieldCandidate {
            field_name: spec.name.clone(),
            value,
            confidence: clamp_confidence(similarity.min(SEMANTIC_CAP)),
            source_strategy: StrategyKind::Semantic,
            original_span: sentence.to_string(),
        }))
    }

    /// DATE and NUMERIC take the first date or number in the sentence; text
    /// fields keep the sentence with every keyword label removed.
    fn value_from_sentence(&self, sentence: &str, value_type: FieldType) -> String {
        match value_type {
            FieldType::Date => DATE_IN_SENTENCE
                .find(sentence)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            FieldType::Numeric => NUMBER_IN_SENTENCE
                .find(sentence)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            FieldType::Text | FieldType::Dropdown => {
                let mut cleaned = sentence.to_string();
                for stripper in &self.keyword_strippers {
                    cleaned = stripper.replace_all(&cleaned, "").into_owned();
                }
                cleaned.trim().to_string()
            }
        }
    }
}

/// Split on `. ! ? ;` and newlines; trimmed, blanks dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', ';', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Sentence index and similarity of the highest keyword × sentence score.
/// Scanned keyword by keyword; the first maximum wins.
fn best_match(keyword_vectors: &[Vec<f32>], sentence_vectors: &[Vec<f32>]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for keyword in keyword_vectors {
        for (index, sentence) in sentence_vectors.iter().enumerate() {
            let similarity = cosine_similarity(keyword, sentence);
            if similarity.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((index, similarity));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::embedder::MockEmbedder;
    use crate::pipeline::structuring::types::SimilarityModel;

    /// Returns fixed vectors: keywords map to `keyword`, sentences by position.
    struct TableModel {
        keyword: Vec<f32>,
        sentences: Vec<Vec<f32>>,
        calls: std::sync::Mutex<usize>,
    }

    impl SimilarityModel for TableModel {
        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StructuringError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Ok(texts.iter().map(|_| self.keyword.clone()).collect())
            } else {
                Ok(self.sentences.clone())
            }
        }
    }

    #[test]
    fn sentences_split_on_punctuation_and_newlines() {
        let parts = split_sentences("Hồ sơ số 1. Ghi chú: không!\n\n Lưu ý; hết ?");
        assert_eq!(parts, vec!["Hồ sơ số 1", "Ghi chú: không", "Lưu ý", "hết"]);
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn best_match_picks_sentence_column() {
        // Two keywords, three sentences: the max sits at keyword 1, sentence 2.
        let keywords = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let sentences = vec![vec![1.0, 1.0], vec![1.0, 0.2], vec![0.0, 1.0]];
        let (index, similarity) = best_match(&keywords, &sentences).unwrap();
        assert_eq!(index, 2);
        assert!((similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn best_match_ties_keep_first() {
        let keywords = vec![vec![1.0, 0.0]];
        let sentences = vec![vec![2.0, 0.0], vec![1.0, 0.0]];
        assert_eq!(best_match(&keywords, &sentences).unwrap().0, 0);
    }

    #[test]
    fn numeric_field_takes_number_from_best_sentence() {
        let model = MockEmbedder::new();
        let ctx = StrategyContext::new(Some(&model), None);
        let strategy = SemanticStrategy::new(&["tổng số trang"]).unwrap();
        let spec = FieldSpec::new("tong_so_trang", FieldType::Numeric);

        let text = "Hồ sơ lưu trữ năm 2020\nTổng số trang 45\nBảo quản tại kho A";
        let c = strategy.evaluate(text, &spec, &ctx).unwrap().unwrap();
        assert_eq!(c.value, "45");
        assert_eq!(c.original_span, "Tổng số trang 45");
        assert!((c.confidence - 0.8).abs() < 1e-6, "capped at 0.8, got {}", c.confidence);
        assert_eq!(c.source_strategy, StrategyKind::Semantic);
    }

    #[test]
    fn text_field_strips_keywords() {
        let model = MockEmbedder::new();
        let ctx = StrategyContext::new(Some(&model), None);
        let strategy = SemanticStrategy::new(&["ghi chú", "lưu ý"]).unwrap();
        let spec = FieldSpec::new("ghi_chu", FieldType::Text);

        let c = strategy
            .evaluate("Ghi chú: thiếu bìa", &spec, &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(c.value, "thiếu bìa");
    }

    #[test]
    fn similarity_at_threshold_is_rejected() {
        let model = TableModel {
            keyword: vec![1.0, 0.0],
            sentences: vec![vec![0.6, 0.8]],
            calls: std::sync::Mutex::new(0),
        };
        let ctx = StrategyContext::new(Some(&model), None);
        let strategy = SemanticStrategy::new(&["ngày"]).unwrap();
        let spec = FieldSpec::new("ngay", FieldType::Date);
        assert!(strategy.evaluate("Ngày 01/01/2024", &spec, &ctx).unwrap().is_none());
    }

    #[test]
    fn confidence_is_similarity_below_cap() {
        let model = TableModel {
            keyword: vec![1.0, 0.0],
            sentences: vec![vec![0.7, 0.71414284]],
            calls: std::sync::Mutex::new(0),
        };
        let ctx = StrategyContext::new(Some(&model), None);
        let strategy = SemanticStrategy::new(&["ngày"]).unwrap();
        let spec = FieldSpec::new("ngay", FieldType::Date);
        let c = strategy.evaluate("Ngày 01/01/2024", &spec, &ctx).unwrap().unwrap();
        assert_eq!(c.value, "01/01/2024");
        assert!((c.confidence - 0.7).abs() < 1e-4);
    }

    #[test]
    fn date_field_without_date_gives_none() {
        let model = TableModel {
            keyword: vec![1.0, 0.0],
            sentences: vec![vec![1.0, 0.0]],
            calls: std::sync::Mutex::new(0),
        };
        let ctx = StrategyContext::new(Some(&model), None);
        let strategy = SemanticStrategy::new(&["ngày"]).unwrap();
        let spec = FieldSpec::new("ngay", FieldType::Date);
        assert!(strategy.evaluate("Ngày không rõ", &spec, &ctx).unwrap().is_none());
    }

    #[test]
    fn no_model_means_no_candidate() {
        let strategy = SemanticStrategy::new(&["ghi chú"]).unwrap();
        let spec = FieldSpec::new("ghi_chu", FieldType::Text);
        let result = strategy.evaluate("Ghi chú: x", &spec, &StrategyContext::bare()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn mismatched_vector_count_is_an_error() {
        let model = TableModel {
            keyword: vec![1.0],
            sentences: vec![],
            calls: std::sync::Mutex::new(0),
        };
        let ctx = StrategyContext::new(Some(&model), None);
        let strategy = SemanticStrategy::new(&["a"]).unwrap();
        let spec = FieldSpec::new("f", FieldType::Text);
        assert!(matches!(
            strategy.evaluate("a b", &spec, &ctx),
            Err(StructuringError::Embedding(_))
        ));
    }
}
