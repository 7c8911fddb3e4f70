use regex::{Regex, RegexBuilder};

use super::confidence::strategy_confidence::{PATTERN_GROUP, PATTERN_WHOLE};
use super::registry::FieldSpec;
use super::types::FieldCandidate;
use super::StructuringError;
use crate::models::StrategyKind;

/// Ordered regular expressions; the first pattern that matches decides.
///
/// Later patterns are not consulted once an earlier one matches. An empty
/// match is still a candidate at the pattern's confidence.
#[derive(Debug, Clone)]
pub struct PatternStrategy {
    patterns: Vec<Regex>,
}

impl PatternStrategy {
    /// Compile case-insensitively with `.` matching newlines.
    pub fn compile(field: &str, sources: &[&str]) -> Result<Self, StructuringError> {
        let patterns = sources
            .iter()
            .map(|src| {
                RegexBuilder::new(src)
                    .case_insensitive(true)
                    .dot_matches_new_line(true)
                    .build()
                    .map_err(|e| StructuringError::InvalidPattern {
                        field: field.to_string(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }

    /// First match of the first matching pattern. With a capture group the
    /// value is group 1 (0.9); otherwise the whole match (0.8).
    pub fn evaluate(&self, text: &str, spec: &FieldSpec) -> Option<FieldCandidate> {
        for pattern in &self.patterns {
            let Some(caps) = pattern.captures(text) else {
                continue;
            };
            let whole = caps.get(0).map_or("", |m| m.as_str());

            let (value, confidence) = if pattern.captures_len() > 1 {
                (caps.get(1).map_or("", |m| m.as_str()).trim(), PATTERN_GROUP)
            } else {
                (whole.trim(), PATTERN_WHOLE)
            };

            if value.is_empty() {
                tracing::debug!(field = %spec.name, pattern = pattern.as_str(), "Pattern matched an empty value");
            }

            return Some(FieldCandidate {
                field_name: spec.name.clone(),
                value: value.to_string(),
                confidence,
                source_strategy: StrategyKind::Pattern,
                original_span: whole.to_string(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldType;
    use crate::pipeline::structuring::registry::FieldRegistry;
    use crate::pipeline::structuring::strategy::FieldStrategy;

    fn catalog_pattern(field: &str) -> (FieldSpec, PatternStrategy) {
        let registry = FieldRegistry::builtin().unwrap();
        let spec = registry.catalog_spec(field).unwrap().clone();
        let pattern = spec
            .strategies
            .iter()
            .find_map(|s| match s {
                FieldStrategy::Pattern(p) => Some(p.clone()),
                _ => None,
            })
            .unwrap();
        (spec, pattern)
    }

    #[test]
    fn dossier_number_uses_capture_group() {
        let (spec, pattern) = catalog_pattern("so_ho_so");
        let c = pattern.evaluate("UBND TỈNH\nSố hồ sơ: 12345/2025\n", &spec).unwrap();
        assert_eq!(c.value, "12345/2025");
        assert!((c.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(c.original_span, "Số hồ sơ: 12345/2025");
        assert_eq!(c.source_strategy, StrategyKind::Pattern);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let (spec, pattern) = catalog_pattern("so_ho_so");
        let c = pattern.evaluate("SỐ HỒ SƠ: 77/HS", &spec).unwrap();
        assert_eq!(c.value, "77/HS");
    }

    #[test]
    fn first_matching_pattern_wins_over_later_ones() {
        let (spec, pattern) = catalog_pattern("so_ho_so");
        // The bare "n/n" pattern would match the earlier date; the labelled one wins.
        let c = pattern.evaluate("Ngày 01/02/2024. Số hồ sơ: 88", &spec).unwrap();
        assert_eq!(c.value, "88");
    }

    #[test]
    fn pattern_without_group_returns_whole_match() {
        let (spec, pattern) = catalog_pattern("thoi_han_bao_quan");
        let c = pattern.evaluate("Hồ sơ lưu trữ vĩnh viễn tại kho", &spec).unwrap();
        assert_eq!(c.value, "vĩnh viễn");
        assert!((c.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn lazy_line_capture_stops_at_newline() {
        let (spec, pattern) = catalog_pattern("tieu_de_ho_so");
        let c = pattern
            .evaluate("Tiêu đề: Hồ sơ xây dựng trường học\nNgày 1/1/2020", &spec)
            .unwrap();
        assert_eq!(c.value, "Hồ sơ xây dựng trường học");
    }

    #[test]
    fn date_pattern_extracts_date() {
        let (spec, pattern) = catalog_pattern("ngay_ban_hanh");
        let c = pattern.evaluate("Ban hành: 15-08-2023", &spec).unwrap();
        assert_eq!(c.value, "15-08-2023");
    }

    #[test]
    fn empty_capture_is_kept_and_stops_later_patterns() {
        let spec = FieldSpec::new("ghi_chu", FieldType::Text);
        let pattern = PatternStrategy::compile("ghi_chu", &[r"ghi chú:(\s*)", r"(.+)"]).unwrap();
        let c = pattern.evaluate("Ghi chú:   ", &spec).unwrap();
        assert_eq!(c.value, "");
        assert!((c.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(c.original_span, "Ghi chú:   ");
    }

    #[test]
    fn empty_whole_match_keeps_whole_match_confidence() {
        let spec = FieldSpec::new("ghi_chu", FieldType::Text);
        let pattern = PatternStrategy::compile("ghi_chu", &[r"\s*$"]).unwrap();
        let c = pattern.evaluate("abc", &spec).unwrap();
        assert_eq!(c.value, "");
        assert!((c.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn no_match_gives_none() {
        let (spec, pattern) = catalog_pattern("ngay_ket_thuc");
        assert!(pattern.evaluate("không có thông tin", &spec).is_none());
    }

    #[test]
    fn invalid_pattern_is_reported_with_field() {
        let err = PatternStrategy::compile("broken", &[r"(unclosed"]).unwrap_err();
        assert!(matches!(err, StructuringError::InvalidPattern { ref field, .. } if field == "broken"));
    }

    #[test]
    fn patterns_are_listed_in_order() {
        let pattern = PatternStrategy::compile("f", &["a", "b"]).unwrap();
        assert_eq!(pattern.patterns().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
