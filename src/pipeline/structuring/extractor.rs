use std::sync::Arc;
use std::time::Instant;

use super::capability::Capabilities;
use super::entity::EntityRanking;
use super::registry::FieldSpec;
use super::strategy::{FieldStrategy, StrategyContext};
use super::types::{ExtractedField, ExtractionResult, FieldCandidate};
use crate::models::ExtractionMethod;
use crate::pipeline::ocr::{clamp_confidence, thresholds};

/// Local tiered extraction: every field's strategies run in order and the
/// most confident candidate is kept.
pub struct FieldExtractor {
    capabilities: Arc<Capabilities>,
    semantic_threshold: f32,
    entity_ranking: EntityRanking,
}

impl FieldExtractor {
    pub fn new(capabilities: Arc<Capabilities>) -> Self {
        Self {
            capabilities,
            semantic_threshold: thresholds::SEMANTIC_MATCH_THRESHOLD,
            entity_ranking: EntityRanking::default(),
        }
    }

    pub fn with_semantic_threshold(mut self, threshold: f32) -> Self {
        self.semantic_threshold = threshold;
        self
    }

    pub fn with_entity_ranking(mut self, ranking: EntityRanking) -> Self {
        self.entity_ranking = ranking;
        self
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// One output field per spec, in spec order.
    ///
    /// A capability is only loaded when some field carries a strategy that
    /// needs it.
    pub fn extract(&self, text: &str, fields: &[FieldSpec]) -> ExtractionResult {
        let start = Instant::now();
        let _span = tracing::info_span!("local_extraction", fields = fields.len()).entered();

        let needs = |pred: fn(&FieldStrategy) -> bool| {
            fields.iter().any(|f| f.strategies.iter().any(pred))
        };
        let similarity = if needs(|s| matches!(s, FieldStrategy::Semantic(_))) {
            self.capabilities.similarity.get()
        } else {
            None
        };
        let entities = if needs(|s| matches!(s, FieldStrategy::Entity(_))) {
            self.capabilities.entities.get()
        } else {
            None
        };

        let ctx = StrategyContext::new(similarity.as_deref(), entities.as_deref())
            .with_semantic_threshold(self.semantic_threshold)
            .with_entity_ranking(self.entity_ranking);

        let extracted: Vec<ExtractedField> = fields
            .iter()
            .map(|spec| self.extract_field(text, spec, &ctx))
            .collect();

        let filled = extracted.iter().filter(|f| !f.value.is_empty()).count();
        let result = ExtractionResult::new(
            extracted,
            start.elapsed().as_secs_f64(),
            ExtractionMethod::Local,
        );
        tracing::info!(
            filled,
            total = fields.len(),
            overall_confidence = result.overall_confidence(),
            semantic = ctx.semantic_ready(),
            entities = ctx.entities_ready(),
            "Local extraction complete"
        );
        result
    }

    /// A candidate replaces the current best only with strictly higher
    /// confidence, so earlier strategies win ties. Strategy errors are logged
    /// and skipped.
    pub fn extract_field(&self, text: &str, spec: &FieldSpec, ctx: &StrategyContext<'_>) -> ExtractedField {
        let mut best: Option<FieldCandidate> = None;

        for strategy in &spec.strategies {
            match strategy.evaluate(text, spec, ctx) {
                Ok(Some(mut candidate)) => {
                    candidate.confidence = clamp_confidence(candidate.confidence);
                    let current = best.as_ref().map_or(0.0, |b| b.confidence);
                    if candidate.confidence > current {
                        best = Some(candidate);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        field = %spec.name,
                        strategy = %strategy.kind(),
                        error = %e,
                        "Strategy failed, skipping"
                    );
                }
            }
        }

        match best {
            Some(candidate) => ExtractedField::from_candidate(spec, candidate),
            None => ExtractedField::empty(spec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, FieldType, StrategyKind};
    use crate::pipeline::structuring::capability::LazyCapability;
    use crate::pipeline::structuring::embedder::MockEmbedder;
    use crate::pipeline::structuring::entity::EntityStrategy;
    use crate::pipeline::structuring::pattern::PatternStrategy;
    use crate::pipeline::structuring::registry::FieldRegistry;
    use crate::pipeline::structuring::types::{Entity, EntityExtractor, SimilarityModel};
    use crate::pipeline::structuring::StructuringError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COVER: &str = "UBND TỈNH BÌNH DƯƠNG\n\
        Số hồ sơ: 12345/2025\n\
        Tiêu đề: Hồ sơ xây dựng trường tiểu học\n\
        Thời hạn bảo quản: Vĩnh viễn\n\
        Từ ngày 01/02/2020 đến ngày 15/06/2021\n\
        Tổng số trang: 45\n";

    struct BrokenEntities;

    impl EntityExtractor for BrokenEntities {
        fn extract(&self, _text: &str) -> Result<Vec<Entity>, StructuringError> {
            Err(StructuringError::EntityRecognition("offline".into()))
        }
    }

    fn extractor(caps: Capabilities) -> FieldExtractor {
        FieldExtractor::new(Arc::new(caps))
    }

    #[test]
    fn dossier_cover_fields_are_filled_in_order() {
        let registry = FieldRegistry::builtin().unwrap();
        let fields = registry.fields_for(DocumentType::ThongTinHoSo).unwrap();
        let result = extractor(Capabilities::regex_only()).extract(COVER, fields);

        assert_eq!(result.method, ExtractionMethod::Local);
        assert_eq!(result.fields.len(), fields.len());
        for (out, spec) in result.fields.iter().zip(fields) {
            assert_eq!(out.name, spec.name);
            assert_eq!(out.is_required, spec.required);
        }

        let so = result.field("so_ho_so").unwrap();
        assert_eq!(so.value, "12345/2025");
        assert!((so.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(so.source_strategy, Some(StrategyKind::Pattern));

        assert_eq!(result.field("tieu_de_ho_so").unwrap().value, "Hồ sơ xây dựng trường tiểu học");
        assert_eq!(result.field("ngay_bat_dau").unwrap().value, "01/02/2020");
        assert_eq!(result.field("ngay_ket_thuc").unwrap().value, "15/06/2021");
        assert_eq!(result.field("tong_so_trang").unwrap().value, "45");
        assert!(result.overall_confidence() >= 0.7);
    }

    #[test]
    fn empty_text_gives_empty_fields() {
        let registry = FieldRegistry::builtin().unwrap();
        let fields = registry.fields_for(DocumentType::ThongTinVanBan).unwrap();
        let result = extractor(Capabilities::regex_only()).extract("", fields);

        assert_eq!(result.fields.len(), fields.len());
        assert!(result.fields.iter().all(|f| f.value.is_empty() && f.confidence == 0.0));
        assert!(result.fields.iter().all(|f| f.source_strategy.is_none()));
        assert_eq!(result.overall_confidence(), 0.0);
    }

    #[test]
    fn field_without_strategies_stays_empty() {
        let spec = FieldSpec::new("ghi_chu", FieldType::Text).required(true);
        let result = extractor(Capabilities::regex_only()).extract("Ghi chú: x", &[spec]);
        let field = &result.fields[0];
        assert!(field.value.is_empty());
        assert!(field.is_required);
    }

    #[test]
    fn higher_confidence_strategy_replaces_earlier_one() {
        // Entity (0.7) runs first, pattern (0.9) second.
        let spec = FieldSpec::new("ngay", FieldType::Date)
            .with_strategy(FieldStrategy::Entity(EntityStrategy))
            .with_strategy(FieldStrategy::Pattern(
                PatternStrategy::compile("ngay", &[r"ký ngày (\d{2}/\d{2}/\d{4})"]).unwrap(),
            ));
        let result = extractor(Capabilities::regex_only()).extract("01/01/1999 ký ngày 02/02/2024", &[spec]);
        let field = &result.fields[0];
        assert_eq!(field.value, "02/02/2024");
        assert_eq!(field.source_strategy, Some(StrategyKind::Pattern));
    }

    #[test]
    fn equal_confidence_keeps_first_strategy() {
        let spec = FieldSpec::new("so", FieldType::Text)
            .with_strategy(FieldStrategy::Pattern(PatternStrategy::compile("so", &[r"A(\d)"]).unwrap()))
            .with_strategy(FieldStrategy::Pattern(PatternStrategy::compile("so", &[r"B(\d)"]).unwrap()));
        let result = extractor(Capabilities::none()).extract("B2 A1", &[spec]);
        assert_eq!(result.fields[0].value, "1");
    }

    #[test]
    fn empty_pattern_match_holds_the_field() {
        let spec = FieldSpec::new("nguoi_ky", FieldType::Text)
            .with_strategy(FieldStrategy::Pattern(
                PatternStrategy::compile("nguoi_ky", &[r"người ký:([ \t]*)$"]).unwrap(),
            ))
            .with_strategy(FieldStrategy::Entity(EntityStrategy));
        let result = extractor(Capabilities::regex_only()).extract("Trần Văn An\nNgười ký:  ", &[spec]);
        let field = &result.fields[0];
        assert_eq!(field.value, "");
        assert!((field.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(field.source_strategy, Some(StrategyKind::Pattern));
    }

    #[test]
    fn failing_strategy_is_skipped() {
        let caps = Capabilities::new(
            LazyCapability::absent("similarity"),
            LazyCapability::ready("entities", Arc::new(BrokenEntities) as Arc<dyn EntityExtractor>),
        );
        let spec = FieldSpec::new("so", FieldType::Numeric)
            .with_strategy(FieldStrategy::Entity(EntityStrategy))
            .with_strategy(FieldStrategy::Pattern(PatternStrategy::compile("so", &[r"số (\d+)"]).unwrap()));
        let result = extractor(caps).extract("số 42", &[spec]);
        assert_eq!(result.fields[0].value, "42");
    }

    #[test]
    fn missing_capabilities_fall_back_to_patterns() {
        let registry = FieldRegistry::builtin().unwrap();
        let fields = registry.fields_for(DocumentType::ThongTinHoSo).unwrap();
        let result = extractor(Capabilities::none()).extract(COVER, fields);
        assert_eq!(result.field("so_ho_so").unwrap().value, "12345/2025");
        assert!(result
            .fields
            .iter()
            .all(|f| f.source_strategy.is_none() || f.source_strategy == Some(StrategyKind::Pattern)));
    }

    #[test]
    fn similarity_model_loads_only_when_needed() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let caps = Capabilities::new(
            LazyCapability::lazy("similarity", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MockEmbedder::new()) as Arc<dyn SimilarityModel>)
            }),
            LazyCapability::absent("entities"),
        );
        let extractor = extractor(caps);

        let pattern_only = FieldSpec::new("so", FieldType::Numeric)
            .with_strategy(FieldStrategy::Pattern(PatternStrategy::compile("so", &[r"(\d+)"]).unwrap()));
        extractor.extract("12", &[pattern_only]);
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        let registry = FieldRegistry::builtin().unwrap();
        let fields = registry.fields_for(DocumentType::ThongTinHoSo).unwrap();
        extractor.extract(COVER, fields);
        extractor.extract(COVER, fields);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(extractor.capabilities().similarity.is_ready());
    }

    #[test]
    fn confidences_stay_in_unit_range() {
        let registry = FieldRegistry::builtin().unwrap();
        let caps = Capabilities::new(
            LazyCapability::ready("similarity", Arc::new(MockEmbedder::new()) as Arc<dyn SimilarityModel>),
            LazyCapability::ready(
                "entities",
                Arc::new(crate::pipeline::structuring::entity::RegexEntityExtractor::new()) as Arc<dyn EntityExtractor>,
            ),
        );
        let extractor = extractor(caps);
        for doc_type in DocumentType::ALL {
            let fields = registry.fields_for(doc_type).unwrap();
            let result = extractor.extract(COVER, fields);
            assert!(result.fields.iter().all(|f| (0.0..=1.0).contains(&f.confidence)));
        }
    }
}
