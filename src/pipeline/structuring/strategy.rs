use super::entity::{EntityRanking, EntityStrategy};
use super::pattern::PatternStrategy;
use super::registry::FieldSpec;
use super::semantic::SemanticStrategy;
use super::types::{EntityExtractor, FieldCandidate, SimilarityModel};
use super::StructuringError;
use crate::models::StrategyKind;
use crate::pipeline::ocr::thresholds;

/// A local extraction strategy attached to a field.
///
/// Remote extraction works on the whole document and is driven by the
/// fallback controller instead.
#[derive(Debug, Clone)]
pub enum FieldStrategy {
    Pattern(PatternStrategy),
    Semantic(SemanticStrategy),
    Entity(EntityStrategy),
}

impl FieldStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            FieldStrategy::Pattern(_) => StrategyKind::Pattern,
            FieldStrategy::Semantic(_) => StrategyKind::Semantic,
            FieldStrategy::Entity(_) => StrategyKind::Entity,
        }
    }

    /// Try to fill `spec` from `text`. `Ok(None)` means no candidate,
    /// including when the capability the strategy needs is missing.
    pub fn evaluate(
        &self,
        text: &str,
        spec: &FieldSpec,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<FieldCandidate>, StructuringError> {
        match self {
            FieldStrategy::Pattern(pattern) => Ok(pattern.evaluate(text, spec)),
            FieldStrategy::Semantic(semantic) => semantic.evaluate(text, spec, ctx),
            FieldStrategy::Entity(entity) => entity.evaluate(text, spec, ctx),
        }
    }
}

/// Capabilities and tuning resolved once per extraction pass.
pub struct StrategyContext<'a> {
    pub similarity: Option<&'a dyn SimilarityModel>,
    pub entities: Option<&'a dyn EntityExtractor>,
    pub semantic_threshold: f32,
    pub entity_ranking: EntityRanking,
}

impl<'a> StrategyContext<'a> {
    pub fn new(
        similarity: Option<&'a dyn SimilarityModel>,
        entities: Option<&'a dyn EntityExtractor>,
    ) -> Self {
        Self {
            similarity,
            entities,
            semantic_threshold: thresholds::SEMANTIC_MATCH_THRESHOLD,
            entity_ranking: EntityRanking::default(),
        }
    }

    /// Context with no model capabilities.
    pub fn bare() -> Self {
        Self::new(None, None)
    }

    pub fn with_semantic_threshold(mut self, threshold: f32) -> Self {
        self.semantic_threshold = threshold;
        self
    }

    pub fn with_entity_ranking(mut self, ranking: EntityRanking) -> Self {
        self.entity_ranking = ranking;
        self
    }

    pub fn semantic_ready(&self) -> bool {
        self.similarity.is_some()
    }

    pub fn entities_ready(&self) -> bool {
        self.entities.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldType;
    use crate::pipeline::structuring::entity::RegexEntityExtractor;

    #[test]
    fn kinds_match_variants() {
        let pattern = FieldStrategy::Pattern(PatternStrategy::compile("f", &[r"(\d+)"]).unwrap());
        let semantic = FieldStrategy::Semantic(SemanticStrategy::new(&["số"]).unwrap());
        let entity = FieldStrategy::Entity(EntityStrategy);
        assert_eq!(pattern.kind(), StrategyKind::Pattern);
        assert_eq!(semantic.kind(), StrategyKind::Semantic);
        assert_eq!(entity.kind(), StrategyKind::Entity);
    }

    #[test]
    fn bare_context_disables_model_strategies() {
        let ctx = StrategyContext::bare();
        assert!(!ctx.semantic_ready());
        assert!(!ctx.entities_ready());

        let spec = FieldSpec::new("ngay", FieldType::Date);
        let text = "Ngày 12/03/2024";
        let semantic = FieldStrategy::Semantic(SemanticStrategy::new(&["ngày"]).unwrap());
        let entity = FieldStrategy::Entity(EntityStrategy);
        assert_eq!(semantic.evaluate(text, &spec, &ctx).unwrap(), None);
        assert_eq!(entity.evaluate(text, &spec, &ctx).unwrap(), None);
    }

    #[test]
    fn entity_dispatch_uses_context_extractor() {
        let ner = RegexEntityExtractor::new();
        let ctx = StrategyContext::new(None, Some(&ner));
        let spec = FieldSpec::new("ngay", FieldType::Date);
        let candidate = FieldStrategy::Entity(EntityStrategy)
            .evaluate("Ký ngày 12/03/2024", &spec, &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(candidate.value, "12/03/2024");
        assert_eq!(candidate.source_strategy, StrategyKind::Entity);
    }
}
