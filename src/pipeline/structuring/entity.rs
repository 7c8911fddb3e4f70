use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::confidence::strategy_confidence::ENTITY;
use super::registry::FieldSpec;
use super::strategy::StrategyContext;
use super::types::{Entity, EntityExtractor, EntityLabel, FieldCandidate};
use super::StructuringError;
use crate::models::{FieldType, StrategyKind};

/// Which matching entity the entity strategy keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRanking {
    /// First in the recognizer's output order.
    #[default]
    FirstListed,
    /// Earliest in the document; recognizer order breaks ties.
    EarliestSpan,
}

/// Entity labels that can fill a field of the given type.
pub fn labels_for(value_type: FieldType) -> &'static [EntityLabel] {
    match value_type {
        FieldType::Date => &[EntityLabel::Date],
        FieldType::Numeric => &[EntityLabel::Number],
        FieldType::Text => &[
            EntityLabel::Person,
            EntityLabel::Organization,
            EntityLabel::Location,
        ],
        FieldType::Dropdown => &[],
    }
}

/// Fill a field with a recognized entity of a compatible type.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityStrategy;

impl EntityStrategy {
    pub fn evaluate(
        &self,
        text: &str,
        spec: &FieldSpec,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<FieldCandidate>, StructuringError> {
        let Some(extractor) = ctx.entities else {
            return Ok(None);
        };
        let labels = labels_for(spec.value_type);
        if labels.is_empty() {
            return Ok(None);
        }

        let entities = extractor.extract(text)?;
        let mut matching = entities.iter().filter(|e| labels.contains(&e.label));

        let chosen = match ctx.entity_ranking {
            EntityRanking::FirstListed => matching.next(),
            EntityRanking::EarliestSpan => matching.fold(None, |best: Option<&Entity>, e| match best {
                Some(b) if b.start <= e.start => Some(b),
                _ => Some(e),
            }),
        };

        Ok(chosen.and_then(|entity| {
            let value = entity.text.trim();
            (!value.is_empty()).then(|| FieldCandidate {
                field_name: spec.name.clone(),
                value: value.to_string(),
                confidence: ENTITY,
                source_strategy: StrategyKind::Entity,
                original_span: entity.text.clone(),
            })
        }))
    }
}

// ──────────────────────────────────────────────
// RegexEntityExtractor
// ──────────────────────────────────────────────

static ENTITY_PATTERNS: LazyLock<Vec<(EntityLabel, Regex)>> = LazyLock::new(|| {
    let insensitive = |src: &str| RegexBuilder::new(src).case_insensitive(true).build().unwrap();
    vec![
        (EntityLabel::Date, insensitive(r"\b\d{1,2}[/\-]\d{1,2}[/\-]\d{4}\b")),
        (EntityLabel::Number, insensitive(r"\b\d+[\w\-/]*\d*\b")),
        (
            EntityLabel::Organization,
            insensitive(r"\b(?:Phòng|Ban|Sở|Cục|Văn phòng|Công ty|Trường|Ủy ban|UBND)[ \t]+[\w \t]+\b"),
        ),
        (
            EntityLabel::Location,
            insensitive(r"\b(?:Tỉnh|Thành phố|Quận|Huyện|Thị xã|Xã|Phường)[ \t]+[\w \t]+\b"),
        ),
        // Case-sensitive: two or more capitalized syllables.
        (
            EntityLabel::Person,
            Regex::new(r"\b\p{Lu}\p{Ll}*(?:[ \t]+\p{Lu}\p{Ll}*)+\b").unwrap(),
        ),
    ]
});

/// Rule-based recognizer for Vietnamese administrative text.
///
/// Emits entities grouped by label (dates, numbers, organizations,
/// locations, people) and by position within each label.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexEntityExtractor;

impl RegexEntityExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl EntityExtractor for RegexEntityExtractor {
    fn extract(&self, text: &str) -> Result<Vec<Entity>, StructuringError> {
        let mut entities = Vec::new();
        for (label, pattern) in ENTITY_PATTERNS.iter() {
            for m in pattern.find_iter(text) {
                entities.push(Entity {
                    text: m.as_str().to_string(),
                    label: *label,
                    start: m.start(),
                    end: m.end(),
                });
            }
        }
        Ok(entities)
    }
}
