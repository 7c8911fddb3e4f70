use std::collections::HashMap;

use super::catalog::{catalog_fields, document_layouts};
use super::entity::EntityStrategy;
use super::semantic::SemanticStrategy;
use super::strategy::FieldStrategy;
use super::StructuringError;
use crate::models::{DocumentType, FieldType, StrategyKind};

/// Declarative description of one field: its type, whether it must be
/// present, and the local strategies to try, in order.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub value_type: FieldType,
    pub required: bool,
    pub strategies: Vec<FieldStrategy>,
}

impl FieldSpec {
    pub fn new(name: &str, value_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            required: false,
            strategies: Vec::new(),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_strategy(mut self, strategy: FieldStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(FieldStrategy::kind).collect()
    }
}

/// Field sets per document type, plus a catalog of every known field so
/// custom fields can reuse their tuned strategies.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    catalog: HashMap<String, FieldSpec>,
    layouts: HashMap<DocumentType, Vec<FieldSpec>>,
}

impl FieldRegistry {
    /// Registry with no document types.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in Vietnamese archival catalog and its three document types.
    pub fn builtin() -> Result<Self, StructuringError> {
        let mut registry = Self::empty();
        for spec in catalog_fields()? {
            registry.catalog.insert(spec.name.clone(), spec);
        }

        for (doc_type, layout) in document_layouts() {
            let mut fields = Vec::with_capacity(layout.len());
            for (name, required) in layout {
                let spec = registry
                    .catalog
                    .get(*name)
                    .cloned()
                    .ok_or_else(|| StructuringError::InvalidPattern {
                        field: name.to_string(),
                        message: "field missing from catalog".into(),
                    })?;
                fields.push(spec.required(*required));
            }
            registry.layouts.insert(doc_type, fields);
        }

        tracing::debug!(
            fields = registry.catalog.len(),
            document_types = registry.layouts.len(),
            "Field registry loaded"
        );
        Ok(registry)
    }

    /// Register (or replace) the field set of a document type. Its fields
    /// also become available as custom fields.
    pub fn register(&mut self, doc_type: DocumentType, fields: Vec<FieldSpec>) {
        for spec in &fields {
            self.catalog
                .entry(spec.name.clone())
                .or_insert_with(|| spec.clone().required(false));
        }
        self.layouts.insert(doc_type, fields);
    }

    pub fn fields_for(&self, doc_type: DocumentType) -> Result<&[FieldSpec], StructuringError> {
        self.layouts
            .get(&doc_type)
            .map(Vec::as_slice)
            .ok_or(StructuringError::UnknownDocumentType(doc_type))
    }

    pub fn catalog_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.catalog.get(name)
    }

    pub fn document_types(&self) -> Vec<DocumentType> {
        DocumentType::ALL
            .into_iter()
            .filter(|dt| self.layouts.contains_key(dt))
            .collect()
    }

    /// The document type's fields followed by any extra custom fields.
    ///
    /// Custom names already in the set are ignored. A known name reuses its
    /// catalog spec; an unknown one becomes an optional TEXT field searched
    /// semantically by its own name and by entity type.
    pub fn resolve(
        &self,
        doc_type: DocumentType,
        custom_fields: &[String],
    ) -> Result<Vec<FieldSpec>, StructuringError> {
        let mut fields = self.fields_for(doc_type)?.to_vec();

        for raw in custom_fields {
            let name = raw.trim();
            if name.is_empty() || fields.iter().any(|f| f.name == name) {
                continue;
            }
            let spec = match self.catalog.get(name) {
                Some(known) => known.clone().required(false),
                None => ad_hoc_field(name)?,
            };
            fields.push(spec);
        }

        Ok(fields)
    }
}

fn ad_hoc_field(name: &str) -> Result<FieldSpec, StructuringError> {
    let keyword = name.replace('_', " ");
    Ok(FieldSpec::new(name, FieldType::Text)
        .with_strategy(FieldStrategy::Semantic(SemanticStrategy::new(&[keyword.as_str()])?))
        .with_strategy(FieldStrategy::Entity(EntityStrategy)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(fields: &[FieldSpec]) -> Vec<&str> {
        fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn builtin_dossier_fields_in_order() {
        let registry = FieldRegistry::builtin().unwrap();
        let fields = registry.fields_for(DocumentType::ThongTinHoSo).unwrap();
        assert_eq!(
            names(fields),
            vec![
                "so_ho_so",
                "tieu_de_ho_so",
                "don_vi_lap_ho_so",
                "thoi_han_bao_quan",
                "ngay_bat_dau",
                "ngay_ket_thuc",
                "tong_so_trang",
                "ghi_chu",
            ]
        );
        assert!(fields[0].required && fields[1].required);
        assert!(!fields[2].required);
        assert_eq!(fields[6].value_type, FieldType::Numeric);
    }

    #[test]
    fn builtin_fields_try_pattern_then_semantic_then_entity() {
        let registry = FieldRegistry::builtin().unwrap();
        let spec = registry.catalog_spec("ngay_ban_hanh").unwrap();
        assert_eq!(
            spec.strategy_kinds(),
            vec![StrategyKind::Pattern, StrategyKind::Semantic, StrategyKind::Entity]
        );
    }

    #[test]
    fn all_document_types_registered() {
        let registry = FieldRegistry::builtin().unwrap();
        assert_eq!(registry.document_types(), DocumentType::ALL.to_vec());
    }

    #[test]
    fn empty_registry_rejects_document_type() {
        let registry = FieldRegistry::empty();
        assert!(matches!(
            registry.fields_for(DocumentType::ThongTinVanBan),
            Err(StructuringError::UnknownDocumentType(DocumentType::ThongTinVanBan))
        ));
    }

    #[test]
    fn custom_fields_are_appended_after_required_ones() {
        let registry = FieldRegistry::builtin().unwrap();
        let fields = registry
            .resolve(
                DocumentType::ThongTinVanBan,
                &["tong_so_trang".into(), "so_luu_tru".into(), "so_van_ban".into(), " ".into()],
            )
            .unwrap();
        let n = fields.len();
        assert_eq!(names(&fields[n - 2..]), vec!["tong_so_trang", "so_luu_tru"]);
        assert!(fields.iter().filter(|f| f.name == "so_van_ban").count() == 1);
        assert!(fields.iter().any(|f| f.name == "trich_yeu" && f.required));
    }

    #[test]
    fn unknown_custom_field_is_optional_text() {
        let registry = FieldRegistry::builtin().unwrap();
        let fields = registry
            .resolve(DocumentType::ThongTinHoSo, &["ma_luu_tru".into()])
            .unwrap();
        let custom = fields.last().unwrap();
        assert_eq!(custom.name, "ma_luu_tru");
        assert_eq!(custom.value_type, FieldType::Text);
        assert!(!custom.required);
        assert_eq!(
            custom.strategy_kinds(),
            vec![StrategyKind::Semantic, StrategyKind::Entity]
        );
    }

    #[test]
    fn registering_a_layout_extends_the_catalog() {
        let mut registry = FieldRegistry::empty();
        registry.register(
            DocumentType::ThongTinVanBan,
            vec![FieldSpec::new("so_cong_van", FieldType::Text).required(true)],
        );
        assert_eq!(registry.fields_for(DocumentType::ThongTinVanBan).unwrap().len(), 1);
        assert!(!registry.catalog_spec("so_cong_van").unwrap().required);
    }
}
