use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::ExtractedField;
use crate::models::FieldType;

static DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}[/\-]\d{1,2}[/\-]\d{4}").unwrap());

/// Advisory findings for one extraction. Values are never modified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn has_findings(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }
}

/// Check required fields, value formats and per-field confidence.
pub fn validate_fields(fields: &[ExtractedField], min_confidence: f32) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for field in fields {
        let value = field.value.trim();

        if field.is_required && value.is_empty() {
            errors.push(format!("Required field {} is missing", field.name));
        }

        match field.value_type {
            FieldType::Date if !value.is_empty() && !DATE_PREFIX.is_match(value) => {
                warnings.push(format!("Invalid date format for {}: {}", field.name, field.value));
            }
            FieldType::Numeric if !value.is_empty() && value.parse::<f64>().is_err() => {
                warnings.push(format!("Non-numeric value for {}: {}", field.name, field.value));
            }
            _ => {}
        }

        if field.confidence < min_confidence {
            warnings.push(format!("Low confidence for {}: {:.2}", field.name, field.confidence));
        }
    }

    if !errors.is_empty() || !warnings.is_empty() {
        tracing::debug!(errors = errors.len(), warnings = warnings.len(), "Validation findings");
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}
