use serde::Deserialize;
use serde_json::Value;

use super::StructuringError;

/// One field as reported by the remote model, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub name: String,
    pub value: String,
    pub confidence: Option<f32>,
    pub original_text: String,
}

/// The model's field list. Any overall score it reports is ignored; the
/// overall confidence is always derived from the normalized fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExtraction {
    pub fields: Vec<RawField>,
}

/// Parse the remote model's answer. Accepts a fenced or bare JSON object;
/// entries without a usable name are skipped.
pub fn parse_extraction_response(response: &str) -> Result<RawExtraction, StructuringError> {
    #[derive(Deserialize)]
    struct RawResponse {
        #[serde(default)]
        fields: Vec<Value>,
    }

    let json_str = extract_json_block(response)?;
    let raw: RawResponse =
        serde_json::from_str(json_str).map_err(|e| StructuringError::JsonParsing(e.to_string()))?;

    Ok(RawExtraction {
        fields: raw.fields.iter().filter_map(parse_field).collect(),
    })
}

fn extract_json_block(response: &str) -> Result<&str, StructuringError> {
    for fence in ["```json", "```"] {
        if let Some(start) = response.find(fence) {
            let content_start = start + fence.len();
            let end = response[content_start..]
                .find("```")
                .ok_or_else(|| StructuringError::MalformedResponse("Unclosed JSON block".into()))?;
            return Ok(response[content_start..content_start + end].trim());
        }
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&response[start..=end]),
        _ => Err(StructuringError::MalformedResponse("No JSON object found".into())),
    }
}

fn parse_field(item: &Value) -> Option<RawField> {
    let obj = item.as_object()?;
    let name = obj.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    Some(RawField {
        name: name.to_string(),
        value: obj.get("value").map(value_to_string).unwrap_or_default(),
        confidence: obj
            .get("confidence_score")
            .or_else(|| obj.get("confidence"))
            .and_then(number_from_value),
        original_text: obj
            .get("original_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Models answer numbers, nulls and strings interchangeably.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn number_from_value(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let response = r#"Kết quả:
```json
{
  "fields": [
    {"name": "so_van_ban", "value": "12/QĐ-UBND", "confidence_score": 0.92, "original_text": "Số: 12/QĐ-UBND"},
    {"name": "so_trang", "value": 4, "confidence_score": "0.8"}
  ],
  "overall_confidence": 0.85
}
```"#;
        let parsed = parse_extraction_response(response).unwrap();
        assert_eq!(parsed.fields.len(), 2);
        assert_eq!(parsed.fields[0].value, "12/QĐ-UBND");
        assert_eq!(parsed.fields[0].original_text, "Số: 12/QĐ-UBND");
        assert_eq!(parsed.fields[1].value, "4");
        assert_eq!(parsed.fields[1].confidence, Some(0.8));
    }

    #[test]
    fn parses_bare_json_with_surrounding_text() {
        let response = "Đây là JSON: {\"fields\": [{\"name\": \"ghi_chu\", \"value\": null}]} xong.";
        let parsed = parse_extraction_response(response).unwrap();
        assert_eq!(parsed.fields[0].value, "");
        assert_eq!(parsed.fields[0].confidence, None);
    }

    #[test]
    fn nameless_entries_are_skipped() {
        let response = r#"{"fields": [{"value": "x"}, {"name": "  ", "value": "y"}, "junk", {"name": "a", "value": "z"}]}"#;
        let parsed = parse_extraction_response(response).unwrap();
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.fields[0].name, "a");
    }

    #[test]
    fn missing_fields_key_is_empty() {
        let parsed = parse_extraction_response("{}").unwrap();
        assert!(parsed.fields.is_empty());
    }

    #[test]
    fn no_json_is_malformed() {
        assert!(matches!(
            parse_extraction_response("Xin lỗi, tôi không thể trả lời."),
            Err(StructuringError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_extraction_response("```json\n{\"fields\": []"),
            Err(StructuringError::MalformedResponse(_))
        ));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(
            parse_extraction_response("{\"fields\": [}"),
            Err(StructuringError::JsonParsing(_))
        ));
    }
}
