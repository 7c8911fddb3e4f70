use super::registry::FieldSpec;
use crate::models::{DocumentType, FieldType};

pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "Bạn là chuyên gia trích xuất thông tin từ tài liệu hành chính và lưu trữ Việt Nam. \
     Chỉ trả về JSON hợp lệ, không thêm lời giải thích.";

fn type_hint(value_type: FieldType) -> &'static str {
    match value_type {
        FieldType::Date => " (định dạng DD/MM/YYYY)",
        FieldType::Numeric => " (chỉ chữ số)",
        FieldType::Text | FieldType::Dropdown => "",
    }
}

/// Build the whole-document extraction prompt for the remote extractor.
pub fn build_extraction_prompt(text: &str, document_type: DocumentType, fields: &[FieldSpec]) -> String {
    let field_lines: Vec<String> = fields
        .iter()
        .map(|f| {
            let required = if f.required { " (Bắt buộc)" } else { "" };
            format!("- {}: {}{}{}", f.name, f.value_type, type_hint(f.value_type), required)
        })
        .collect();

    format!(
        r#"Nhiệm vụ: trích xuất thông tin từ văn bản OCR theo cấu trúc đã định.

Loại tài liệu: {document_type}

Các trường cần trích xuất:
{fields}

<document>
{text}
</document>

Hướng dẫn:
1. Chỉ lấy thông tin có trong văn bản; không suy đoán.
2. Nếu không tìm thấy, để giá trị rỗng.
3. Trường DATE dùng định dạng DD/MM/YYYY.
4. Trường NUMERIC chỉ trả về số.
5. Đánh giá độ tin cậy của từng trường trong khoảng 0 đến 1.

Trả về JSON:
{{
  "fields": [
    {{"name": "tên_trường", "value": "giá_trị", "confidence_score": 0.9, "original_text": "văn_bản_gốc"}}
  ],
  "overall_confidence": 0.85
}}"#,
        fields = field_lines.join("\n"),
    )
}
