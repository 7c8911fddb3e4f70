//! Built-in field catalog for Vietnamese archival documents.
//!
//! Patterns are matched case-insensitively with `.` spanning newlines.

use super::entity::EntityStrategy;
use super::pattern::PatternStrategy;
use super::registry::FieldSpec;
use super::semantic::SemanticStrategy;
use super::strategy::FieldStrategy;
use super::StructuringError;
use crate::models::{DocumentType, FieldType};

const DATE: &str = r"(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})";

struct FieldDef {
    name: &'static str,
    value_type: FieldType,
    patterns: &'static [&'static str],
    keywords: &'static [&'static str],
}

const FIELDS: &[FieldDef] = &[
    // ── Dossier cover (hồ sơ) ──
    FieldDef {
        name: "so_ho_so",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:số\s*hồ\s*sơ|hồ\s*sơ\s*số)[:\s]*(\d+[\w\-/]*\d*)",
            r"(?:mã\s*số|số)[:\s]*(\d+[\w\-/]*\d*)",
            r"(\d+/\d+(?:/\d+)?)",
        ],
        keywords: &["số hồ sơ", "mã số", "số", "hồ sơ"],
    },
    FieldDef {
        name: "tieu_de_ho_so",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:tiêu\s*đề|tên\s*hồ\s*sơ|chủ\s*đề)[:\s]*(.+?)(?:\n|$)",
            r"(?:về|v/v)[:\s]*(.+?)(?:\n|$)",
            r"(?:nội\s*dung)[:\s]*(.+?)(?:\n|$)",
        ],
        keywords: &["tiêu đề", "tên hồ sơ", "chủ đề", "nội dung", "về", "v/v"],
    },
    FieldDef {
        name: "don_vi_lap_ho_so",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:đơn\s*vị\s*lập|cơ\s*quan\s*lập|phòng\s*ban)[:\s]*(.+?)(?:\n|$)",
            r"((?:phòng|ban|sở|cục|văn\s*phòng|công\s*ty|trường)\s+[\w\s]+)",
        ],
        keywords: &["đơn vị lập", "cơ quan lập", "phòng ban", "phòng", "ban", "sở"],
    },
    FieldDef {
        name: "thoi_han_bao_quan",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:thời\s*hạn\s*bảo\s*quản|bảo\s*quản)[:\s]*(.+?)(?:\n|$)",
            r"(?:vĩnh\s*viễn|dài\s*hạn|tạm\s*thời|\d+\s*năm)",
        ],
        keywords: &["thời hạn bảo quản", "bảo quản", "vĩnh viễn", "dài hạn"],
    },
    FieldDef {
        name: "ngay_bat_dau",
        value_type: FieldType::Date,
        patterns: &[
            r"(?:ngày\s*bắt\s*đầu|từ\s*ngày|bắt\s*đầu)[:\s]*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})",
            r"(?:từ)[:\s]*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})",
        ],
        keywords: &["ngày bắt đầu", "từ ngày", "bắt đầu", "từ"],
    },
    FieldDef {
        name: "ngay_ket_thuc",
        value_type: FieldType::Date,
        patterns: &[
            r"(?:ngày\s*kết\s*thúc|đến\s*ngày|kết\s*thúc)[:\s]*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})",
            r"(?:đến)[:\s]*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})",
        ],
        keywords: &["ngày kết thúc", "đến ngày", "kết thúc", "đến"],
    },
    FieldDef {
        name: "tong_so_trang",
        value_type: FieldType::Numeric,
        patterns: &[
            r"(?:tổng\s*số\s*trang|số\s*trang|trang)[:\s]*(\d+)",
            r"(\d+)\s*trang",
        ],
        keywords: &["tổng số trang", "số trang", "trang"],
    },
    FieldDef {
        name: "ghi_chu",
        value_type: FieldType::Text,
        patterns: &[r"(?:ghi\s*chú|chú\s*thích|lưu\s*ý)[:\s]*(.+?)(?:\n|$)"],
        keywords: &["ghi chú", "chú thích", "lưu ý", "note"],
    },
    // ── Table of contents rows (mục lục) ──
    FieldDef {
        name: "so_thu_tu",
        value_type: FieldType::Numeric,
        patterns: &[r"(?:số\s*thứ\s*tự|stt)[:.\s]*(\d+)", r"^\s*(\d+)[.)]\s"],
        keywords: &["số thứ tự", "stt"],
    },
    FieldDef {
        name: "so_ky_hieu",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:số\s*(?:và\s*)?k[ýí]\s*hiệu|k[ýí]\s*hiệu)[:\s]*([\w\-/.]*\d[\w\-/.]*)",
            r"(\d+/[\p{L}\d\-]+(?:/[\p{L}\d\-]+)*)",
        ],
        keywords: &["số ký hiệu", "ký hiệu", "số và ký hiệu"],
    },
    FieldDef {
        name: "ngay_thang",
        value_type: FieldType::Date,
        patterns: &[
            r"(?:ngày\s*tháng|ngày)[:\s]*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})",
            DATE,
        ],
        keywords: &["ngày tháng", "ngày"],
    },
    FieldDef {
        name: "trich_yeu_noi_dung",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:trích\s*yếu\s*nội\s*dung|trích\s*yếu|nội\s*dung)[:\s]*(.+?)(?:\n|$)",
            r"(?:về|v/v)[:\s]*(.+?)(?:\n|$)",
        ],
        keywords: &["trích yếu nội dung", "trích yếu", "nội dung", "v/v"],
    },
    FieldDef {
        name: "so_trang",
        value_type: FieldType::Numeric,
        patterns: &[r"(?:số\s*trang|số\s*tờ)[:\s]*(\d+)", r"(\d+)\s*trang"],
        keywords: &["số trang", "số tờ", "trang"],
    },
    // ── Official documents (văn bản) ──
    FieldDef {
        name: "so_van_ban",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:số\s*văn\s*bản|văn\s*bản\s*số)[:\s]*(\d+[\w\-/]*\d*)",
            r"(?:số)[:\s]*(\d+[\w\-/]*\d*)",
        ],
        keywords: &["số văn bản", "văn bản số", "số"],
    },
    FieldDef {
        name: "ngay_ban_hanh",
        value_type: FieldType::Date,
        patterns: &[
            r"(?:ngày\s*ban\s*hành|ban\s*hành)[:\s]*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})",
            r"(?:ngày)[:\s]*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})",
        ],
        keywords: &["ngày ban hành", "ban hành", "ngày"],
    },
    FieldDef {
        name: "trich_yeu",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:trích\s*yếu|tóm\s*tắt|nội\s*dung)[:\s]*(.+?)(?:\n|$)",
            r"(?:về|v/v)[:\s]*(.+?)(?:\n|$)",
        ],
        keywords: &["trích yếu", "tóm tắt", "nội dung", "về", "v/v"],
    },
    FieldDef {
        name: "don_vi_ban_hanh",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:đơn\s*vị\s*ban\s*hành|cơ\s*quan\s*ban\s*hành)[:\s]*(.+?)(?:\n|$)",
            r"((?:phòng|ban|sở|cục|văn\s*phòng|công\s*ty|trường)\s+[\w\s]+)",
        ],
        keywords: &["đơn vị ban hành", "cơ quan ban hành"],
    },
    FieldDef {
        name: "nguoi_ky",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:người\s*ký|ký\s*tên)[:\s]*(.+?)(?:\n|$)",
            r"(?:ký)[:\s]*(.+?)(?:\n|$)",
        ],
        keywords: &["người ký", "ký tên", "ký"],
    },
    FieldDef {
        name: "loai_van_ban",
        value_type: FieldType::Text,
        patterns: &[
            r"(?:loại\s*văn\s*bản)[:\s]*(.+?)(?:\n|$)",
            r"\b(quyết\s*định|công\s*văn|thông\s*báo|tờ\s*trình|báo\s*cáo|kế\s*hoạch|nghị\s*quyết|chỉ\s*thị|biên\s*bản)\b",
        ],
        keywords: &["loại văn bản"],
    },
];

/// Field layout per document type: (field name, required).
const DOCUMENT_LAYOUTS: &[(DocumentType, &[(&str, bool)])] = &[
    (
        DocumentType::ThongTinHoSo,
        &[
            ("so_ho_so", true),
            ("tieu_de_ho_so", true),
            ("don_vi_lap_ho_so", false),
            ("thoi_han_bao_quan", false),
            ("ngay_bat_dau", false),
            ("ngay_ket_thuc", false),
            ("tong_so_trang", false),
            ("ghi_chu", false),
        ],
    ),
    (
        DocumentType::MucLucTaiLieu,
        &[
            ("so_thu_tu", true),
            ("so_ky_hieu", true),
            ("ngay_thang", false),
            ("trich_yeu_noi_dung", true),
            ("so_trang", false),
            ("ghi_chu", false),
        ],
    ),
    (
        DocumentType::ThongTinVanBan,
        &[
            ("so_van_ban", true),
            ("ngay_ban_hanh", false),
            ("trich_yeu", true),
            ("don_vi_ban_hanh", false),
            ("nguoi_ky", false),
            ("loai_van_ban", false),
            ("so_trang", false),
            ("ghi_chu", false),
        ],
    ),
];

/// Every catalog field as an optional `FieldSpec` with Pattern → Semantic →
/// Entity strategies.
pub fn catalog_fields() -> Result<Vec<FieldSpec>, StructuringError> {
    FIELDS.iter().map(build_field).collect()
}

fn build_field(def: &FieldDef) -> Result<FieldSpec, StructuringError> {
    let mut spec = FieldSpec::new(def.name, def.value_type);
    if !def.patterns.is_empty() {
        spec = spec.with_strategy(FieldStrategy::Pattern(PatternStrategy::compile(
            def.name,
            def.patterns,
        )?));
    }
    if !def.keywords.is_empty() {
        spec = spec.with_strategy(FieldStrategy::Semantic(SemanticStrategy::new(def.keywords)?));
    }
    Ok(spec.with_strategy(FieldStrategy::Entity(EntityStrategy)))
}

/// Per document type, the names and requiredness of its fields, in order.
pub fn document_layouts() -> impl Iterator<Item = (DocumentType, &'static [(&'static str, bool)])> {
    DOCUMENT_LAYOUTS.iter().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_catalog_patterns_compile() {
        let fields = catalog_fields().unwrap();
        assert_eq!(fields.len(), FIELDS.len());
    }

    #[test]
    fn field_names_are_unique() {
        let names: HashSet<_> = FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), FIELDS.len());
    }

    #[test]
    fn every_layout_field_is_in_catalog() {
        let names: HashSet<_> = FIELDS.iter().map(|f| f.name).collect();
        for (doc_type, layout) in document_layouts() {
            for (name, _) in layout {
                assert!(names.contains(name), "{doc_type}: {name} missing from catalog");
            }
        }
    }

    #[test]
    fn every_document_type_has_a_layout() {
        let covered: HashSet<_> = document_layouts().map(|(dt, _)| dt).collect();
        for dt in DocumentType::ALL {
            assert!(covered.contains(&dt));
        }
    }

    #[test]
    fn every_layout_has_required_fields() {
        for (doc_type, layout) in document_layouts() {
            assert!(layout.iter().any(|(_, required)| *required), "{doc_type}");
        }
    }
}
