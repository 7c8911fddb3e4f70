use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The canonical string is also the serde representation.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(DocumentType {
    ThongTinHoSo => "THONG_TIN_HO_SO",
    MucLucTaiLieu => "MUC_LUC_TAI_LIEU",
    ThongTinVanBan => "THONG_TIN_VAN_BAN",
});

str_enum!(FieldType {
    Text => "TEXT",
    Numeric => "NUMERIC",
    Date => "DATE",
    Dropdown => "DROPDOWN",
});

str_enum!(StrategyKind {
    Pattern => "pattern",
    Semantic => "semantic",
    Entity => "entity",
    Remote => "remote",
});

str_enum!(ProcessingStatus {
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Failed => "FAILED",
});

str_enum!(ExtractionMethod {
    Local => "local",
    Remote => "remote",
    Failed => "failed",
});

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [
        DocumentType::ThongTinHoSo,
        DocumentType::MucLucTaiLieu,
        DocumentType::ThongTinVanBan,
    ];

    /// Guess the document type from an upload file name.
    ///
    /// Archive covers are scanned as `BIA*`, tables of contents as `MUCLUC*`;
    /// anything else is treated as an individual official document.
    pub fn from_filename(filename: &str) -> Self {
        let name = std::path::Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(filename)
            .to_uppercase();

        if name.starts_with("BIA") {
            DocumentType::ThongTinHoSo
        } else if name.starts_with("MUCLUC") {
            DocumentType::MucLucTaiLieu
        } else {
            DocumentType::ThongTinVanBan
        }
    }
}
