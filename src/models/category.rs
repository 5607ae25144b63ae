//! Demographic category and classification method enumerations.

use serde::{Deserialize, Serialize};

/// Demographic category assigned to a director name.
///
/// `Unknown` is reserved for "no layer produced an answer meeting its
/// threshold" and for rows that failed before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    African,
    Indian,
    Coloured,
    CapeMalay,
    White,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::African => "african",
            Self::Indian => "indian",
            Self::Coloured => "coloured",
            Self::CapeMalay => "cape_malay",
            Self::White => "white",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored or provider-returned category string.
    /// Anything unrecognised maps to `Unknown`.
    pub fn parse_category(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "african" => Self::African,
            "indian" => Self::Indian,
            "coloured" => Self::Coloured,
            "cape_malay" | "cape malay" => Self::CapeMalay,
            "white" => Self::White,
            _ => Self::Unknown,
        }
    }

    /// The categories a classifier may actually assign.
    pub fn assignable() -> [Category; 5] {
        [Self::African, Self::Indian, Self::Coloured, Self::CapeMalay, Self::White]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pipeline layer that produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Cache,
    Rule,
    Phonetic,
    Llm,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Rule => "rule",
            Self::Phonetic => "phonetic",
            Self::Llm => "llm",
        }
    }

    pub fn parse_method(s: &str) -> Option<Self> {
        match s {
            "cache" => Some(Self::Cache),
            "rule" => Some(Self::Rule),
            "phonetic" => Some(Self::Phonetic),
            "llm" => Some(Self::Llm),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
