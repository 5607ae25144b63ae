//! Learning store data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::Category;

// ============================================================================
// Pattern kinds
// ============================================================================

/// Kinds of reusable patterns extracted from confirmed LLM answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    AffixPrefix2,
    AffixPrefix3,
    AffixSuffix2,
    AffixSuffix3,
    PhoneticFamilySoundex,
    PhoneticFamilyDoubleMetaphone,
    FullName,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AffixPrefix2 => "affix_prefix_2",
            Self::AffixPrefix3 => "affix_prefix_3",
            Self::AffixSuffix2 => "affix_suffix_2",
            Self::AffixSuffix3 => "affix_suffix_3",
            Self::PhoneticFamilySoundex => "phonetic_family_soundex",
            Self::PhoneticFamilyDoubleMetaphone => "phonetic_family_double_metaphone",
            Self::FullName => "full_name",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "affix_prefix_2" => Some(Self::AffixPrefix2),
            "affix_prefix_3" => Some(Self::AffixPrefix3),
            "affix_suffix_2" => Some(Self::AffixSuffix2),
            "affix_suffix_3" => Some(Self::AffixSuffix3),
            "phonetic_family_soundex" => Some(Self::PhoneticFamilySoundex),
            "phonetic_family_double_metaphone" => Some(Self::PhoneticFamilyDoubleMetaphone),
            "full_name" => Some(Self::FullName),
            _ => None,
        }
    }

    /// Lookup rank: full names beat long affixes beat phonetic families
    /// beat short affixes. Lower ranks sort first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::FullName => 0,
            Self::AffixPrefix3 | Self::AffixSuffix3 => 1,
            Self::PhoneticFamilySoundex | Self::PhoneticFamilyDoubleMetaphone => 2,
            Self::AffixPrefix2 | Self::AffixSuffix2 => 3,
        }
    }
}

// ============================================================================
// Stored rows
// ============================================================================

/// One confirmed LLM answer. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LlmAnswerRecord {
    pub id: i64,
    pub normalised_name: String,
    pub category: String,
    pub confidence: f64,
    pub provider_tag: String,
    pub created_at: DateTime<Utc>,
}

/// Exact-match cache entry for a full normalised name.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FullNameCacheRow {
    pub normalised_name: String,
    pub category: String,
    pub confidence: f64,
    pub provider_tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A learned pattern row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: i64,
    pub kind: String,
    pub value: String,
    pub category: String,
    pub confidence: f64,
    pub evidence_count: i64,
    pub application_count: i64,
    pub correct_count: i64,
    pub created_from_job: Option<String>,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl LearnedPattern {
    pub fn kind_enum(&self) -> Option<PatternKind> {
        PatternKind::parse_kind(&self.kind)
    }

    pub fn category_enum(&self) -> Category {
        Category::parse_category(&self.category)
    }

    /// Measured hit accuracy over recorded applications.
    pub fn accuracy(&self) -> Option<f64> {
        if self.application_count == 0 {
            None
        } else {
            Some(self.correct_count as f64 / self.application_count as f64)
        }
    }
}

/// One phonetic family row: the set of names sharing a `(codec, code)`
/// pair for one category.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PhoneticFamilyRow {
    pub id: i64,
    pub codec_id: String,
    pub code: String,
    pub category: String,
    pub member_count: i64,
    /// JSON array of up to a handful of sample member tokens.
    pub representatives: String,
    pub updated_at: DateTime<Utc>,
}

impl PhoneticFamilyRow {
    pub fn category_enum(&self) -> Category {
        Category::parse_category(&self.category)
    }

    pub fn representative_tokens(&self) -> Vec<String> {
        serde_json::from_str(&self.representatives).unwrap_or_default()
    }
}

/// Result of a learned-affix lookup.
#[derive(Debug, Clone)]
pub struct LearnedMatch {
    pub pattern_id: i64,
    pub kind: PatternKind,
    pub value: String,
    pub category: Category,
    pub confidence: f64,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LearningError {
    #[error("learning database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("learning serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
