//! Learning store.
//!
//! Persists confirmed LLM answers and the reusable patterns extracted from
//! them so later rows in the same batch can classify without another LLM
//! call.

mod models;
mod store;

pub use models::{
    FullNameCacheRow, LearnedMatch, LearnedPattern, LearningError, LlmAnswerRecord, PatternKind,
    PhoneticFamilyRow,
};
pub use store::LearningStore;
