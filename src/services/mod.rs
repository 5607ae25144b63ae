pub mod classifier;
pub mod dictionary;
pub mod job_store;
pub mod learning;
pub mod llm;
pub mod normalizer;
pub mod phonetic_match;
pub mod phonetics;
pub mod rules;
pub mod runner;
pub mod spreadsheet;

pub use classifier::{ClassifierOrchestrator, LocalDecision};
pub use dictionary::{DictionaryError, DictionaryStore};
pub use job_store::{JobStore, JobStoreError, input_fingerprint};
pub use learning::{LearnedMatch, LearnedPattern, LearningError, LearningStore, PatternKind};
pub use llm::{LlmAdapter, LlmAnswer, LlmBackend, LlmError};
pub use normalizer::{NamePart, NormalisedName, NormaliseError, TokenRole, normalise};
pub use phonetic_match::PhoneticClassifier;
pub use rules::RuleClassifier;
pub use runner::{BatchRunner, RunOptions, RunnerError};
pub use spreadsheet::{LeadReader, RowRead, SpreadsheetError, write_output};
