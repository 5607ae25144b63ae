//! Dictionary store.
//!
//! Loads the curated given-name, surname and compound-surname tables from
//! the embedded CSV assets at process start. The store is read-only at
//! runtime and shared across workers.

use std::collections::HashMap;

use serde::Deserialize;

use crate::embedded::DictionaryAssets;
use crate::models::Category;

/// Which name slot an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRole {
    Given,
    Surname,
    Either,
}

/// One curated dictionary entry.
#[derive(Debug, Clone)]
pub struct DictionaryEntry {
    pub surface_form: String,
    pub category: Category,
    pub role: EntryRole,
    pub confidence_weight: f64,
    pub source_tag: String,
}

/// A compound-surname pattern such as "van der merwe".
#[derive(Debug, Clone)]
pub struct CompoundPattern {
    pub tokens: Vec<String>,
    pub category: Category,
    pub confidence_weight: f64,
}

/// Span of tokens matched by a compound pattern, as indices into the
/// caller's token list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompoundSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    #[error("embedded dictionary asset missing: {0}")]
    MissingAsset(&'static str),

    #[error("dictionary parse error in {file}: {source}")]
    Parse {
        file: &'static str,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Deserialize)]
struct NameRow {
    name: String,
    category: String,
    weight: f64,
    source: String,
}

#[derive(Debug, Deserialize)]
struct CompoundRow {
    pattern: String,
    category: String,
    weight: f64,
    #[allow(dead_code)]
    source: String,
}

#[derive(Debug, Deserialize)]
struct OverrideRow {
    name: String,
    role: String,
    category: String,
}

/// In-memory dictionary maps. Keys are lower-cased surface forms.
pub struct DictionaryStore {
    given: HashMap<String, DictionaryEntry>,
    surnames: HashMap<String, DictionaryEntry>,
    compounds: Vec<CompoundPattern>,
}

impl DictionaryStore {
    /// Load every embedded dictionary file.
    pub fn load_embedded() -> Result<Self, DictionaryError> {
        let given = Self::load_names("given_names.csv", EntryRole::Given)?;
        let surnames = Self::load_names("surnames.csv", EntryRole::Surname)?;
        let mut store = Self { given, surnames, compounds: Self::load_compounds()? };
        store.apply_overrides()?;

        // Longest pattern first so "janse van rensburg" wins over "van rensburg"
        store.compounds.sort_by(|a, b| b.tokens.len().cmp(&a.tokens.len()));

        tracing::info!(
            "Dictionaries loaded: {} given names, {} surnames, {} compound patterns",
            store.given.len(),
            store.surnames.len(),
            store.compounds.len()
        );
        Ok(store)
    }

    /// Look up a token as a given name. Tokens are matched on their folded
    /// lower-case form.
    pub fn lookup_given(&self, token: &str) -> Option<(Category, f64)> {
        self.given
            .get(&token.to_lowercase())
            .map(|e| (e.category, e.confidence_weight))
    }

    /// Look up a token as a surname.
    pub fn lookup_surname(&self, token: &str) -> Option<(Category, f64)> {
        self.surnames
            .get(&token.to_lowercase())
            .map(|e| (e.category, e.confidence_weight))
    }

    /// Find the first (longest) compound-surname pattern inside the token
    /// list. Matching is case-insensitive over whole tokens.
    pub fn match_compound(&self, tokens: &[&str]) -> Option<(Category, f64, CompoundSpan)> {
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        for pattern in &self.compounds {
            let plen = pattern.tokens.len();
            if plen > lowered.len() {
                continue;
            }
            for start in 0..=(lowered.len() - plen) {
                if lowered[start..start + plen] == pattern.tokens[..] {
                    return Some((
                        pattern.category,
                        pattern.confidence_weight,
                        CompoundSpan { start, end: start + plen },
                    ));
                }
            }
        }
        None
    }

    /// Every curated token with its category, for building derived indexes.
    pub fn all_tokens(&self) -> impl Iterator<Item = (&str, Category)> {
        self.given
            .values()
            .chain(self.surnames.values())
            .map(|e| (e.surface_form.as_str(), e.category))
    }

    pub fn given_count(&self) -> usize {
        self.given.len()
    }

    pub fn surname_count(&self) -> usize {
        self.surnames.len()
    }

    fn load_names(
        file: &'static str,
        role: EntryRole,
    ) -> Result<HashMap<String, DictionaryEntry>, DictionaryError> {
        let text = DictionaryAssets::text(file).ok_or(DictionaryError::MissingAsset(file))?;
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let mut map = HashMap::new();

        for row in reader.deserialize::<NameRow>() {
            let row = row.map_err(|source| DictionaryError::Parse { file, source })?;
            let key = row.name.trim().to_lowercase();
            let category = Category::parse_category(&row.category);
            if category == Category::Unknown {
                tracing::warn!("Skipping {}: unknown category '{}' for '{}'", file, row.category, key);
                continue;
            }

            let entry = DictionaryEntry {
                surface_form: key.clone(),
                category,
                role,
                confidence_weight: row.weight.clamp(0.0, 1.0),
                source_tag: row.source,
            };

            // A surface form must not map to two categories for one role;
            // keep the heavier entry until the override table settles it.
            if let Some(existing) = map.get(&key) {
                let existing: &DictionaryEntry = existing;
                if existing.category != category {
                    tracing::warn!(
                        "Dictionary conflict in {} for '{}' ({:?}): {} ({}) vs {} ({})",
                        file,
                        key,
                        existing.role,
                        existing.category,
                        existing.source_tag,
                        category,
                        entry.source_tag
                    );
                    if existing.confidence_weight >= entry.confidence_weight {
                        continue;
                    }
                }
            }
            map.insert(key, entry);
        }

        Ok(map)
    }

    fn load_compounds() -> Result<Vec<CompoundPattern>, DictionaryError> {
        let file = "compound_surnames.csv";
        let text = DictionaryAssets::text(file).ok_or(DictionaryError::MissingAsset(file))?;
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let mut patterns = Vec::new();

        for row in reader.deserialize::<CompoundRow>() {
            let row = row.map_err(|source| DictionaryError::Parse { file, source })?;
            let tokens: Vec<String> =
                row.pattern.split_whitespace().map(|t| t.to_lowercase()).collect();
            if tokens.len() < 2 {
                tracing::warn!("Skipping compound pattern with fewer than two tokens: '{}'", row.pattern);
                continue;
            }
            let category = Category::parse_category(&row.category);
            if category == Category::Unknown {
                continue;
            }
            patterns.push(CompoundPattern {
                tokens,
                category,
                confidence_weight: row.weight.clamp(0.0, 1.0),
            });
        }

        Ok(patterns)
    }

    fn apply_overrides(&mut self) -> Result<(), DictionaryError> {
        let file = "overrides.csv";
        let text = DictionaryAssets::text(file).ok_or(DictionaryError::MissingAsset(file))?;
        let mut reader = csv::Reader::from_reader(text.as_bytes());

        for row in reader.deserialize::<OverrideRow>() {
            let row = row.map_err(|source| DictionaryError::Parse { file, source })?;
            let key = row.name.trim().to_lowercase();
            let category = Category::parse_category(&row.category);
            if category == Category::Unknown {
                continue;
            }

            let map = match row.role.as_str() {
                "given" => &mut self.given,
                "surname" => &mut self.surnames,
                other => {
                    tracing::warn!("Skipping override with unknown role '{}'", other);
                    continue;
                },
            };
            if let Some(entry) = map.get_mut(&key) {
                entry.category = category;
            }
        }

        Ok(())
    }
}
