//! Learning store repository.
//!
//! Single writer per process, many concurrent readers. The write
//! serialiser is an explicit mutex held across each learning transaction;
//! once `record_llm_answer` returns, every subsequent lookup observes the
//! new answer and its derived patterns.

use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::models::{Category, Classification, Method};
use crate::services::normalizer::NormalisedName;
use crate::services::phonetics::{
    self, CODEC_DOUBLE_METAPHONE_ALTERNATE, CODEC_DOUBLE_METAPHONE_PRIMARY, CODEC_SOUNDEX,
};

use super::models::*;

/// Confidence assigned to freshly extracted affix patterns.
const AFFIX_CONFIDENCE: f64 = 0.85;
/// Sample member tokens retained per phonetic family.
const MAX_REPRESENTATIVES: usize = 5;

pub struct LearningStore {
    pool: SqlitePool,
    /// Process-wide write serialiser. Explicit, not ambient state.
    write_lock: Mutex<()>,
    deactivation_floor: f64,
    deactivation_min_applications: i64,
}

impl LearningStore {
    pub fn new(pool: SqlitePool, deactivation_floor: f64, deactivation_min_applications: i64) -> Self {
        Self { pool, write_lock: Mutex::new(()), deactivation_floor, deactivation_min_applications }
    }

    /// Pool access for tests.
    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Exact full-name cache hit. O(1) on the primary key.
    pub async fn lookup_exact(
        &self,
        normalised_name: &str,
    ) -> Result<Option<Classification>, LearningError> {
        let row = sqlx::query_as::<_, FullNameCacheRow>(
            "SELECT * FROM full_name_cache WHERE normalised_name = ?",
        )
        .bind(normalised_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let mut classification = Classification::resolved(
                row.normalised_name.clone(),
                row.normalised_name,
                Category::parse_category(&row.category),
                row.confidence,
                Method::Cache,
            );
            classification.provider = row.provider_tag;
            classification
        }))
    }

    /// Members of one phonetic family, across categories.
    pub async fn lookup_phonetic_family(
        &self,
        codec_id: &str,
        code: &str,
    ) -> Result<Vec<PhoneticFamilyRow>, LearningError> {
        sqlx::query_as::<_, PhoneticFamilyRow>(
            "SELECT * FROM phonetic_families WHERE codec_id = ? AND code = ? ORDER BY member_count DESC",
        )
        .bind(codec_id)
        .bind(code)
        .fetch_all(&self.pool)
        .await
        .map_err(LearningError::from)
    }

    /// Match the name's tokens against learned affix patterns, longest
    /// affixes first. Only active patterns are considered.
    pub async fn match_learned_affix(
        &self,
        normalised_name: &str,
    ) -> Result<Option<LearnedMatch>, LearningError> {
        let tokens: Vec<&str> =
            normalised_name.split_whitespace().filter(|t| t.len() >= 3).collect();
        if tokens.is_empty() {
            return Ok(None);
        }

        // (kind, value) probes in rank order: 3-char affixes, then 2-char
        let mut probes: Vec<(PatternKind, String)> = Vec::new();
        for token in &tokens {
            for (kind, value) in affixes_of(token) {
                if matches!(kind, PatternKind::AffixPrefix3 | PatternKind::AffixSuffix3) {
                    probes.push((kind, value));
                }
            }
        }
        for token in &tokens {
            for (kind, value) in affixes_of(token) {
                if matches!(kind, PatternKind::AffixPrefix2 | PatternKind::AffixSuffix2) {
                    probes.push((kind, value));
                }
            }
        }

        let mut best: Option<(u8, LearnedPattern)> = None;
        for (kind, value) in probes {
            let rank = kind.rank();
            if let Some((best_rank, _)) = &best
                && *best_rank < rank
            {
                // Later probes can only be lower-ranked
                break;
            }

            let row = sqlx::query_as::<_, LearnedPattern>(
                r#"SELECT * FROM learned_patterns
                   WHERE kind = ? AND value = ? AND active = TRUE
                   ORDER BY confidence DESC, evidence_count DESC
                   LIMIT 1"#,
            )
            .bind(kind.as_str())
            .bind(&value)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                let better = match &best {
                    None => true,
                    Some((best_rank, best_row)) => {
                        rank < *best_rank
                            || (rank == *best_rank
                                && (row.confidence > best_row.confidence
                                    || (row.confidence == best_row.confidence
                                        && row.evidence_count > best_row.evidence_count)))
                    },
                };
                if better {
                    best = Some((rank, row));
                }
            }
        }

        Ok(best.map(|(_, row)| LearnedMatch {
            pattern_id: row.id,
            kind: row.kind_enum().unwrap_or(PatternKind::AffixPrefix2),
            value: row.value.clone(),
            category: row.category_enum(),
            confidence: row.confidence,
        }))
    }

    /// All stored LLM answers for a name, newest first.
    pub async fn llm_answers(
        &self,
        normalised_name: &str,
    ) -> Result<Vec<LlmAnswerRecord>, LearningError> {
        sqlx::query_as::<_, LlmAnswerRecord>(
            "SELECT * FROM llm_classifications WHERE normalised_name = ? ORDER BY created_at DESC",
        )
        .bind(normalised_name)
        .fetch_all(&self.pool)
        .await
        .map_err(LearningError::from)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Persist an LLM answer and everything derived from it.
    ///
    /// The answer record, the full-name cache entry, the affix patterns and
    /// the phonetic family updates land in one transaction; the call does
    /// not return until the commit is durable, so the next lookup in the
    /// same batch observes all of it.
    pub async fn record_llm_answer(
        &self,
        name: &NormalisedName,
        classification: &Classification,
        job_id: Option<&str>,
    ) -> Result<(), LearningError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let provider = classification.provider.clone().unwrap_or_else(|| "unknown".to_string());

        sqlx::query(
            r#"INSERT INTO llm_classifications (normalised_name, category, confidence, provider_tag)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(&name.normalised)
        .bind(classification.category.as_str())
        .bind(classification.confidence)
        .bind(&provider)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO full_name_cache (normalised_name, category, confidence, provider_tag)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(normalised_name) DO UPDATE SET
               category = excluded.category,
               confidence = excluded.confidence,
               provider_tag = excluded.provider_tag"#,
        )
        .bind(&name.normalised)
        .bind(classification.category.as_str())
        .bind(classification.confidence)
        .bind(&provider)
        .execute(&mut *tx)
        .await?;

        self.extract_and_store_patterns(&mut tx, name, classification, job_id).await?;

        tx.commit().await?;

        tracing::debug!(
            "Learned '{}' -> {} ({:.2}) from {}",
            name.normalised,
            classification.category,
            classification.confidence,
            provider
        );
        Ok(())
    }

    /// Derive and stage patterns inside the caller's transaction.
    async fn extract_and_store_patterns(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        name: &NormalisedName,
        classification: &Classification,
        job_id: Option<&str>,
    ) -> Result<(), LearningError> {
        let category = classification.category.as_str();

        for part in name.significant_parts() {
            let token = part.folded.as_str();

            for (kind, value) in affixes_of(token) {
                upsert_pattern(tx, kind, &value, category, AFFIX_CONFIDENCE, job_id).await?;
            }

            let codes = phonetics::encode(token);
            for (codec_id, code) in codes.entries() {
                upsert_family(tx, codec_id, code, category, token).await?;

                // Families over the affix-bearing codecs also exist as
                // rankable patterns
                let kind = match codec_id {
                    CODEC_SOUNDEX => Some(PatternKind::PhoneticFamilySoundex),
                    CODEC_DOUBLE_METAPHONE_PRIMARY | CODEC_DOUBLE_METAPHONE_ALTERNATE => {
                        Some(PatternKind::PhoneticFamilyDoubleMetaphone)
                    },
                    _ => None,
                };
                if let Some(kind) = kind {
                    upsert_pattern(tx, kind, code, category, classification.confidence, job_id)
                        .await?;
                }
            }
        }

        upsert_pattern(
            tx,
            PatternKind::FullName,
            &name.normalised,
            category,
            classification.confidence,
            job_id,
        )
        .await?;

        Ok(())
    }

    /// Record an application of a learned pattern and apply the
    /// deactivation policy when its measured accuracy sinks too low.
    pub async fn record_application(
        &self,
        pattern_id: i64,
        was_correct: Option<bool>,
    ) -> Result<(), LearningError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let (correct_delta, judged) = match was_correct {
            Some(true) => (1i64, true),
            Some(false) => (0, true),
            None => (0, false),
        };

        sqlx::query(
            r#"UPDATE learned_patterns SET
               application_count = application_count + 1,
               correct_count = correct_count + ?,
               last_applied_at = CURRENT_TIMESTAMP
               WHERE id = ?"#,
        )
        .bind(correct_delta)
        .bind(pattern_id)
        .execute(&mut *tx)
        .await?;

        if judged {
            let row = sqlx::query_as::<_, LearnedPattern>(
                "SELECT * FROM learned_patterns WHERE id = ?",
            )
            .bind(pattern_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row
                && row.active
                && row.application_count >= self.deactivation_min_applications
                && row.accuracy().unwrap_or(1.0) < self.deactivation_floor
            {
                sqlx::query("UPDATE learned_patterns SET active = FALSE WHERE id = ?")
                    .bind(pattern_id)
                    .execute(&mut *tx)
                    .await?;
                tracing::info!(
                    "Deactivated learned pattern {} ({} '{}'): accuracy {:.2} below floor {:.2}",
                    pattern_id,
                    row.kind,
                    row.value,
                    row.accuracy().unwrap_or(0.0),
                    self.deactivation_floor
                );
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Affix patterns for one folded token. Affixes must be proper substrings.
fn affixes_of(token: &str) -> Vec<(PatternKind, String)> {
    let chars: Vec<char> = token.chars().collect();
    let mut out = Vec::with_capacity(4);
    if chars.len() > 2 {
        out.push((PatternKind::AffixPrefix2, chars[..2].iter().collect()));
        out.push((PatternKind::AffixSuffix2, chars[chars.len() - 2..].iter().collect()));
    }
    if chars.len() > 3 {
        out.push((PatternKind::AffixPrefix3, chars[..3].iter().collect()));
        out.push((PatternKind::AffixSuffix3, chars[chars.len() - 3..].iter().collect()));
    }
    out
}

async fn upsert_pattern(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    kind: PatternKind,
    value: &str,
    category: &str,
    confidence: f64,
    job_id: Option<&str>,
) -> Result<(), LearningError> {
    sqlx::query(
        r#"INSERT INTO learned_patterns (kind, value, category, confidence, created_from_job)
           VALUES (?, ?, ?, ?, ?)
           ON CONFLICT(kind, value, category) DO UPDATE SET
           evidence_count = evidence_count + 1,
           confidence = MAX(confidence, excluded.confidence)"#,
    )
    .bind(kind.as_str())
    .bind(value)
    .bind(category)
    .bind(confidence)
    .bind(job_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_family(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    codec_id: &str,
    code: &str,
    category: &str,
    token: &str,
) -> Result<(), LearningError> {
    let existing = sqlx::query_as::<_, PhoneticFamilyRow>(
        "SELECT * FROM phonetic_families WHERE codec_id = ? AND code = ? AND category = ?",
    )
    .bind(codec_id)
    .bind(code)
    .bind(category)
    .fetch_optional(&mut **tx)
    .await?;

    match existing {
        Some(row) => {
            let mut reps = row.representative_tokens();
            if !reps.iter().any(|r| r == token) && reps.len() < MAX_REPRESENTATIVES {
                reps.push(token.to_string());
            }
            sqlx::query(
                r#"UPDATE phonetic_families SET
                   member_count = member_count + 1,
                   representatives = ?,
                   updated_at = CURRENT_TIMESTAMP
                   WHERE id = ?"#,
            )
            .bind(serde_json::to_string(&reps)?)
            .bind(row.id)
            .execute(&mut **tx)
            .await?;
        },
        None => {
            sqlx::query(
                r#"INSERT INTO phonetic_families (codec_id, code, category, member_count, representatives)
                   VALUES (?, ?, ?, 1, ?)"#,
            )
            .bind(codec_id)
            .bind(code)
            .bind(category)
            .bind(serde_json::to_string(&[token])?)
            .execute(&mut **tx)
            .await?;
        },
    }
    Ok(())
}
