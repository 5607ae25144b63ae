//! Name normalisation.
//!
//! Turns a raw director-name string into an ordered, role-tagged token
//! list. Comparison happens on an upper-cased, diacritic-folded form; the
//! original spelling is retained for output.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::models::ErrorKind;

/// Surname particles. Ignored for dictionary lookups but retained so
/// compound surnames like "van der Merwe" stay recognisable.
static PARTICLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["van", "der", "de", "du", "le", "von", "ter", "van't"].into_iter().collect()
});

/// Everything that cannot be part of a name token. Letters, whitespace,
/// hyphens, apostrophes and initial dots survive; digits and stray
/// punctuation from upstream spreadsheets do not.
static NON_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\s'.\-]").expect("valid character class"));

/// Role of one token inside a normalised name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRole {
    Given,
    Surname,
    Particle,
    Initial,
    UnknownRole,
}

/// One token of a normalised name.
#[derive(Debug, Clone)]
pub struct NamePart {
    /// Original spelling, whitespace-trimmed.
    pub original: String,
    /// Upper-cased, diacritic-folded comparison form.
    pub folded: String,
    pub role: TokenRole,
}

impl NamePart {
    pub fn is_significant(&self) -> bool {
        matches!(self.role, TokenRole::Given | TokenRole::Surname)
    }
}

/// A fully normalised name.
#[derive(Debug, Clone)]
pub struct NormalisedName {
    /// Original input with whitespace collapsed.
    pub original: String,
    /// Upper-cased folded form, tokens joined by single spaces. This is the
    /// key used for caching and learned-pattern lookups.
    pub normalised: String,
    pub parts: Vec<NamePart>,
}

impl NormalisedName {
    pub fn significant_parts(&self) -> impl Iterator<Item = &NamePart> {
        self.parts.iter().filter(|p| p.is_significant())
    }

    /// The surname token: the single part tagged `Surname`.
    pub fn surname_part(&self) -> Option<&NamePart> {
        self.parts.iter().find(|p| p.role == TokenRole::Surname)
    }

    /// Given-name tokens in input order.
    pub fn given_parts(&self) -> impl Iterator<Item = &NamePart> {
        self.parts.iter().filter(|p| p.role == TokenRole::Given)
    }

    /// Folded tokens in input order, all roles included.
    pub fn folded_tokens(&self) -> Vec<&str> {
        self.parts.iter().map(|p| p.folded.as_str()).collect()
    }
}

/// Normalisation failures. These are per-row input errors, never fatal to
/// a job.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormaliseError {
    #[error("name contains no significant tokens: '{0}'")]
    EmptyName(String),

    #[error("name has too many tokens to classify reliably: '{0}'")]
    NameTooComplex(String),
}

impl NormaliseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyName(_) => ErrorKind::EmptyName,
            Self::NameTooComplex(_) => ErrorKind::NameTooComplex,
        }
    }
}

/// Maximum tokens (all roles) before a name is considered too complex.
const MAX_TOTAL_TOKENS: usize = 6;
/// Maximum significant tokens without a compound-surname particle pattern.
const MAX_SIGNIFICANT_TOKENS: usize = 4;

/// Normalise a raw name string.
pub fn normalise(raw: &str) -> Result<NormalisedName, NormaliseError> {
    let scrubbed = NON_NAME_CHARS.replace_all(raw, "");
    let cleaned = scrubbed.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut tokens: Vec<String> = Vec::new();
    for chunk in cleaned.split_whitespace() {
        // Hyphenated tokens split into their components
        for sub in chunk.split('-') {
            if !sub.is_empty() {
                tokens.push(sub.to_string());
            }
        }
    }

    let mut parts: Vec<NamePart> = tokens
        .into_iter()
        .map(|original| {
            let folded = fold_for_comparison(&original);
            let role = initial_role(&original, &folded);
            NamePart { original, folded, role }
        })
        .collect();

    // The last provisional-significant token is the surname; any compound
    // match may later re-span it, but role tagging starts here.
    if let Some(last) = parts.iter_mut().rev().find(|p| p.role == TokenRole::Given) {
        last.role = TokenRole::Surname;
    }

    let significant = parts.iter().filter(|p| p.is_significant()).count();
    if significant == 0 {
        return Err(NormaliseError::EmptyName(cleaned));
    }

    let total = parts.len();
    let over_budget = total > MAX_TOTAL_TOKENS || significant > MAX_SIGNIFICANT_TOKENS;
    if over_budget && !(total <= MAX_TOTAL_TOKENS && has_compound_particle_pattern(&parts)) {
        return Err(NormaliseError::NameTooComplex(cleaned));
    }

    let normalised = parts.iter().map(|p| p.folded.as_str()).collect::<Vec<_>>().join(" ");

    Ok(NormalisedName { original: cleaned, normalised, parts })
}

/// A particle followed (eventually) by a significant token, i.e. the shape
/// of "… van der X" / "… du X" / "… le X" / "… de X".
fn has_compound_particle_pattern(parts: &[NamePart]) -> bool {
    let mut seen_particle = false;
    for part in parts {
        match part.role {
            TokenRole::Particle => seen_particle = true,
            TokenRole::Given | TokenRole::Surname if seen_particle => return true,
            _ => {},
        }
    }
    false
}

fn initial_role(original: &str, folded: &str) -> TokenRole {
    let lowered = folded.to_ascii_lowercase();
    if PARTICLES.contains(lowered.as_str()) {
        return TokenRole::Particle;
    }

    let letters = folded.chars().filter(|c| c.is_alphabetic()).count();
    if letters == 1 || (original.contains('.') && original.chars().count() <= 2) {
        return TokenRole::Initial;
    }

    if letters >= 3 {
        // Provisionally a given name; the surname is re-tagged afterwards
        TokenRole::Given
    } else {
        TokenRole::UnknownRole
    }
}

/// Upper-case and fold diacritics to plain ASCII letters; strip dots.
pub fn fold_for_comparison(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        match c {
            '.' => {},
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => out.push('A'),
            'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => out.push('E'),
            'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => out.push('I'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => out.push('O'),
            'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => out.push('U'),
            'ý' | 'ÿ' | 'Ý' => out.push('Y'),
            'ñ' | 'Ñ' => out.push('N'),
            'ç' | 'Ç' => out.push('C'),
            'ß' => out.push_str("SS"),
            _ => out.extend(c.to_uppercase()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_two_token_name() {
        let name = normalise("Thabo Mthembu").unwrap();
        assert_eq!(name.normalised, "THABO MTHEMBU");
        assert_eq!(name.parts.len(), 2);
        assert_eq!(name.parts[0].role, TokenRole::Given);
        assert_eq!(name.parts[1].role, TokenRole::Surname);
    }

    #[test]
    fn collapses_whitespace_and_keeps_original() {
        let name = normalise("  Pieter   van  der Merwe ").unwrap();
        assert_eq!(name.original, "Pieter van der Merwe");
        assert_eq!(name.normalised, "PIETER VAN DER MERWE");
    }

    #[test]
    fn particles_are_tagged_not_significant() {
        let name = normalise("Pieter van der Merwe").unwrap();
        let roles: Vec<_> = name.parts.iter().map(|p| p.role).collect();
        assert_eq!(
            roles,
            vec![TokenRole::Given, TokenRole::Particle, TokenRole::Particle, TokenRole::Surname]
        );
        assert_eq!(name.significant_parts().count(), 2);
    }

    #[test]
    fn initials_are_detected() {
        let name = normalise("J. P. Botha").unwrap();
        assert_eq!(name.parts[0].role, TokenRole::Initial);
        assert_eq!(name.parts[1].role, TokenRole::Initial);
        assert_eq!(name.parts[2].role, TokenRole::Surname);
    }

    #[test]
    fn hyphenated_surnames_split() {
        let name = normalise("Anna Smith-Jones").unwrap();
        assert_eq!(name.parts.len(), 3);
        assert_eq!(name.normalised, "ANNA SMITH JONES");
    }

    #[test]
    fn particles_only_is_empty() {
        let err = normalise("van der").unwrap_err();
        assert_eq!(err.kind(), crate::models::ErrorKind::EmptyName);
    }

    #[test]
    fn blank_input_is_empty() {
        let err = normalise("   ").unwrap_err();
        assert_eq!(err.kind(), crate::models::ErrorKind::EmptyName);
    }

    #[test]
    fn six_token_compound_name_accepted() {
        let name = normalise("ANDREAS PETRUS VAN DER MERWE JUNIOR").unwrap();
        assert_eq!(name.parts.len(), 6);
        assert_eq!(name.significant_parts().count(), 4);
    }

    #[test]
    fn seven_token_name_rejected() {
        let err = normalise("ONE TWO THREE FOUR FIVE SIX SEVEN").unwrap_err();
        assert_eq!(err.kind(), crate::models::ErrorKind::NameTooComplex);
    }

    #[test]
    fn five_plain_significant_tokens_rejected() {
        let err = normalise("ALPHA BRAVO CHARLIE DELTA ECHO").unwrap_err();
        assert_eq!(err.kind(), crate::models::ErrorKind::NameTooComplex);
    }

    #[test]
    fn digits_and_stray_punctuation_are_scrubbed() {
        let name = normalise("Thabo Mthembu (2)").unwrap();
        assert_eq!(name.normalised, "THABO MTHEMBU");
        let name = normalise("Sipho* Dlamini!").unwrap();
        assert_eq!(name.normalised, "SIPHO DLAMINI");
    }

    #[test]
    fn diacritics_fold_to_ascii() {
        assert_eq!(fold_for_comparison("Müller"), "MULLER");
        assert_eq!(fold_for_comparison("José"), "JOSE");
        assert_eq!(fold_for_comparison("J."), "J");
    }
}
