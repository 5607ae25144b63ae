//! Phonetic codec set.
//!
//! Five codecs over single tokens: Soundex, Metaphone, Double-Metaphone
//! (primary and alternate) and NYSIIS, plus Jaro-Winkler string similarity.
//! All codecs operate on the upper-cased, diacritic-folded form of a token.

mod double_metaphone;
mod metaphone;
mod nysiis;
mod soundex;

pub use double_metaphone::DoubleMetaphone;

use crate::services::normalizer::fold_for_comparison;

/// Stable codec identifiers, used as keys in the phonetic family index.
pub const CODEC_SOUNDEX: &str = "soundex";
pub const CODEC_METAPHONE: &str = "metaphone";
pub const CODEC_DOUBLE_METAPHONE_PRIMARY: &str = "double_metaphone_primary";
pub const CODEC_DOUBLE_METAPHONE_ALTERNATE: &str = "double_metaphone_alternate";
pub const CODEC_NYSIIS: &str = "nysiis";

pub const ALL_CODECS: [&str; 5] = [
    CODEC_SOUNDEX,
    CODEC_METAPHONE,
    CODEC_DOUBLE_METAPHONE_PRIMARY,
    CODEC_DOUBLE_METAPHONE_ALTERNATE,
    CODEC_NYSIIS,
];

/// The full codec output for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneticCodes {
    pub soundex: String,
    pub metaphone: String,
    pub double_metaphone_primary: String,
    /// May be empty; callers must tolerate empty codes.
    pub double_metaphone_alternate: String,
    pub nysiis: String,
}

impl PhoneticCodes {
    /// Non-empty `(codec_id, code)` pairs for index writes and lookups.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::with_capacity(5);
        for (codec, code) in [
            (CODEC_SOUNDEX, self.soundex.as_str()),
            (CODEC_METAPHONE, self.metaphone.as_str()),
            (CODEC_DOUBLE_METAPHONE_PRIMARY, self.double_metaphone_primary.as_str()),
            (CODEC_DOUBLE_METAPHONE_ALTERNATE, self.double_metaphone_alternate.as_str()),
            (CODEC_NYSIIS, self.nysiis.as_str()),
        ] {
            if !code.is_empty() {
                out.push((codec, code));
            }
        }
        out
    }

    /// Number of codecs on which two tokens agree (empty codes never agree).
    pub fn agreement_count(&self, other: &PhoneticCodes) -> usize {
        let pairs = [
            (&self.soundex, &other.soundex),
            (&self.metaphone, &other.metaphone),
            (&self.double_metaphone_primary, &other.double_metaphone_primary),
            (&self.double_metaphone_alternate, &other.double_metaphone_alternate),
            (&self.nysiis, &other.nysiis),
        ];
        pairs.iter().filter(|(a, b)| !a.is_empty() && a == b).count()
    }
}

/// Encode a single token with every codec.
pub fn encode(token: &str) -> PhoneticCodes {
    let folded = fold_for_comparison(token);
    let dm = double_metaphone::encode(&folded);
    PhoneticCodes {
        soundex: soundex::encode(&folded),
        metaphone: metaphone::encode(&folded),
        double_metaphone_primary: dm.primary,
        double_metaphone_alternate: dm.alternate,
        nysiis: nysiis::encode(&folded),
    }
}

/// Jaro-Winkler similarity in [0, 1] over the folded forms.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&fold_for_comparison(a), &fold_for_comparison(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_covers_all_codecs() {
        let codes = encode("Mthembu");
        assert_eq!(codes.soundex, "M351");
        assert_eq!(codes.metaphone, "M0MB");
        assert_eq!(codes.nysiis, "MTANB");
        assert!(!codes.double_metaphone_primary.is_empty());
    }

    #[test]
    fn entries_skip_empty_alternate() {
        let codes = encode("Pieter");
        assert_eq!(codes.double_metaphone_alternate, "");
        assert_eq!(codes.entries().len(), 4);
    }

    #[test]
    fn agreement_counts_shared_codes() {
        let a = encode("Naidoo");
        let b = encode("Naidu");
        assert!(a.agreement_count(&b) >= 1);
        let c = encode("Botha");
        assert!(a.agreement_count(&c) <= 1);
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let s1 = similarity("Pillay", "Pillai");
        let s2 = similarity("Pillai", "Pillay");
        assert!((s1 - s2).abs() < f64::EPSILON);
        assert!(s1 > 0.85);
        assert!(similarity("Pillay", "Pillay") > 0.999);
        assert!(similarity("Pillay", "Botha") < 0.7);
    }

    #[test]
    fn diacritics_fold_before_encoding() {
        assert_eq!(encode("Müller"), encode("Muller"));
    }
}
