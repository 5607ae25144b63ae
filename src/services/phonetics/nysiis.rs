//! NYSIIS (New York State Identification and Intelligence System).

fn is_vowel(c: char) -> bool {
    matches!(c, 'A' | 'E' | 'I' | 'O' | 'U')
}

/// Encode a single upper-cased ASCII token. Keys are truncated to six
/// characters as in the original algorithm.
pub fn encode(token: &str) -> String {
    let mut word: Vec<char> = token
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if word.is_empty() {
        return String::new();
    }

    // Leading transcriptions
    if starts_with(&word, "MAC") {
        word.splice(0..3, "MCC".chars());
    } else if starts_with(&word, "KN") {
        word.remove(0);
    } else if word[0] == 'K' {
        word[0] = 'C';
    } else if starts_with(&word, "PH") || starts_with(&word, "PF") {
        word.splice(0..2, "FF".chars());
    } else if starts_with(&word, "SCH") {
        word.splice(0..3, "SSS".chars());
    }

    // Trailing transcriptions
    let n = word.len();
    if n >= 2 {
        let tail: String = word[n - 2..].iter().collect();
        match tail.as_str() {
            "EE" | "IE" => {
                word.truncate(n - 2);
                word.push('Y');
            },
            "DT" | "RT" | "RD" | "NT" | "ND" => {
                word.truncate(n - 2);
                word.push('D');
            },
            _ => {},
        }
    }

    let mut key = String::new();
    key.push(word[0]);

    let mut i = 1;
    while i < word.len() {
        let c = word[i];
        let prev = word[i - 1];
        let next = word.get(i + 1).copied();

        let replacement: String = if c == 'E' && next == Some('V') {
            i += 1;
            "AF".to_string()
        } else if is_vowel(c) {
            "A".to_string()
        } else if c == 'Q' {
            "G".to_string()
        } else if c == 'Z' {
            "S".to_string()
        } else if c == 'M' {
            "N".to_string()
        } else if c == 'K' {
            if next == Some('N') {
                "N".to_string()
            } else {
                "C".to_string()
            }
        } else if c == 'S' && next == Some('C') && word.get(i + 2) == Some(&'H') {
            i += 2;
            "SSS".to_string()
        } else if c == 'P' && next == Some('H') {
            i += 1;
            "FF".to_string()
        } else if c == 'H' && (!is_vowel(prev) || !next.map(is_vowel).unwrap_or(false)) {
            prev.to_string()
        } else if c == 'W' && is_vowel(prev) {
            prev.to_string()
        } else {
            c.to_string()
        };

        for rc in replacement.chars() {
            if key.chars().last() != Some(rc) {
                key.push(rc);
            }
        }

        i += 1;
    }

    // Trailing cleanup: S, AY, A
    if key.len() > 1 && key.ends_with('S') {
        key.pop();
    }
    if key.len() > 2 && key.ends_with("AY") {
        key.pop();
        key.pop();
        key.push('Y');
    }
    if key.len() > 1 && key.ends_with('A') {
        key.pop();
    }

    key.truncate(6);
    key
}

fn starts_with(word: &[char], prefix: &str) -> bool {
    word.len() >= prefix.len() && word.iter().zip(prefix.chars()).all(|(&a, b)| a == b)
}
