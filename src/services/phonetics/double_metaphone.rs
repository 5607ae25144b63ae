//! Double Metaphone.
//!
//! Produces a primary code and, where an ambiguous cluster admits a second
//! pronunciation, an alternate code. The alternate is empty when nothing
//! diverged; callers must tolerate that.

/// Encoded pair for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubleMetaphone {
    pub primary: String,
    pub alternate: String,
}

/// Encode a single upper-cased ASCII token.
pub fn encode(token: &str) -> DoubleMetaphone {
    let mut word: Vec<char> = token.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    if word.is_empty() {
        return DoubleMetaphone { primary: String::new(), alternate: String::new() };
    }
    for c in word.iter_mut() {
        *c = c.to_ascii_uppercase();
    }

    let n = word.len();
    let mut primary = String::with_capacity(n);
    let mut alternate = String::with_capacity(n);
    let mut diverged = false;

    // Push to both buffers; `alt` of None means the codes agree.
    let mut emit = |p: &str, alt: Option<&str>| {
        primary.push_str(p);
        match alt {
            Some(a) => {
                alternate.push_str(a);
                diverged = true;
            },
            None => alternate.push_str(p),
        }
    };

    let mut i = 0;
    while i < n {
        let c = word[i];
        let prev = if i > 0 { Some(word[i - 1]) } else { None };
        let next = word.get(i + 1).copied();
        let next2 = word.get(i + 2).copied();

        if Some(c) == prev && c != 'C' {
            i += 1;
            continue;
        }

        match c {
            'A' | 'E' | 'I' | 'O' | 'U' => {
                // All initial vowels normalise to A
                if i == 0 {
                    emit("A", None);
                }
            },
            'B' => {
                if !(i == n - 1 && prev == Some('M')) {
                    emit("P", None);
                }
            },
            'C' => {
                if next == Some('H') {
                    if prev == Some('S') {
                        emit("K", None);
                    } else {
                        // "church" vs "chemist"
                        emit("X", Some("K"));
                    }
                    i += 1;
                } else if matches!(next, Some('I') | Some('E') | Some('Y')) {
                    emit("S", None);
                } else {
                    emit("K", None);
                }
            },
            'D' => {
                if next == Some('G') && matches!(next2, Some('E') | Some('I') | Some('Y')) {
                    emit("J", None);
                    i += 1;
                } else {
                    emit("T", None);
                }
            },
            'F' | 'L' | 'N' | 'R' => emit(&c.to_string(), None),
            'M' => emit("M", None),
            'G' => {
                if next == Some('H') {
                    if matches!(next2, Some('A') | Some('E') | Some('I') | Some('O') | Some('U')) {
                        emit("K", None);
                    }
                    i += 1;
                } else if next == Some('N') {
                    // silent G
                } else if matches!(next, Some('I') | Some('E') | Some('Y')) {
                    // "gem" vs hard G as in "Gertruida"
                    emit("J", Some("K"));
                } else {
                    emit("K", None);
                }
            },
            'H' => {
                let prev_vowel =
                    prev.map(|p| matches!(p, 'A' | 'E' | 'I' | 'O' | 'U')).unwrap_or(false);
                let next_vowel =
                    next.map(|p| matches!(p, 'A' | 'E' | 'I' | 'O' | 'U')).unwrap_or(false);
                if !(prev_vowel && !next_vowel) {
                    emit("H", None);
                }
            },
            'J' => {
                if i == 0 {
                    // "Jacob" vs the Afrikaans/Spanish Y/H sound
                    emit("J", Some("H"));
                } else {
                    emit("J", None);
                }
            },
            'K' => {
                if prev != Some('C') {
                    emit("K", None);
                }
            },
            'P' => {
                if next == Some('H') {
                    emit("F", None);
                    i += 1;
                } else {
                    emit("P", None);
                }
            },
            'Q' => emit("K", None),
            'S' => {
                if next == Some('H') {
                    emit("X", None);
                    i += 1;
                } else if next == Some('I') && matches!(next2, Some('O') | Some('A')) {
                    emit("X", Some("S"));
                } else {
                    emit("S", None);
                }
            },
            'T' => {
                if next == Some('H') {
                    // "Thabo" is aspirated T at least as often as theta
                    emit("0", Some("T"));
                    i += 1;
                } else if next == Some('I') && matches!(next2, Some('O') | Some('A')) {
                    emit("X", None);
                } else {
                    emit("T", None);
                }
            },
            'V' => emit("F", None),
            'W' | 'Y' => {
                if next.map(|p| matches!(p, 'A' | 'E' | 'I' | 'O' | 'U')).unwrap_or(false) {
                    emit(&c.to_string(), None);
                }
            },
            'X' => {
                if i == 0 {
                    // Nguni click consonant spelling; "Xhosa", "Xolani"
                    emit("S", Some("K"));
                } else {
                    emit("KS", None);
                }
            },
            'Z' => emit("S", None),
            _ => {},
        }

        i += 1;
    }

    if !diverged {
        alternate.clear();
    }

    DoubleMetaphone { primary, alternate }
}
