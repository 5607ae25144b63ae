//! American Soundex.

/// Encode a single upper-cased ASCII token. Returns the classic
/// letter-plus-three-digits code, or an empty string for tokens without a
/// leading letter.
pub fn encode(token: &str) -> String {
    let letters: Vec<char> = token.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    let Some(&first) = letters.first() else {
        return String::new();
    };

    let mut code = String::with_capacity(4);
    code.push(first.to_ascii_uppercase());

    let mut last_digit = digit_for(first);
    for &c in &letters[1..] {
        match digit_for(c) {
            Some(d) => {
                if Some(d) != last_digit {
                    code.push(d);
                    if code.len() == 4 {
                        break;
                    }
                }
                last_digit = Some(d);
            },
            None => {
                // H and W are transparent: a repeated code across them
                // still collapses. Vowels reset the run.
                if !matches!(c.to_ascii_uppercase(), 'H' | 'W') {
                    last_digit = None;
                }
            },
        }
    }

    while code.len() < 4 {
        code.push('0');
    }
    code
}

fn digit_for(c: char) -> Option<char> {
    match c.to_ascii_uppercase() {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}
