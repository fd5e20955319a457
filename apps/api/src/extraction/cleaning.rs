//! Text normalization applied to every successful extraction, plus a cheap
//! quality heuristic for flagging garbage output.
//!
//! `clean_text` is idempotent: cleaning already-clean text returns it unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z])([A-Z])").expect("valid regex"));
static LETTER_DIGIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z])([0-9])").expect("valid regex"));
static DIGIT_LETTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9])([A-Za-z])").expect("valid regex"));

/// Normalizes raw extractor output:
/// 1. every line-ending variant and whitespace run becomes one space,
/// 2. common OCR glyph confusions inside words are repaired,
/// 3. camelCase runs get a word boundary (`firstName` -> `first Name`),
/// 4. digit runs and letter runs get a boundary (`2019Present` -> `2019 Present`).
///
/// E-mail addresses and URLs are left intact after step 1.
pub fn clean_text(raw: &str) -> String {
    let collapsed = WHITESPACE.replace_all(raw, " ");
    collapsed
        .trim()
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(clean_token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_token(token: &str) -> String {
    if is_protected(token) {
        return token.to_string();
    }
    let repaired = repair_ocr_confusions(token);
    let split = CAMEL_BOUNDARY.replace_all(&repaired, "$1 $2");
    let split = LETTER_DIGIT.replace_all(&split, "$1 $2");
    DIGIT_LETTER.replace_all(&split, "$1 $2").into_owned()
}

fn is_protected(token: &str) -> bool {
    token.contains('@') || token.contains("://") || token.to_ascii_lowercase().starts_with("www.")
}

/// Replaces glyphs that OCR commonly emits in place of letters, but only when
/// both neighbours in the original token are letters.
fn repair_ocr_confusions(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let prev = i.checked_sub(1).and_then(|j| chars.get(j));
            let next = chars.get(i + 1);
            let inside_word = matches!((prev, next), (Some(p), Some(n)) if p.is_ascii_alphabetic() && n.is_ascii_alphabetic());
            if !inside_word {
                return c;
            }
            match c {
                '|' | '¦' => 'l',
                '0' => 'o',
                '1' => 'l',
                '5' => 's',
                '$' => 's',
                '€' => 'e',
                _ => c,
            }
        })
        .collect()
}

/// Heuristic 0.0 – 1.0 score of how much extracted text looks like prose.
pub fn quality_score(text: &str) -> f32 {
    if text.trim().is_empty() {
        return 0.0;
    }

    let checks = [
        text.chars().count() > 10,
        text.contains(". ") || text.contains(", "),
        !is_mostly_gibberish(text),
        has_word_shapes(text),
        has_reasonable_whitespace(text),
    ];

    checks.iter().filter(|&&passed| passed).count() as f32 / checks.len() as f32
}

fn is_mostly_gibberish(text: &str) -> bool {
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    if letters == 0 {
        return true;
    }
    let vowels = text
        .chars()
        .filter(|c| "aeiouAEIOU".contains(*c))
        .count();
    let ratio = vowels as f32 / letters as f32;
    !(0.15..=0.65).contains(&ratio)
}

fn has_word_shapes(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }
    let plausible = words
        .iter()
        .filter(|w| (2..=20).contains(&w.chars().count()))
        .filter(|w| {
            let alpha = w.chars().filter(|c| c.is_alphabetic()).count() as f32;
            alpha / w.chars().count() as f32 > 0.7
        })
        .count();
    plausible as f32 / words.len() as f32 > 0.5
}

fn has_reasonable_whitespace(text: &str) -> bool {
    let total = text.chars().count();
    let spaces = text.chars().filter(|c| c.is_whitespace()).count();
    let ratio = spaces as f32 / total as f32;
    ratio > 0.05 && ratio < 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_boundary() {
        assert_eq!(clean_text("firstName lastName"), "first Name last Name");
    }

    #[test]
    fn test_collapses_line_endings_and_runs() {
        assert_eq!(clean_text("Jane\r\nDoe\rEngineer\n\n\t  Berlin  "), "Jane Doe Engineer Berlin");
    }

    #[test]
    fn test_digit_letter_boundaries() {
        assert_eq!(clean_text("2019Present"), "2019 Present");
        assert_eq!(clean_text("since2019"), "since 2019");
        assert_eq!(clean_text("10x"), "10 x");
    }

    #[test]
    fn test_ocr_pipe_inside_word() {
        assert_eq!(clean_text("He|lo wor|d"), "Hello world");
        assert_eq!(clean_text("pr0ject"), "project");
    }

    #[test]
    fn test_standalone_symbols_untouched() {
        assert_eq!(clean_text("Rust | Go | SQL"), "Rust | Go | SQL");
        assert_eq!(clean_text("Saved $50"), "Saved $50");
    }

    #[test]
    fn test_email_and_url_protected() {
        assert_eq!(
            clean_text("jane2doe@mail.com https://github.com/janeDoe"),
            "jane2doe@mail.com https://github.com/janeDoe"
        );
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "firstName lastName",
            "a|b|c pr0ject 2019Present JavaScript",
            "  Senior\tEngineer\r\nAcmeCorp 2018-2021 ",
            "x1y2z3 He||o",
        ];
        for sample in samples {
            let once = clean_text(sample);
            assert_eq!(clean_text(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(clean_text(" \n\t "), "");
    }

    #[test]
    fn test_quality_score() {
        assert!(quality_score("Built payment services in Rust. Led a team of five engineers.") > 0.7);
        assert!(quality_score("xvqpz kljfd qwrty") < 0.7);
        assert!(quality_score("#$%^&*()_+=-") < 0.5);
        assert_eq!(quality_score(""), 0.0);
    }
}
