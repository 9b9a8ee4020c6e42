//! Post-processing of raw engine output.
//!
//! SenseVoice-style engines annotate their transcripts with inline markup such
//! as `<|zh|><|NEUTRAL|><|Speech|><|withitn|>`. [`normalize`] strips those tags
//! and tidies the punctuation and whitespace they leave behind.

use std::sync::OnceLock;

use regex::Regex;

struct Patterns {
    tag: Regex,
    punctuation: [(Regex, &'static str); 4],
    whitespace: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        // Also matches the spaced form `< | zh | >`.
        tag: Regex::new(r"<\s*\|\s*[^>]+?\s*\|\s*>").expect("tag pattern is valid"),
        punctuation: [
            (Regex::new(r"，{2,}").expect("pattern is valid"), "，"),
            (Regex::new(r",{2,}").expect("pattern is valid"), ","),
            (Regex::new(r"。{2,}").expect("pattern is valid"), "。"),
            (Regex::new(r"\.{2,}").expect("pattern is valid"), "."),
        ],
        whitespace: Regex::new(r"\s+").expect("whitespace pattern is valid"),
    })
}

/// Remove `<|...|>` markup, collapse repeated punctuation and whitespace.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let p = patterns();
    let mut cleaned = p.tag.replace_all(raw, "").into_owned();
    for (pattern, replacement) in &p.punctuation {
        cleaned = pattern.replace_all(&cleaned, *replacement).into_owned();
    }
    p.whitespace.replace_all(&cleaned, " ").trim().to_string()
}
