//! Normalization helpers for fuzzy matching.

use regex::Regex;
use std::sync::OnceLock;

fn camel_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"))
}

fn non_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("static regex"))
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Lowercase, split camelCase, and collapse punctuation to single spaces.
pub fn normalize(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let s = s.trim();
    let s = camel_boundary().replace_all(s, "$1 $2");
    let s = non_alnum().replace_all(&s, " ");
    whitespace()
        .replace_all(&s, " ")
        .trim()
        .to_lowercase()
}

/// Remove common project-specific prefixes/suffixes so matching isn't
/// biased.
pub fn strip_affixes(name: &str) -> String {
    let mut s = name;
    for pref in ["ngx_", "redis_", "__"] {
        if let Some(rest) = s.strip_prefix(pref) {
            s = rest;
        }
    }
    for suff in ["_impl", "_locked"] {
        if let Some(rest) = s.strip_suffix(suff) {
            s = rest;
        }
    }
    s.to_string()
}

pub fn tokenize(s: &str) -> Vec<String> {
    let ns = normalize(s);
    if ns.is_empty() {
        Vec::new()
    } else {
        ns.split(' ').map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_camel_case_and_punctuation() {
        assert_eq!(normalize("myCloseWrapper"), "my close wrapper");
        assert_eq!(normalize("do_close__fd"), "do close fd");
        assert_eq!(normalize("  Weird--name  "), "weird name");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn strips_known_affixes() {
        assert_eq!(strip_affixes("ngx_close_impl"), "close");
        assert_eq!(strip_affixes("redis_open"), "open");
        assert_eq!(strip_affixes("__wrap_locked"), "wrap");
        assert_eq!(strip_affixes("plain"), "plain");
    }

    #[test]
    fn tokenize_splits_normalized_words() {
        assert_eq!(tokenize("openFileFast"), vec!["open", "file", "fast"]);
        assert!(tokenize("--").is_empty());
    }
}
