//! Scoring logic for fuzzy wrapper likelihood.

use itertools::Itertools;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::fuzzy::canon::CanonSet;
use crate::fuzzy::normalize::{normalize, strip_affixes, tokenize};

/// Lexical match of one function name against one catalog API.
#[derive(Debug, Clone)]
pub struct MatchScore {
    pub key: String,
    pub best_match: String,
    pub exact: bool,
    pub token_equal: bool,
    pub lcs_len: usize,
    pub combined: f64,
    pub rf_score: f64,
}

impl Default for MatchScore {
    fn default() -> Self {
        Self {
            key: String::new(),
            best_match: String::new(),
            exact: false,
            token_equal: false,
            lcs_len: 0,
            combined: 0.0,
            rf_score: 0.0,
        }
    }
}

/// Length of the longest common substring (contiguous).
fn lcs_str_len(a: &str, b: &str) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut dp = vec![0usize; b.len() + 1];
    let mut best = 0;
    for ca in &a {
        let mut prev = 0;
        for (j, cb) in b.iter().enumerate() {
            let tmp = dp[j + 1];
            if ca == cb {
                dp[j + 1] = prev + 1;
                best = best.max(dp[j + 1]);
            } else {
                dp[j + 1] = 0;
            }
            prev = tmp;
        }
    }
    best
}

/// String-similarity percentage in the 0..=100 range, taking the better
/// of a character-level and a token-set comparison.
fn similarity_pct(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let char_level = strsim::jaro_winkler(a, b) * 100.0;
    let token_set = |s: &str| -> String {
        let set: BTreeSet<&str> = s.split_whitespace().collect();
        set.iter().join(" ")
    };
    let token_level = strsim::normalized_levenshtein(&token_set(a), &token_set(b)) * 100.0;
    char_level.max(token_level)
}

/// Score one function name (pre-tokenized and normalized) against a canon
/// set.
pub fn score_against_canon(fn_tokens: &[String], fn_norm: &str, cs: &CanonSet) -> MatchScore {
    let cand = cs.candidates.first().map(String::as_str).unwrap_or("");
    let exact = fn_norm == cand;
    let token_equal = if !fn_tokens.is_empty() && !cand.is_empty() {
        let a: BTreeSet<&str> = fn_tokens.iter().map(String::as_str).collect();
        let b: BTreeSet<&str> = cand.split(' ').collect();
        a == b
    } else {
        false
    };

    let mut best_lcs = 0;
    let mut best_ratio = 0.0f64;
    let fallback = [fn_norm.to_string()];
    let tokens: &[String] = if fn_tokens.is_empty() {
        &fallback
    } else {
        fn_tokens
    };
    for t in tokens {
        let lcs = lcs_str_len(t, cand);
        if lcs > best_lcs {
            best_lcs = lcs;
            best_ratio = (lcs as f64 / t.chars().count().max(1) as f64)
                .max(lcs as f64 / cand.chars().count().max(1) as f64);
        }
    }

    let combined = if exact {
        100.0
    } else {
        (100.0 * best_ratio).clamp(0.0, 100.0)
    };
    let rf_score = if !fn_norm.is_empty() && !cand.is_empty() {
        similarity_pct(fn_norm, cand)
    } else {
        combined
    };

    MatchScore {
        key: cs.key.clone(),
        best_match: cand.to_string(),
        exact,
        token_equal,
        lcs_len: best_lcs,
        combined,
        rf_score,
    }
}

/// Top-k matches for a function name, best first. Weak matches (no exact
/// hit and a common substring shorter than 3) are filtered out.
pub fn top_k_scores(fn_name: &str, canon_sets: &[CanonSet], k: usize) -> Vec<MatchScore> {
    let fn_stripped = strip_affixes(fn_name);
    let fn_tokens = tokenize(&fn_stripped);
    let fn_norm = normalize(&fn_stripped);

    let mut scores: Vec<MatchScore> = canon_sets
        .iter()
        .map(|cs| score_against_canon(&fn_tokens, &fn_norm, cs))
        .filter(|s| s.lcs_len >= 3 || s.exact)
        .collect();
    if scores.is_empty() {
        return Vec::new();
    }
    scores.sort_by(|a, b| {
        b.rf_score
            .total_cmp(&a.rf_score)
            .then_with(|| b.exact.cmp(&a.exact))
            .then_with(|| b.token_equal.cmp(&a.token_equal))
            .then_with(|| b.lcs_len.cmp(&a.lcs_len))
            .then_with(|| b.combined.total_cmp(&a.combined))
            .then_with(|| a.key.cmp(&b.key))
    });
    scores.truncate(k);
    scores
}

fn split_callees(callee_field: &str) -> Vec<String> {
    let s = callee_field.trim();
    if s.is_empty() {
        return Vec::new();
    }
    let s = s.replace(" - ", "|");
    let sep = Regex::new(r"[|;,\s]+").expect("static regex");
    sep.split(&s)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn yes_count_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^yes\s*-\s*(\d+)").expect("static regex"))
}

fn norm_prov(s: &str) -> String {
    let ws = Regex::new(r"\s+").expect("static regex");
    ws.replace_all(s.trim(), " ").to_lowercase()
}

/// Composite wrapper-likelihood score in `[0, 1]`, combining thinness,
/// name position, token coverage, fuzzy similarity, fan-out, and the
/// finder's own verdict columns.
#[allow(clippy::too_many_arguments)]
pub fn wrapper_score(
    function: &str,
    api_called: &str,
    callee_field: &str,
    fan_out: i64,
    fuzzy_key: &str,
    fuzzy_combined: f64,
    category: &str,
    reason: &str,
    arg_pass: &str,
    ret_pass: &str,
) -> f64 {
    let fn_stripped = strip_affixes(function);
    let fn_norm = normalize(&fn_stripped);
    let fn_tokens: BTreeSet<String> = tokenize(&fn_stripped).into_iter().collect();

    let fuzzy_norm = normalize(fuzzy_key);
    let api_called_norm = normalize(api_called);
    let category_norm = normalize(category);
    let catalog_blacklist = ["", "other"];
    let category_blacklist = ["", "n/a", "na", "none"];
    let api_from_catalog = !api_called_norm.is_empty()
        && !catalog_blacklist.contains(&api_called_norm.as_str())
        && !category_blacklist.contains(&category_norm.as_str());

    let api_token_source = if api_from_catalog { api_called } else { fuzzy_key };
    let api_norm = normalize(api_token_source);
    let api_tokens = tokenize(&api_norm);

    let mut api_alignment = 0.0;
    if api_from_catalog && !api_norm.is_empty() && !fuzzy_norm.is_empty() {
        api_alignment = if api_norm == fuzzy_norm {
            100.0
        } else {
            similarity_pct(&api_norm, &fuzzy_norm)
        };
    }

    let callees = split_callees(callee_field);
    let callee_norms: Vec<String> = callees.iter().map(|c| normalize(c)).collect();
    let n_callees = callee_norms.iter().collect::<BTreeSet<_>>().len();

    let s_thin = if n_callees == 0 {
        0.0
    } else {
        1.0 / (n_callees as f64).powf(0.8)
    };

    let pos = |tok: &str| -> f64 {
        if tok.is_empty() {
            return 0.0;
        }
        if fn_norm.starts_with(tok) || fn_norm.ends_with(tok) {
            return 1.0;
        }
        let pad = format!(" {fn_norm} ");
        if pad.contains(&format!(" {tok} ")) {
            return 0.7;
        }
        if fn_norm.contains(tok) {
            return 0.4;
        }
        0.0
    };

    let mut pos_candidates: Vec<f64> = Vec::new();
    if !api_norm.is_empty() {
        pos_candidates.push(pos(&api_norm));
    }
    pos_candidates.extend(callee_norms.iter().map(|c| pos(c)));
    let s_pos = pos_candidates.iter().copied().fold(0.0f64, f64::max);

    let coverage = if !api_tokens.is_empty() && api_from_catalog {
        let overlap = api_tokens.iter().filter(|t| fn_tokens.contains(*t)).count();
        overlap as f64 / api_tokens.len() as f64
    } else {
        0.0
    };
    let boundary_bonus = if api_from_catalog
        && !api_norm.is_empty()
        && (fn_norm.starts_with(&api_norm) || fn_norm.ends_with(&api_norm))
    {
        0.1
    } else {
        0.0
    };
    let s_dom = (coverage + boundary_bonus).min(1.0);

    let s_fuzzy = (fuzzy_combined / 100.0).clamp(0.0, 1.0);
    let s_fanout = 1.0 / (1.0 + fan_out.max(0) as f64);

    const W_THIN: f64 = 0.24;
    const W_POS: f64 = 0.24;
    const W_DOM: f64 = 0.18;
    const W_FUZ: f64 = 0.18;
    const W_FAN: f64 = 0.08;
    const W_CAT: f64 = 0.08;

    let dom_weight = if api_from_catalog && !api_tokens.is_empty() {
        W_DOM
    } else {
        0.0
    };
    let fuzzy_weight = W_FUZ + (W_DOM - dom_weight);

    let mut score = W_THIN * s_thin
        + W_POS * s_pos
        + dom_weight * s_dom
        + fuzzy_weight * s_fuzzy
        + W_FAN * s_fanout;

    let catalog_signal = if api_from_catalog {
        if api_alignment > 0.0 {
            (0.35 + 0.65 * (api_alignment / 100.0)).min(1.0)
        } else {
            0.35
        }
    } else {
        0.0
    };
    score += W_CAT * catalog_signal;

    let mut penalties = 1.0;
    let callee_tokens_all: BTreeSet<String> = callees
        .iter()
        .flat_map(|c| tokenize(c))
        .collect();
    if api_from_catalog {
        if let Some(api_first) = api_tokens.first() {
            if !fn_tokens.contains(api_first) && !callee_tokens_all.contains(api_first) {
                penalties *= 0.9;
            }
        }
    }
    if n_callees >= 10 {
        penalties *= 0.85;
    } else if n_callees == 0 {
        penalties *= 0.55;
    }
    if s_fuzzy < 0.40 {
        penalties *= 0.85;
    } else if s_fuzzy < 0.60 && s_pos == 0.4 {
        penalties *= 0.90;
    }
    score *= penalties;

    let reason_clean = reason.trim().to_lowercase();
    if reason_clean == "ok" {
        score *= 1.05;
    } else if !reason_clean.is_empty() {
        let parts = reason_clean
            .split('+')
            .filter(|p| !p.trim().is_empty())
            .count();
        score *= 1.0 - (0.03 * parts as f64).min(0.12);
    }

    let ap = norm_prov(arg_pass);
    let rp = norm_prov(ret_pass);
    if ap == "yes - all" && rp == "yes - all" {
        score = 1.0;
    } else {
        let arg_bonus = if ap == "yes - all" {
            0.12
        } else {
            yes_count_regex()
                .captures(&ap)
                .and_then(|c| c[1].parse::<usize>().ok())
                .map(|k| (0.02 * k as f64).min(0.10))
                .unwrap_or(0.0)
        };
        let ret_bonus = if rp == "yes - all" {
            0.08
        } else {
            yes_count_regex()
                .captures(&rp)
                .and_then(|c| c[1].parse::<usize>().ok())
                .map(|k| (0.02 * k as f64).min(0.06))
                .unwrap_or(0.0)
        };
        score = (score + arg_bonus + ret_bonus).min(1.0);
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(names: &[&str]) -> Vec<CanonSet> {
        names
            .iter()
            .map(|n| CanonSet {
                key: n.to_string(),
                candidates: vec![normalize(n)],
            })
            .collect()
    }

    #[test]
    fn lcs_basics() {
        assert_eq!(lcs_str_len("close", "close"), 5);
        assert_eq!(lcs_str_len("myclose", "close"), 5);
        assert_eq!(lcs_str_len("open", "close"), 1);
        assert_eq!(lcs_str_len("", "close"), 0);
    }

    #[test]
    fn exact_name_scores_first() {
        let sets = canon(&["close", "open", "fclose"]);
        let top = top_k_scores("close", &sets, 3);
        assert!(!top.is_empty());
        assert_eq!(top[0].key, "close");
        assert!(top[0].exact);
        assert_eq!(top[0].combined, 100.0);
    }

    #[test]
    fn affixed_name_still_matches() {
        let sets = canon(&["close", "open"]);
        let top = top_k_scores("ngx_close_impl", &sets, 3);
        assert!(!top.is_empty());
        assert_eq!(top[0].key, "close");
    }

    #[test]
    fn unrelated_names_are_filtered() {
        let sets = canon(&["mmap"]);
        let top = top_k_scores("xy", &sets, 3);
        assert!(top.is_empty());
    }

    #[test]
    fn perfect_pass_through_saturates_score() {
        let s = wrapper_score(
            "my_close",
            "close",
            "close",
            1,
            "close",
            100.0,
            "libc",
            "ok",
            "yes - all",
            "yes - all",
        );
        assert_eq!(s, 1.0);
    }

    #[test]
    fn no_callees_is_penalized() {
        let with_callee = wrapper_score(
            "my_close", "close", "close", 1, "close", 100.0, "libc", "ok", "no", "no",
        );
        let without_callee = wrapper_score(
            "my_close", "close", "", 1, "close", 100.0, "libc", "ok", "no", "no",
        );
        assert!(without_callee < with_callee);
    }

    #[test]
    fn catalog_api_beats_unknown_category() {
        let with_catalog = wrapper_score(
            "my_close", "close", "close", 1, "close", 100.0, "libc", "ok", "no", "no",
        );
        let without_catalog = wrapper_score(
            "my_close", "other", "close", 1, "close", 100.0, "N/A", "ok", "no", "no",
        );
        assert!(with_catalog > without_catalog);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        for (f, api, callee, fan, fz, comb) in [
            ("w", "", "", 0i64, "", 0.0),
            ("deep_wrapper_chain", "close", "a;b;c;d;e;f;g;h;i;j;k", 40, "close", 20.0),
            ("my_close", "close", "close", 0, "close", 100.0),
        ] {
            let s = wrapper_score(f, api, callee, fan, fz, comb, "libc", "ok+via-hop", "yes - 2", "yes - 1");
            assert!((0.0..=1.0).contains(&s), "score {s} out of range");
        }
    }

    #[test]
    fn split_callees_handles_all_separators() {
        assert_eq!(
            split_callees("a - b|c;d,e f"),
            vec!["a", "b", "c", "d", "e", "f"]
        );
        assert!(split_callees("  ").is_empty());
    }
}
