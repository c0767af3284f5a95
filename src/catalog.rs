//! API catalog loading and helper configuration.
//!
//! The catalog is a declarative TOML document naming the target APIs
//! (libc functions and system calls), optional categories, thin-alias
//! names, and the helper families used to classify non-target calls.

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{Error, Result};

/// Which helper family to query in [`HelperConfig::any_match`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperKind {
    /// Helpers that contribute zero to path counts and are ignored.
    Benign,
    /// General helpers: opaque callees whose bodies may be explored.
    Helpers,
}

/// Helper-name configuration: literal sets plus compiled regex patterns.
#[derive(Debug, Default, Clone)]
pub struct HelperConfig {
    pub benign: BTreeSet<String>,
    pub benign_regex: Vec<Regex>,
    pub helpers: BTreeSet<String>,
    pub helpers_regex: Vec<Regex>,
}

impl HelperConfig {
    /// Return true if `name` matches the literal set or any regex of `which`.
    pub fn any_match(&self, name: &str, which: HelperKind) -> bool {
        match which {
            HelperKind::Benign => {
                self.benign.contains(name) || self.benign_regex.iter().any(|r| r.is_match(name))
            }
            HelperKind::Helpers => {
                self.helpers.contains(name) || self.helpers_regex.iter().any(|r| r.is_match(name))
            }
        }
    }
}

/// API catalog loaded from TOML. Immutable after loading.
#[derive(Debug, Default, Clone)]
pub struct ApiCatalog {
    pub libc: BTreeSet<String>,
    pub syscalls: BTreeSet<String>,
    pub target_names: BTreeSet<String>,
    pub helpers: HelperConfig,
    pub thin_aliases: BTreeSet<String>,
    pub categories: BTreeMap<String, BTreeSet<String>>,
    pub name_to_category: BTreeMap<String, String>,
}

impl ApiCatalog {
    /// Category of a target name, preferring the explicit category map and
    /// falling back to the legacy libc/syscall buckets.
    pub fn category_of(&self, name: &str) -> &str {
        if let Some(cat) = self.name_to_category.get(name) {
            return cat;
        }
        if self.libc.contains(name) {
            return "libc";
        }
        if self.syscalls.contains(name) {
            return "system_calls";
        }
        "unknown"
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    libc: Vec<String>,
    #[serde(default)]
    syscalls: Vec<String>,
    #[serde(default)]
    families: BTreeMap<String, RawFamily>,
    #[serde(default)]
    categories: BTreeMap<String, RawCategory>,
    #[serde(default)]
    helpers: RawHelpers,
}

#[derive(Debug, Default, Deserialize)]
struct RawFamily {
    #[serde(default)]
    apis: Vec<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Categories accept either a bare list of names or a table with `apis`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCategory {
    Names(Vec<String>),
    Table {
        #[serde(default)]
        apis: Vec<String>,
    },
}

impl RawCategory {
    fn names(&self) -> &[String] {
        match self {
            RawCategory::Names(v) => v,
            RawCategory::Table { apis } => apis,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawHelpers {
    #[serde(default)]
    benign: Vec<String>,
    #[serde(default)]
    benign_regex: Vec<String>,
    #[serde(default)]
    helpers: Vec<String>,
    #[serde(default)]
    helpers_regex: Vec<String>,
}

fn compile_regex_list(patterns: &[String]) -> Vec<Regex> {
    let mut out = Vec::new();
    for p in patterns {
        match Regex::new(p) {
            Ok(r) => out.push(r),
            Err(err) => tracing::warn!("skipping invalid helper regex {p:?}: {err}"),
        }
    }
    out
}

/// Load an API catalog from a TOML file.
pub fn load_api_catalog(path: &Path) -> Result<ApiCatalog> {
    let raw_text = std::fs::read_to_string(path)
        .map_err(|e| Error::catalog(path, format!("failed to read: {e}")))?;
    let raw: RawCatalog = toml::from_str(&raw_text)
        .map_err(|e| Error::catalog(path, format!("failed to parse: {e}")))?;

    let helpers = HelperConfig {
        benign: raw.helpers.benign.iter().cloned().collect(),
        benign_regex: compile_regex_list(&raw.helpers.benign_regex),
        helpers: raw.helpers.helpers.iter().cloned().collect(),
        helpers_regex: compile_regex_list(&raw.helpers.helpers_regex),
    };

    let mut libc: BTreeSet<String> = raw.libc.iter().cloned().collect();
    let syscalls: BTreeSet<String> = raw.syscalls.iter().cloned().collect();

    let mut categories: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut name_to_category: BTreeMap<String, String> = BTreeMap::new();
    for (cat, body) in &raw.categories {
        let names: BTreeSet<String> = body.names().iter().cloned().collect();
        for nm in &names {
            name_to_category
                .entry(nm.clone())
                .or_insert_with(|| cat.clone());
        }
        categories.insert(cat.clone(), names);
    }

    // Both spellings are accepted; the list doubles as an ordinary category.
    let thin_aliases: BTreeSet<String> = raw
        .categories
        .get("thin_alias")
        .or_else(|| raw.categories.get("thin-alias"))
        .map(|c| c.names().iter().cloned().collect())
        .unwrap_or_default();

    if libc.is_empty() {
        for body in raw.families.values() {
            libc.extend(body.apis.iter().cloned());
            libc.extend(body.aliases.iter().cloned());
        }
    }

    // When categories are present their union is the target set; otherwise
    // fall back to the legacy libc/syscalls buckets.
    let target_names: BTreeSet<String>;
    let mut syscalls = syscalls;
    if !categories.is_empty() {
        target_names = categories.values().flatten().cloned().collect();
        if libc.is_empty() {
            libc = categories
                .iter()
                .filter(|(cat, _)| cat.as_str() != "system_calls")
                .flat_map(|(_, vals)| vals.iter().cloned())
                .collect();
        }
        if syscalls.is_empty() {
            syscalls = categories
                .get("system_calls")
                .cloned()
                .unwrap_or_default();
        }
    } else {
        target_names = libc.union(&syscalls).cloned().collect();
    }

    Ok(ApiCatalog {
        libc,
        syscalls,
        target_names,
        helpers,
        thin_aliases,
        categories,
        name_to_category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_catalog(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        f.write_all(body.as_bytes()).expect("write catalog");
        f
    }

    #[test]
    fn legacy_buckets_form_target_union() {
        let f = write_catalog(
            r#"
libc = ["close", "read"]
syscalls = ["openat"]
"#,
        );
        let cat = load_api_catalog(f.path()).expect("catalog should load");
        assert!(cat.target_names.contains("close"));
        assert!(cat.target_names.contains("openat"));
        assert_eq!(cat.category_of("close"), "libc");
        assert_eq!(cat.category_of("openat"), "system_calls");
        assert_eq!(cat.category_of("mmap"), "unknown");
    }

    #[test]
    fn categories_override_targets_and_map_names() {
        let f = write_catalog(
            r#"
[categories]
file_io = ["open", "close"]
system_calls = ["openat"]

[categories.memory]
apis = ["malloc", "free"]
"#,
        );
        let cat = load_api_catalog(f.path()).expect("catalog should load");
        assert!(cat.target_names.contains("malloc"));
        assert!(cat.target_names.contains("openat"));
        assert_eq!(cat.category_of("open"), "file_io");
        assert_eq!(cat.category_of("malloc"), "memory");
        // Derived legacy buckets
        assert!(cat.syscalls.contains("openat"));
        assert!(cat.libc.contains("close"));
        assert!(!cat.libc.contains("openat"));
    }

    #[test]
    fn thin_alias_accepts_both_spellings() {
        let f = write_catalog(
            r#"
[categories]
file_io = ["close"]
thin_alias = ["close"]
"#,
        );
        let cat = load_api_catalog(f.path()).expect("catalog should load");
        assert!(cat.thin_aliases.contains("close"));
        // The list still participates as a category.
        assert!(cat.categories.contains_key("thin_alias"));

        let f = write_catalog(
            r#"
[categories]
file_io = ["close"]
"thin-alias" = ["close"]
"#,
        );
        let cat = load_api_catalog(f.path()).expect("catalog should load");
        assert!(cat.thin_aliases.contains("close"));
    }

    #[test]
    fn families_fill_empty_libc() {
        let f = write_catalog(
            r#"
syscalls = ["openat"]

[families.io]
apis = ["read", "write"]
aliases = ["pread"]
"#,
        );
        let cat = load_api_catalog(f.path()).expect("catalog should load");
        assert!(cat.libc.contains("read"));
        assert!(cat.libc.contains("pread"));
        assert!(cat.target_names.contains("openat"));
    }

    #[test]
    fn helper_matching_by_literal_and_regex() {
        let f = write_catalog(
            r#"
libc = ["close"]

[helpers]
benign = ["log"]
benign_regex = ["^dbg_"]
helpers = ["wrap_it"]
helpers_regex = ["_impl$"]
"#,
        );
        let cat = load_api_catalog(f.path()).expect("catalog should load");
        assert!(cat.helpers.any_match("log", HelperKind::Benign));
        assert!(cat.helpers.any_match("dbg_print", HelperKind::Benign));
        assert!(!cat.helpers.any_match("log", HelperKind::Helpers));
        assert!(cat.helpers.any_match("wrap_it", HelperKind::Helpers));
        assert!(cat.helpers.any_match("close_impl", HelperKind::Helpers));
    }

    #[test]
    fn invalid_regex_is_skipped() {
        let f = write_catalog(
            r#"
libc = ["close"]

[helpers]
benign_regex = ["(", "^ok_"]
"#,
        );
        let cat = load_api_catalog(f.path()).expect("catalog should load");
        assert_eq!(cat.helpers.benign_regex.len(), 1);
        assert!(cat.helpers.any_match("ok_log", HelperKind::Benign));
    }

    #[test]
    fn missing_file_is_a_catalog_error() {
        let err = load_api_catalog(Path::new("/nonexistent/apis.toml"))
            .expect_err("load should fail");
        assert!(matches!(err, Error::Catalog { .. }));
    }
}
