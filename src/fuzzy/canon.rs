//! Canonical name sets for fuzzy scoring.
//!
//! Reads the API catalog independently of the finder so the fuzzy stage
//! can run against any catalog shape: legacy buckets, families, or
//! categories with either list or table values.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fuzzy::normalize::normalize;

/// One catalog API with its normalized candidate spellings.
#[derive(Debug, Clone)]
pub struct CanonSet {
    pub key: String,
    pub candidates: Vec<String>,
}

fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(p) = explicit {
        out.push(p.to_path_buf());
    }
    if let Ok(cwd) = std::env::current_dir() {
        out.push(cwd.join("categorized_methods.toml"));
        out.push(cwd.join("methods.toml"));
    }
    out
}

fn push_names(value: &toml::Value, names: &mut BTreeSet<String>) {
    if let Some(list) = value.as_array() {
        for v in list {
            if let Some(s) = v.as_str() {
                names.insert(s.to_string());
            }
        }
    }
}

/// Load API names from the catalog and build candidate sets.
pub fn build_canon_sets(catalog_path: Option<&Path>) -> Result<Vec<CanonSet>> {
    let paths = candidate_paths(catalog_path);
    let mut doc: Option<toml::Value> = None;
    for p in &paths {
        if let Ok(text) = std::fs::read_to_string(p) {
            if let Ok(v) = toml::from_str::<toml::Value>(&text) {
                doc = Some(v);
                break;
            }
        }
    }
    let Some(doc) = doc else {
        let tried: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        return Err(Error::other(format!(
            "failed to read catalog at any of: {}",
            tried.join(", ")
        )));
    };

    let mut names: BTreeSet<String> = BTreeSet::new();
    for section in ["libc", "syscalls"] {
        if let Some(v) = doc.get(section) {
            push_names(v, &mut names);
        }
    }

    if let Some(fams) = doc.get("families").and_then(|v| v.as_table()) {
        for body in fams.values() {
            for key in ["apis", "aliases"] {
                if let Some(v) = body.get(key) {
                    push_names(v, &mut names);
                }
            }
        }
    }

    if let Some(cats) = doc.get("categories").and_then(|v| v.as_table()) {
        for body in cats.values() {
            if body.is_array() {
                push_names(body, &mut names);
            } else if let Some(table) = body.as_table() {
                for v in table.values() {
                    push_names(v, &mut names);
                }
            }
        }
    }

    let mut sets = Vec::new();
    for key in names {
        let n = normalize(&key);
        if n.is_empty() {
            continue;
        }
        sets.push(CanonSet {
            key,
            candidates: vec![n],
        });
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn harvests_all_catalog_shapes() {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        f.write_all(
            br#"
libc = ["close"]
syscalls = ["openat"]

[families.io]
apis = ["pread64"]
aliases = ["pread"]

[categories]
memory = ["malloc"]

[categories.net]
apis = ["socket"]
"#,
        )
        .expect("write");
        let sets = build_canon_sets(Some(f.path())).expect("canon sets");
        let keys: Vec<&str> = sets.iter().map(|s| s.key.as_str()).collect();
        for expected in ["close", "openat", "pread64", "pread", "malloc", "socket"] {
            assert!(keys.contains(&expected), "missing {expected}");
        }
        let pread64 = sets.iter().find(|s| s.key == "pread64").expect("pread64");
        assert_eq!(pread64.candidates, vec!["pread64".to_string()]);
    }

    #[test]
    fn missing_catalog_is_an_error() {
        let err = build_canon_sets(Some(Path::new("/nonexistent/apis.toml")))
            .expect_err("should fail");
        assert!(err.to_string().contains("failed to read catalog"));
    }
}
