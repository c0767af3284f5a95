//! Compilation database loading and argument normalization.
//!
//! Each entry is reduced to an absolute source path plus a sanitized
//! argument vector: outputs, linker flags, warnings, and unsupported
//! frontend options are dropped, include-ish paths are made absolute
//! relative to the entry's directory, and a language flag plus the system
//! include roots are injected when missing. Sanitizing an already
//! sanitized vector is a no-op.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// One record of a compilation database.
#[derive(Debug, Clone, Deserialize)]
pub struct DbEntry {
    pub directory: Option<String>,
    pub file: Option<String>,
    pub arguments: Option<Vec<String>>,
    pub command: Option<String>,
}

/// Explicit sanitizer configuration; populated once by the driver.
#[derive(Debug, Default, Clone)]
pub struct SanitizeOptions {
    /// Inject the entry and source directories as includes when the
    /// vector carries no project includes at all.
    pub add_defaults: bool,
    /// Preferred compiler resource directory; discovered when absent.
    pub resource_dir: Option<PathBuf>,
    /// `(old_prefix, new_prefix)` rewrites for stale source paths.
    pub path_maps: Vec<(String, String)>,
}

/// Load a compilation database file (a JSON array of entries).
pub fn load_compile_commands(path: &Path) -> Result<Vec<DbEntry>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::compile_db(path, format!("failed to read: {e}")))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| Error::compile_db(path, format!("failed to parse: {e}")))?;
    if !value.is_array() {
        return Err(Error::compile_db(path, "root must be a list"));
    }
    serde_json::from_value(value).map_err(|e| Error::compile_db(path, e.to_string()))
}

/// Token list from either `arguments` (preferred) or a shell-split
/// `command`.
pub fn tokenize_entry(entry: &DbEntry) -> Vec<String> {
    if let Some(args) = &entry.arguments {
        return args.clone();
    }
    entry
        .command
        .as_deref()
        .and_then(shlex::split)
        .unwrap_or_default()
}

const COMPILER_NAMES: &[&str] = &[
    "cc", "gcc", "clang", "clang-16", "clang-17", "clang-18", "clang-19", "clang-20", "c99", "c11",
];

const DROP_EXACT: &[&str] = &[
    "-c",
    "-E",
    "-S",
    "-pipe",
    "-static",
    "-shared",
    "-rdynamic",
    "-s",
    "-g",
    "-ggdb",
    "-gsplit-dwarf",
    "-save-temps",
];

const DROP_PREFIXES: &[&str] = &[
    "-Wl,",
    "-Xlinker",
    "-l",
    "-L",
    "-fuse-ld",
    "-T",
    "-u",
    "-flto",
    "-fwhole-program-vtables",
    "-fprofile",
    "-fcoverage",
    "--coverage",
    "-fsanitize",
    "-fno-sanitize",
    "-fmodules",
    "-fmodule-file=",
    "-fmodule-map-file=",
    "-fmodules-cache-path",
    "-m",
];

const PRESERVE_EXACT: &[&str] = &["-pthread", "-ansi", "-fsigned-char", "-pedantic"];

const PAIR_FLAGS: &[&str] = &[
    "-I",
    "-isystem",
    "-iquote",
    "-idirafter",
    "-include",
    "-imacros",
    "-o",
    "-MF",
    "-MT",
    "-MQ",
    "-MJ",
    "-x",
    "-isysroot",
    "--sysroot",
    "-resource-dir",
    "-target",
];

const OUTPUT_PAIR_FLAGS: &[&str] = &["-o", "-MF", "-MT", "-MQ", "-MJ"];

fn basename(tok: &str) -> &str {
    Path::new(tok)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(tok)
}

fn is_obj_or_lib(tok: &str) -> bool {
    let lo = tok.to_lowercase();
    [".o", ".obj", ".lo", ".a", ".lib", ".so", ".dylib", ".bc", ".ll"]
        .iter()
        .any(|ext| lo.ends_with(ext))
}

fn is_source_file(tok: &str) -> bool {
    let lo = tok.to_lowercase();
    [".c", ".cc", ".cpp", ".cxx", ".c++", ".m", ".mm"]
        .iter()
        .any(|ext| lo.ends_with(ext))
}

fn is_warning(tok: &str) -> bool {
    tok.starts_with("-W") && !tok.starts_with("-Wl,")
}

fn abspath(candidate: &str, base: &Path) -> String {
    if candidate.is_empty() {
        return String::new();
    }
    let p = Path::new(candidate);
    if p.is_absolute() {
        candidate.to_string()
    } else {
        let joined = base.join(p);
        joined
            .canonicalize()
            .unwrap_or(joined)
            .to_string_lossy()
            .into_owned()
    }
}

fn canon_str(path: &str) -> String {
    Path::new(path)
        .canonicalize()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string())
}

fn split_response_file(tok: &str) -> Vec<String> {
    if let Some(path) = tok.strip_prefix('@') {
        let p = Path::new(path);
        let small = std::fs::metadata(p)
            .map(|m| m.len() <= 2 * 1024 * 1024)
            .unwrap_or(false);
        if p.is_file() && small {
            if let Ok(text) = std::fs::read_to_string(p) {
                return shlex::split(&text).unwrap_or_default();
            }
        }
        return Vec::new();
    }
    vec![tok.to_string()]
}

/// True if `include_path` already appears in args, in either the split
/// (`-I x`) or joined (`-Ix`) form.
pub fn include_already_present(args: &[String], include_path: &str) -> bool {
    if include_path.is_empty() {
        return false;
    }
    for (i, a) in args.iter().enumerate() {
        if a == "-I" {
            if args.get(i + 1).is_some_and(|v| v == include_path) {
                return true;
            }
        } else if let Some(v) = a.strip_prefix("-I") {
            if v == include_path {
                return true;
            }
        }
    }
    false
}

fn has_sys_include(args: &[String], path: &str) -> bool {
    let wanted = canon_str(path);
    for (i, t) in args.iter().enumerate() {
        if ["-I", "-isystem", "-iquote", "-idirafter"].contains(&t.as_str()) {
            if args.get(i + 1).is_some_and(|v| canon_str(v) == wanted) {
                return true;
            }
        }
        if let Some(v) = t.strip_prefix("-I") {
            if !v.is_empty() && canon_str(v) == wanted {
                return true;
            }
        }
    }
    false
}

fn has_any_project_includes(args: &[String]) -> bool {
    let sys_paths = ["/usr/include", "/usr/include/x86_64-linux-gnu"];
    for (i, t) in args.iter().enumerate() {
        if ["-I", "-isystem", "-iquote", "-idirafter"].contains(&t.as_str()) {
            if let Some(v) = args.get(i + 1) {
                if !v.starts_with('-') && !sys_paths.contains(&canon_str(v).as_str()) {
                    return true;
                }
            }
        }
        if let Some(v) = t.strip_prefix("-I") {
            if !v.is_empty() && !sys_paths.contains(&canon_str(v).as_str()) {
                return true;
            }
        }
    }
    false
}

fn discover_resource_dir(opts: &SanitizeOptions) -> Option<String> {
    let valid = |dir: &Path| dir.join("include").join("stddef.h").exists();

    if let Some(rd) = &opts.resource_dir {
        if valid(rd) {
            return Some(rd.to_string_lossy().into_owned());
        }
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(entries) = std::fs::read_dir("/usr/lib") {
        let mut llvm_dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("llvm-"))
            })
            .collect();
        llvm_dirs.sort();
        llvm_dirs.reverse();
        for d in llvm_dirs {
            if let Ok(versions) = std::fs::read_dir(d.join("lib/clang")) {
                let mut vs: Vec<PathBuf> = versions.flatten().map(|e| e.path()).collect();
                vs.sort();
                vs.reverse();
                candidates.extend(vs);
            }
        }
    }
    if let Ok(versions) = std::fs::read_dir("/usr/lib/clang") {
        let mut vs: Vec<PathBuf> = versions.flatten().map(|e| e.path()).collect();
        vs.sort();
        vs.reverse();
        candidates.extend(vs);
    }

    candidates
        .into_iter()
        .find(|rd| valid(rd))
        .map(|rd| rd.to_string_lossy().into_owned())
}

/// Strip `-o X` / `-MF X` style output pairs; used for the parse retry.
pub fn strip_output_pairs(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let tok = &args[i];
        if OUTPUT_PAIR_FLAGS.contains(&tok.as_str())
            && args.get(i + 1).is_some_and(|v| !v.starts_with('-'))
        {
            i += 2;
            continue;
        }
        out.push(tok.clone());
        i += 1;
    }
    out
}

/// Sanitize one raw argument vector for frontend parsing.
pub fn sanitize_args(
    raw: &[String],
    src_path: &Path,
    entry_dir: &Path,
    opts: &SanitizeOptions,
) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for t in raw {
        tokens.extend(split_response_file(t));
    }

    let mut filtered: Vec<String> = Vec::new();
    let mut saw_lang = false;
    let mut saw_resource_dir = false;

    let n = tokens.len();
    let mut i = 0;
    while i < n {
        let tok = tokens[i].as_str();

        if i == 0 && !tok.starts_with('-') && COMPILER_NAMES.contains(&basename(tok)) {
            i += 1;
            continue;
        }

        if DROP_EXACT.contains(&tok) {
            i += 1;
            continue;
        }
        if is_obj_or_lib(tok) || is_source_file(tok) {
            i += 1;
            continue;
        }
        if DROP_PREFIXES.iter().any(|p| tok.starts_with(p)) {
            i += 1;
            continue;
        }
        if is_warning(tok) {
            i += 1;
            continue;
        }

        if PAIR_FLAGS.contains(&tok) {
            let value = tokens.get(i + 1).filter(|v| !v.starts_with('-'));

            if OUTPUT_PAIR_FLAGS.contains(&tok) {
                i += 1 + usize::from(value.is_some());
                continue;
            }

            let Some(value) = value else {
                tracing::warn!("dropping dangling flag (no value): {tok}");
                i += 1;
                continue;
            };

            let needs_abs = [
                "-I",
                "-isystem",
                "-iquote",
                "-idirafter",
                "-include",
                "-imacros",
                "-isysroot",
                "--sysroot",
            ]
            .contains(&tok);
            let abs_val = if needs_abs {
                abspath(value, entry_dir)
            } else {
                value.clone()
            };

            if tok == "-x" {
                saw_lang = true;
            } else if tok == "-resource-dir" {
                saw_resource_dir = true;
            }

            filtered.push(tok.to_string());
            filtered.push(abs_val);
            i += 2;
            continue;
        }

        if tok.starts_with("-std=") {
            filtered.push(tok.to_string());
            i += 1;
            continue;
        }

        let joined_include = [("-I", 2), ("-isystem", 8), ("-iquote", 7), ("-idirafter", 10)]
            .into_iter()
            .find(|(flag, _)| tok.starts_with(flag) && tok != *flag);
        if let Some((flag, skip)) = joined_include {
            let val = &tok[skip..];
            if !val.is_empty() {
                filtered.push(flag.to_string());
                filtered.push(abspath(val, entry_dir));
            }
            i += 1;
            continue;
        }

        if let Some(val) = tok.strip_prefix("-isysroot=") {
            filtered.push(format!("-isysroot={}", abspath(val, entry_dir)));
            i += 1;
            continue;
        }
        if let Some(val) = tok.strip_prefix("--sysroot=") {
            filtered.push(format!("--sysroot={}", abspath(val, entry_dir)));
            i += 1;
            continue;
        }
        if let Some(val) = tok.strip_prefix("-resource-dir=") {
            saw_resource_dir = true;
            filtered.push(format!("-resource-dir={}", abspath(val, entry_dir)));
            i += 1;
            continue;
        }

        if tok.starts_with("-D") {
            filtered.push(tok.to_string());
            i += 1;
            continue;
        }

        if PRESERVE_EXACT.contains(&tok) {
            filtered.push(tok.to_string());
            i += 1;
            continue;
        }

        if tok.starts_with("-O") {
            filtered.push(tok.to_string());
            i += 1;
            continue;
        }

        // Kept in place so re-sanitizing is stable.
        if tok.starts_with("-working-directory") {
            filtered.push(tok.to_string());
            i += 1;
            continue;
        }

        i += 1;
    }

    if !filtered
        .iter()
        .any(|a| a == "-working-directory" || a.starts_with("-working-directory="))
    {
        filtered.push(format!("-working-directory={}", entry_dir.display()));
    }

    let src_dir = src_path
        .parent()
        .map(|p| canon_str(&p.to_string_lossy()))
        .unwrap_or_default();
    let ent_dir = canon_str(&entry_dir.to_string_lossy());
    if src_dir != ent_dir && !include_already_present(&filtered, &src_dir) {
        filtered.push("-I".to_string());
        filtered.push(src_dir.clone());
    }

    if !has_sys_include(&filtered, "/usr/include") {
        filtered.push("-I".to_string());
        filtered.push("/usr/include".to_string());
    }

    let multiarch = "/usr/include/x86_64-linux-gnu";
    if Path::new(multiarch).is_dir() && !has_sys_include(&filtered, multiarch) {
        filtered.push("-I".to_string());
        filtered.push(multiarch.to_string());
    }

    if !saw_resource_dir {
        if let Some(rd) = discover_resource_dir(opts) {
            filtered.push(format!("-resource-dir={rd}"));
        }
    }

    if opts.add_defaults && !has_any_project_includes(&filtered) {
        for p in [&ent_dir, &src_dir] {
            if !p.is_empty() && !include_already_present(&filtered, p) {
                filtered.push("-I".to_string());
                filtered.push(p.clone());
            }
        }
    }

    for k in 0..filtered.len().saturating_sub(1) {
        if filtered[k] == "-I" && filtered[k + 1].starts_with('-') {
            tracing::warn!("malformed '-I' followed by flag: {}", filtered[k + 1]);
        }
    }

    if !saw_lang {
        let lang = match src_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("cc") | Some("cpp") | Some("cxx") | Some("c++") => "c++",
            Some("m") => "objective-c",
            Some("mm") => "objective-c++",
            _ => "c",
        };
        filtered.splice(0..0, ["-x".to_string(), lang.to_string()]);
    }

    filtered
}

/// Convert one entry into `(absolute_src_path, sanitized_args)`.
pub fn normalize_entry(entry: &DbEntry, opts: &SanitizeOptions) -> Result<(PathBuf, Vec<String>)> {
    let directory = entry.directory.clone().unwrap_or_else(|| ".".to_string());
    let directory = PathBuf::from(&directory);
    let directory = directory.canonicalize().unwrap_or(directory);

    let Some(file_field) = &entry.file else {
        return Err(Error::other("compilation database entry missing 'file'"));
    };
    let joined = if Path::new(file_field).is_absolute() {
        PathBuf::from(file_field)
    } else {
        directory.join(file_field)
    };
    let mut src_path = joined.canonicalize().unwrap_or(joined);
    let mut directory = directory;

    if !src_path.exists() {
        let s = src_path.to_string_lossy().into_owned();
        for (old_prefix, new_prefix) in &opts.path_maps {
            if let Some(rest) = s.strip_prefix(old_prefix.as_str()) {
                let candidate = PathBuf::from(format!("{new_prefix}{rest}"));
                if candidate.exists() {
                    tracing::warn!(
                        "remapped source path: {} -> {}",
                        src_path.display(),
                        candidate.display()
                    );
                    src_path = candidate.canonicalize().unwrap_or(candidate);
                    if let Some(parent) = src_path.parent() {
                        directory = parent.to_path_buf();
                    }
                    break;
                }
            }
        }
    }

    if !src_path.exists() {
        return Err(Error::other(format!(
            "source path does not exist: {}",
            src_path.display()
        )));
    }

    let raw = tokenize_entry(entry);
    if raw.is_empty() {
        return Err(Error::other(
            "compilation database entry missing 'arguments'/'command'",
        ));
    }

    let args = sanitize_args(&raw, &src_path, &directory, opts);
    Ok((src_path, args))
}

/// Build the source-to-args map, skipping malformed entries with a
/// warning.
pub fn build_file_to_args_map(
    entries: &[DbEntry],
    opts: &SanitizeOptions,
) -> BTreeMap<PathBuf, Vec<String>> {
    let mut out = BTreeMap::new();
    for entry in entries {
        match normalize_entry(entry, opts) {
            Ok((src, args)) => {
                out.insert(src, args);
            }
            Err(e) => tracing::warn!("skipping compilation database entry: {e}"),
        }
    }
    out
}
