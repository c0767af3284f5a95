//! Runner for wrapper detection.
//!
//! Iterates the compilation database, parses each translation unit, runs
//! the per-function wrapper decision, and merges call-graph edges from all
//! units back into the rows' fan-in/fan-out fields. Translation units are
//! independent; with more than one job they are analyzed in parallel and
//! each worker writes into private row/edge vectors that are merged at
//! unit boundaries, so aggregation always sees a quiescent edge list.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tree_sitter::Node;

use crate::analysis::{CallResolver, collect_target_calls, resolve_target_name_for_call};
use crate::ast::{self, SourceFile};
use crate::callgraph::{collect_callgraph_for_tu, write_callgraph};
use crate::catalog::{ApiCatalog, load_api_catalog};
use crate::compile_db::{
    SanitizeOptions, build_file_to_args_map, load_compile_commands, strip_output_pairs,
};
use crate::detection::{
    ThinAliasPolicy, WrapperAnalysis, analyze_wrapper_relaxed, analyze_wrapper_strict_plus,
};
use crate::error::{Error, Result};
use crate::models::{Edge, Row};
use crate::output::{
    is_stdout, prepare_output_location, write_rows_csv, write_rows_json, write_rows_jsonl,
};
use crate::provenance::compute_arg_ret_pass;

/// Wrapper decision mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Broader, higher recall.
    Relaxed,
    /// Low false-positive strict-plus decision.
    Accurate,
    /// Keep every in-project function; non-callers get `api_called="other"`.
    All,
}

/// Row output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
    Jsonl,
}

impl OutputFormat {
    fn default_file_name(self) -> &'static str {
        match self {
            OutputFormat::Csv => "wrappers.csv",
            OutputFormat::Json => "wrappers.json",
            OutputFormat::Jsonl => "wrappers.jsonl",
        }
    }
}

/// Fully resolved finder configuration, owned by the driver.
#[derive(Debug, Clone)]
pub struct FinderConfig {
    pub compile_commands: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub mode: Mode,
    pub output: OutputFormat,
    pub out: String,
    pub out_dir: Option<PathBuf>,
    pub only_libc: bool,
    pub only_syscalls: bool,
    pub callgraph_out: Option<PathBuf>,
    pub callgraph_only: bool,
    pub path_maps: Vec<String>,
    pub all_columns: bool,
    pub project_roots: Vec<PathBuf>,
    pub project_only: bool,
    pub thin_alias_policy: ThinAliasPolicy,
    pub jobs: usize,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            compile_commands: PathBuf::new(),
            catalog_path: None,
            mode: Mode::All,
            output: OutputFormat::Csv,
            out: "-".to_string(),
            out_dir: None,
            only_libc: false,
            only_syscalls: false,
            callgraph_out: None,
            callgraph_only: false,
            path_maps: Vec::new(),
            all_columns: false,
            project_roots: Vec::new(),
            project_only: false,
            thin_alias_policy: ThinAliasPolicy::Default,
            jobs: 1,
        }
    }
}

fn parse_path_maps(raw: &[String]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for pm in raw {
        match pm.split_once('=') {
            Some((old, new)) => out.push((old.to_string(), new.to_string())),
            None => tracing::warn!("--path-map ignored (invalid): {pm}"),
        }
    }
    out
}

fn sanitize_options(cfg: &FinderConfig) -> SanitizeOptions {
    SanitizeOptions {
        add_defaults: std::env::var("WRAPFINDER_ADD_DEFAULTS").as_deref() == Ok("1"),
        resource_dir: std::env::var_os("CLANG_RESOURCE_DIR").map(PathBuf::from),
        path_maps: parse_path_maps(&cfg.path_maps),
    }
}

const SYS_PREFIXES: &[&str] = &[
    "/usr/include",
    "/usr/local/include",
    "/usr/lib/clang",
    "/usr/lib/gcc",
    "/lib/clang",
    "/opt/homebrew/include",
    "/opt/local/include",
];

/// Project scope: an allow-list of roots, or a system-include deny-list
/// when no root could be determined.
struct ProjectScope {
    roots: Vec<PathBuf>,
}

impl ProjectScope {
    fn determine(cfg: &FinderConfig, files: &BTreeMap<PathBuf, Vec<String>>) -> Self {
        if !cfg.project_roots.is_empty() {
            let roots = cfg
                .project_roots
                .iter()
                .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
                .collect();
            return Self { roots };
        }
        if let Some(rr) = std::env::var_os("REPO_ROOT") {
            let rr = PathBuf::from(rr);
            if rr.exists() {
                let rr = rr.canonicalize().unwrap_or(rr);
                tracing::debug!("project scope from REPO_ROOT: {}", rr.display());
                return Self { roots: vec![rr] };
            }
        }
        // Infer the common ancestor of the sources.
        let dirs: Vec<&Path> = files.keys().filter_map(|p| p.parent()).collect();
        if let Some(common) = common_ancestor(&dirs) {
            let s = common.to_string_lossy();
            if s != "/" && s != "/home" && s != "/Users" {
                tracing::debug!("inferred project root: {}", common.display());
                return Self {
                    roots: vec![common],
                };
            }
        }
        Self { roots: Vec::new() }
    }

    fn contains(&self, path: &Path) -> bool {
        let rp = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !self.roots.is_empty() {
            return self.roots.iter().any(|root| rp.starts_with(root));
        }
        let s = rp.to_string_lossy();
        for pref in SYS_PREFIXES {
            if s.as_ref() == *pref || s.starts_with(&format!("{pref}/")) {
                return false;
            }
        }
        if s.contains("/lib/clang/") || s.starts_with("/usr/lib/llvm") {
            return false;
        }
        true
    }
}

fn common_ancestor(paths: &[&Path]) -> Option<PathBuf> {
    let first = paths.first()?;
    let mut common: PathBuf = first.to_path_buf();
    for p in &paths[1..] {
        while !p.starts_with(&common) {
            common = common.parent()?.to_path_buf();
        }
    }
    Some(common)
}

/// Parse a translation unit; on failure retry once with output pairs
/// stripped from the argument vector, then give up.
fn parse_translation_unit(src: &Path, args: &[String]) -> Result<SourceFile> {
    let attempt = SourceFile::parse_file(src);
    match attempt {
        Ok(sf) if !sf.is_empty_parse() => return Ok(sf),
        Ok(_) => tracing::warn!("initial parse produced no usable tree for {}", src.display()),
        Err(e) => tracing::warn!("initial parse failed for {}: {e}", src.display()),
    }

    let cleaned = strip_output_pairs(args);
    tracing::warn!("retrying {} with cleaned flags", src.display());
    let sf = SourceFile::parse_file(src)?;
    if sf.is_empty_parse() {
        return Err(Error::parse(
            src,
            format!("no usable tree after retry (args: {})", cleaned.join(" ")),
        ));
    }
    Ok(sf)
}

/// Per-translation-unit analysis output, merged under the driver.
#[derive(Default)]
struct TuOutput {
    rows: Vec<Row>,
    edges: Vec<Edge>,
}

fn narrow_targets(catalog: &mut ApiCatalog, cfg: &FinderConfig) {
    if cfg.only_libc {
        if !catalog.categories.is_empty() {
            catalog.target_names = catalog
                .categories
                .iter()
                .filter(|(cat, _)| cat.as_str() != "system_calls")
                .flat_map(|(_, vals)| vals.iter().cloned())
                .collect();
        } else {
            catalog.target_names = catalog.libc.clone();
        }
    } else if cfg.only_syscalls {
        if let Some(sys) = catalog.categories.get("system_calls") {
            catalog.target_names = sys.clone();
        } else {
            catalog.target_names = catalog.syscalls.clone();
        }
    }
}

fn analyze_translation_unit(
    src: &Path,
    args: &[String],
    catalog: &ApiCatalog,
    scope: &ProjectScope,
    cfg: &FinderConfig,
) -> Option<TuOutput> {
    tracing::debug!("processing {}", src.display());
    let sf = match parse_translation_unit(src, args) {
        Ok(sf) => sf,
        Err(e) => {
            tracing::error!("skipping translation unit: {e}");
            return None;
        }
    };

    let mut out = TuOutput::default();
    let index = sf.def_index();
    let res = CallResolver::new(&sf.text, &index);
    let func_file = sf
        .path
        .canonicalize()
        .unwrap_or_else(|_| sf.path.clone())
        .to_string_lossy()
        .into_owned();

    if scope.contains(&sf.path) {
        for def in sf.functions() {
            if let Some(row) = analyze_function(&sf, &res, def, &func_file, catalog, cfg) {
                out.rows.push(row);
            }
        }
    } else {
        tracing::debug!("skip out-of-project {}", func_file);
    }

    out.edges = collect_callgraph_for_tu(&sf);
    Some(out)
}

fn analyze_function(
    sf: &SourceFile,
    res: &CallResolver,
    def: Node,
    func_file: &str,
    catalog: &ApiCatalog,
    cfg: &FinderConfig,
) -> Option<Row> {
    let func_name = ast::fn_name(&sf.text, def)?.to_string();
    let (line, _) = ast::line_col(def);
    let func_loc = format!("{func_file}:{line}");

    let mut hit_locs_all_mode: Option<Vec<String>> = None;
    let mut total_hits_all_mode: Option<usize> = None;
    let mut fallback_api: Option<String> = None;

    let wa: WrapperAnalysis = match cfg.mode {
        Mode::Relaxed => analyze_wrapper_relaxed(res, def, catalog),
        Mode::Accurate => analyze_wrapper_strict_plus(res, def, catalog, cfg.thin_alias_policy),
        Mode::All => {
            let mut apis = Vec::new();
            let mut locs = Vec::new();
            for (call, loc) in collect_target_calls(res, def, &catalog.target_names) {
                if let Some(nm) = resolve_target_name_for_call(res, call, &catalog.target_names) {
                    apis.push(nm);
                    locs.push(loc);
                }
            }
            total_hits_all_mode = Some(apis.len());
            hit_locs_all_mode = Some(locs);
            fallback_api = apis.first().cloned();
            if apis.is_empty() {
                WrapperAnalysis {
                    keep: true,
                    per_path_single: true,
                    reason: "N/A".to_string(),
                    ..WrapperAnalysis::default()
                }
            } else {
                analyze_wrapper_strict_plus(res, def, catalog, cfg.thin_alias_policy)
            }
        }
    };

    let api_name = wa.api_called.clone().or(fallback_api);
    let total_hits = total_hits_all_mode.unwrap_or(wa.total_hits);
    let hit_locs = hit_locs_all_mode.unwrap_or_else(|| wa.hit_locs.clone());

    if matches!(cfg.mode, Mode::Relaxed | Mode::Accurate) {
        let api_in_targets = api_name
            .as_deref()
            .is_some_and(|nm| catalog.target_names.contains(nm));
        if !wa.keep || total_hits == 0 || !api_in_targets {
            return None;
        }
    }

    let no_api_in_all_mode = cfg.mode == Mode::All && api_name.is_none();
    let is_thin = api_name
        .as_deref()
        .is_some_and(|nm| catalog.thin_aliases.contains(nm));

    let category = match &api_name {
        Some(nm) => catalog.category_of(nm).to_string(),
        None => "N/A".to_string(),
    };

    let (arg_pass, ret_pass) = if no_api_in_all_mode {
        ("N/A".to_string(), "N/A".to_string())
    } else {
        let matching: Vec<Node> = collect_target_calls(res, def, &catalog.target_names)
            .into_iter()
            .filter(|(call, _)| {
                resolve_target_name_for_call(res, *call, &catalog.target_names).as_deref()
                    == api_name.as_deref()
            })
            .map(|(call, _)| call)
            .collect();
        compute_arg_ret_pass(res, def, &matching)
    };

    Some(Row {
        file: func_file.to_string(),
        function: func_name,
        function_key: Some(ast::function_key(&sf.text, &sf.path, def)),
        api_called: match &api_name {
            Some(nm) => nm.clone(),
            None if no_api_in_all_mode => "other".to_string(),
            None => String::new(),
        },
        category,
        total_target_calls: total_hits,
        hit_locs,
        per_path_single: wa.per_path_single,
        derived_from_params: if no_api_in_all_mode {
            false
        } else {
            wa.derived_from_params
        },
        derivation_trace: wa.derivation_trace,
        reason: if no_api_in_all_mode {
            "N/A".to_string()
        } else {
            wa.reason
        },
        function_loc: Some(func_loc),
        pair_used: wa.pair_used,
        via_helper_hop: wa.via_helper_hop,
        ignored_helpers: wa.ignored_helpers,
        family: if is_thin {
            "thin_alias".to_string()
        } else {
            "-".to_string()
        },
        is_thin_alias: is_thin,
        arg_pass,
        ret_pass,
        ..Row::default()
    })
}

/// Backfill fan-in/fan-out and callee names from the merged edge list.
/// When key resolution failed and a row's function name is unique across
/// the run, degrees are salvaged from edges carrying that textual name.
fn apply_callgraph_degrees(rows: &mut [Row], edges: &[Edge]) {
    let mut callers_by_callee: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut callees_by_caller: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut callee_names_by_caller_key: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    let mut unres_callers_by_callee_name: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut unres_callees_by_caller_name: HashMap<&str, BTreeSet<&str>> = HashMap::new();

    for e in edges {
        callers_by_callee
            .entry(&e.callee_key)
            .or_default()
            .insert(&e.caller_key);
        callees_by_caller
            .entry(&e.caller_key)
            .or_default()
            .insert(&e.callee_key);
        if !e.callee.is_empty() {
            callee_names_by_caller_key
                .entry(&e.caller_key)
                .or_default()
                .insert(&e.callee);
        }
        if e.callee_key.ends_with("@<unknown>") && !e.callee.is_empty() && !e.caller.is_empty() {
            unres_callers_by_callee_name
                .entry(&e.callee)
                .or_default()
                .insert(&e.caller);
        }
        if e.caller_key.ends_with("@<unknown>") && !e.caller.is_empty() && !e.callee.is_empty() {
            unres_callees_by_caller_name
                .entry(&e.caller)
                .or_default()
                .insert(&e.callee);
        }
    }

    let mut name_frequency: HashMap<String, usize> = HashMap::new();
    for r in rows.iter() {
        *name_frequency.entry(r.function.clone()).or_default() += 1;
    }
    let unique = |name: &str| name_frequency.get(name).copied() == Some(1);

    // Row mutation needs owned lookups; resolve through cloned keys.
    for i in 0..rows.len() {
        let key = rows[i]
            .function_key
            .clone()
            .unwrap_or_else(|| rows[i].function.clone());
        let name = rows[i].function.clone();

        let mut fan_in = callers_by_callee
            .get(key.as_str())
            .map(HashSet::len)
            .unwrap_or(0);
        let mut fan_out = callees_by_caller
            .get(key.as_str())
            .map(HashSet::len)
            .unwrap_or(0);
        if fan_in == 0 && unique(&name) {
            fan_in = unres_callers_by_callee_name
                .get(name.as_str())
                .map(HashSet::len)
                .unwrap_or(0);
        }
        if fan_out == 0 && unique(&name) {
            fan_out = unres_callees_by_caller_name
                .get(name.as_str())
                .map(BTreeSet::len)
                .unwrap_or(0);
        }

        let mut callees: Vec<String> = callee_names_by_caller_key
            .get(key.as_str())
            .map(|s| s.iter().map(|n| n.to_string()).collect())
            .unwrap_or_default();
        if callees.is_empty() && unique(&name) {
            callees = unres_callees_by_caller_name
                .get(name.as_str())
                .map(|s| s.iter().map(|n| n.to_string()).collect())
                .unwrap_or_default();
        }

        rows[i].fan_in = fan_in;
        rows[i].fan_out = fan_out;
        rows[i].callees = callees;
    }
}

fn log_summary(files: usize, rows: &[Row], edges: &[Edge]) {
    tracing::info!(
        "run metrics: files={files} rows={} edges={}",
        rows.len(),
        edges.len()
    );

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut callers: HashMap<&str, HashSet<&str>> = HashMap::new();
    for e in edges {
        *counts.entry(&e.callee_key).or_default() += 1;
        callers.entry(&e.callee_key).or_default().insert(&e.caller_key);
    }
    let mut top: Vec<(&str, usize)> = counts.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    for (key, n) in top.into_iter().take(10) {
        let uniq = callers.get(key).map(HashSet::len).unwrap_or(0);
        tracing::info!("top callee {key}: total_calls={n} unique_callers={uniq}");
    }

    let mut by_fan_in: Vec<&Row> = rows.iter().collect();
    by_fan_in.sort_by(|a, b| b.fan_in.cmp(&a.fan_in).then_with(|| a.function.cmp(&b.function)));
    for r in by_fan_in.into_iter().take(10) {
        tracing::info!(
            "top candidate {}: fan_in={} fan_out={}",
            r.function,
            r.fan_in,
            r.fan_out
        );
    }
}

/// Run the finder end to end. Returns the output path when rows were
/// written to a file.
pub fn run_finder(cfg: &FinderConfig) -> Result<Option<PathBuf>> {
    let opts = sanitize_options(cfg);

    let out = match &cfg.out_dir {
        Some(dir) => dir
            .join(cfg.output.default_file_name())
            .to_string_lossy()
            .into_owned(),
        None => cfg.out.clone(),
    };

    let entries = load_compile_commands(&cfg.compile_commands)?;
    let file_to_args = build_file_to_args_map(&entries, &opts);
    let scope = ProjectScope::determine(cfg, &file_to_args);

    if cfg.callgraph_only {
        let Some(cg_out) = &cfg.callgraph_out else {
            return Err(Error::usage(
                "--callgraph-only requires --callgraph-out".to_string(),
            ));
        };
        let mut edges: Vec<Edge> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (src, args) in &file_to_args {
            match parse_translation_unit(src, args) {
                Ok(sf) => {
                    for e in collect_callgraph_for_tu(&sf) {
                        if seen.insert(e.loc.clone()) {
                            edges.push(e);
                        }
                    }
                }
                Err(e) => tracing::error!("skipping translation unit: {e}"),
            }
        }
        write_callgraph(cg_out, &edges)?;
        tracing::info!("files={} edges={}", file_to_args.len(), edges.len());
        return Ok(None);
    }

    let Some(catalog_path) = &cfg.catalog_path else {
        return Err(Error::usage(
            "--catalog is required unless --callgraph-only is specified".to_string(),
        ));
    };
    if cfg.only_libc && cfg.only_syscalls {
        return Err(Error::usage(
            "--only-libc and --only-syscalls cannot be used together".to_string(),
        ));
    }

    let mut catalog = load_api_catalog(catalog_path)?;
    if catalog.target_names.is_empty() {
        return Err(Error::catalog(
            catalog_path,
            "no APIs loaded; expected 'categories' (preferred) or legacy 'libc'/'syscalls'",
        ));
    }
    narrow_targets(&mut catalog, cfg);

    if !is_stdout(&out) {
        let out_path = PathBuf::from(&out);
        if out_path.is_dir() {
            return Err(Error::usage(format!(
                "output path is a directory; provide a file path: {out}"
            )));
        }
        prepare_output_location(&out_path, false)?;
    }

    let units: Vec<(&Path, &[String])> = file_to_args
        .iter()
        .map(|(p, a)| (p.as_path(), a.as_slice()))
        .collect();
    let outputs: Vec<Option<TuOutput>> = if cfg.jobs <= 1 {
        units
            .iter()
            .map(|&(src, args)| analyze_translation_unit(src, args, &catalog, &scope, cfg))
            .collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.jobs)
            .build()
            .map_err(|e| Error::other(format!("failed to build worker pool: {e}")))?;
        pool.install(|| {
            units
                .par_iter()
                .map(|&(src, args)| analyze_translation_unit(src, args, &catalog, &scope, cfg))
                .collect()
        })
    };

    let mut rows: Vec<Row> = Vec::new();
    let mut all_edges: Vec<Edge> = Vec::new();
    let mut seen_keys: HashSet<(String, String, String)> = HashSet::new();
    for tu in outputs.into_iter().flatten() {
        for row in tu.rows {
            let api_or_other = if row.api_called.is_empty() {
                "other".to_string()
            } else {
                row.api_called.clone()
            };
            let key = (
                row.function.clone(),
                row.function_loc.clone().unwrap_or_default(),
                api_or_other,
            );
            if seen_keys.insert(key) {
                rows.push(row);
            }
        }
        all_edges.extend(tu.edges);
    }

    apply_callgraph_degrees(&mut rows, &all_edges);

    if let Some(cg_out) = &cfg.callgraph_out {
        write_callgraph(cg_out, &all_edges)?;
        tracing::debug!(
            "wrote callgraph to {} (edges={})",
            cg_out.display(),
            all_edges.len()
        );
    }

    match cfg.output {
        OutputFormat::Csv => write_rows_csv(&rows, &out, cfg.all_columns)?,
        OutputFormat::Json => write_rows_json(&rows, &out)?,
        OutputFormat::Jsonl => write_rows_jsonl(&rows, &out)?,
    }

    log_summary(file_to_args.len(), &rows, &all_edges);

    if is_stdout(&out) {
        Ok(None)
    } else {
        Ok(Some(PathBuf::from(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(caller_key: &str, callee_key: &str, caller: &str, callee: &str, loc: &str) -> Edge {
        Edge {
            caller_key: caller_key.to_string(),
            callee_key: callee_key.to_string(),
            caller: caller.to_string(),
            callee: callee.to_string(),
            loc: loc.to_string(),
        }
    }

    #[test]
    fn degrees_come_from_resolved_keys() {
        let mut rows = vec![
            Row {
                function: "w".to_string(),
                function_key: Some("w@/p/a.c:3".to_string()),
                ..Row::default()
            },
        ];
        let edges = vec![
            edge("main@/p/a.c:10", "w@/p/a.c:3", "main", "w", "/p/a.c:11:5"),
            edge("other@/p/b.c:4", "w@/p/a.c:3", "other", "w", "/p/b.c:5:5"),
            edge("w@/p/a.c:3", "close@<unknown>", "w", "close", "/p/a.c:4:12"),
        ];
        apply_callgraph_degrees(&mut rows, &edges);
        assert_eq!(rows[0].fan_in, 2);
        assert_eq!(rows[0].fan_out, 1);
        assert_eq!(rows[0].callees, vec!["close".to_string()]);
    }

    #[test]
    fn unique_name_salvages_unresolved_fan_in() {
        let mut rows = vec![Row {
            function: "w".to_string(),
            function_key: Some("w@/p/a.c:3".to_string()),
            ..Row::default()
        }];
        // Caller in another unit saw only a declaration; its edge carries
        // an unresolved callee key with the same textual name.
        let edges = vec![edge(
            "main@/p/b.c:10",
            "w@<unknown>",
            "main",
            "w",
            "/p/b.c:11:5",
        )];
        apply_callgraph_degrees(&mut rows, &edges);
        assert_eq!(rows[0].fan_in, 1);
    }

    #[test]
    fn duplicate_names_do_not_salvage() {
        let mut rows = vec![
            Row {
                function: "w".to_string(),
                function_key: Some("w@/p/a.c:3".to_string()),
                ..Row::default()
            },
            Row {
                function: "w".to_string(),
                function_key: Some("w@/p/b.c:3".to_string()),
                ..Row::default()
            },
        ];
        let edges = vec![edge(
            "main@/p/c.c:10",
            "w@<unknown>",
            "main",
            "w",
            "/p/c.c:11:5",
        )];
        apply_callgraph_degrees(&mut rows, &edges);
        assert_eq!(rows[0].fan_in, 0);
        assert_eq!(rows[1].fan_in, 0);
    }

    #[test]
    fn common_ancestor_of_paths() {
        let a = Path::new("/p/src/net");
        let b = Path::new("/p/src/io");
        let c = Path::new("/p/lib");
        assert_eq!(
            common_ancestor(&[a, b]),
            Some(PathBuf::from("/p/src"))
        );
        assert_eq!(common_ancestor(&[a, b, c]), Some(PathBuf::from("/p")));
        assert_eq!(common_ancestor(&[]), None);
    }

    #[test]
    fn path_maps_parse_and_warn() {
        let maps = parse_path_maps(&[
            "/old=/new".to_string(),
            "invalid-entry".to_string(),
        ]);
        assert_eq!(maps, vec![("/old".to_string(), "/new".to_string())]);
    }
}
