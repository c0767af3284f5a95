//! Callgraph extraction and CSV output.

use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use crate::ast::{
    self, NodeKind, SourceFile, classify, fn_body, named_children,
};
use crate::error::Result;
use crate::models::Edge;

/// Collect call edges for a single translation unit, one edge per call
/// site. Callees resolve to a definition key when one is visible in this
/// unit, otherwise to `<name>@<unknown>`.
pub fn collect_callgraph_for_tu(sf: &SourceFile) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let index = sf.def_index();

    for def in sf.functions() {
        let Some(body) = fn_body(def) else {
            continue;
        };
        let caller_key = ast::function_key(&sf.text, &sf.path, def);
        let caller_name = ast::caller_name(&sf.text, def);

        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            for child in named_children(node) {
                if classify(child) == NodeKind::Call {
                    let callee_name = ast::call_name(&sf.text, child)
                        .unwrap_or("<indirect>")
                        .to_string();
                    let callee_key = match ast::callee_definition(&index, &sf.text, child) {
                        Some(callee_def) => ast::function_key(&sf.text, &sf.path, callee_def),
                        None => format!("{callee_name}@<unknown>"),
                    };
                    let loc = ast::callsite_loc(&sf.path, child);
                    if seen.insert(loc.clone()) {
                        edges.push(Edge {
                            caller_key: caller_key.clone(),
                            callee_key,
                            caller: caller_name.clone(),
                            callee: callee_name,
                            loc,
                        });
                    }
                }
                stack.push(child);
            }
        }
    }

    edges
}

/// Deduplicate edges globally by `(callsite, caller_key, callee_key)`.
pub fn dedup_edges(edges: &[Edge]) -> Vec<Edge> {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mut out = Vec::new();
    for e in edges {
        let key = (e.loc.clone(), e.caller_key.clone(), e.callee_key.clone());
        if seen.insert(key) {
            out.push(e.clone());
        }
    }
    out
}

/// Write `callgraph_edges.csv` and `call_counts.csv` into `outputs_dir`.
pub fn write_callgraph(outputs_dir: &Path, edges: &[Edge]) -> Result<()> {
    std::fs::create_dir_all(outputs_dir)?;
    let deduped = dedup_edges(edges);

    let mut w = csv::Writer::from_path(outputs_dir.join("callgraph_edges.csv"))?;
    w.write_record(["caller", "caller_key", "callee", "callee_key", "callsite"])?;
    for e in &deduped {
        w.write_record([&e.caller, &e.caller_key, &e.callee, &e.callee_key, &e.loc])?;
    }
    w.flush()?;

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut callers_by_callee: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut callee_name_by_key: BTreeMap<String, String> = BTreeMap::new();
    for e in &deduped {
        if e.callee_key.is_empty() {
            continue;
        }
        *counts.entry(e.callee_key.clone()).or_default() += 1;
        if !e.caller_key.is_empty() {
            callers_by_callee
                .entry(e.callee_key.clone())
                .or_default()
                .insert(e.caller_key.clone());
        }
        if !e.callee.is_empty() {
            callee_name_by_key
                .entry(e.callee_key.clone())
                .or_insert_with(|| e.callee.clone());
        }
    }

    let mut w = csv::Writer::from_path(outputs_dir.join("call_counts.csv"))?;
    w.write_record([
        "callee_name",
        "callee_key",
        "total_calls",
        "unique_caller_count",
        "callers",
    ])?;
    let items = counts
        .iter()
        .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (callee_key, n) in items {
        let callers = callers_by_callee.get(callee_key).cloned().unwrap_or_default();
        let record: Vec<String> = vec![
            callee_name_by_key.get(callee_key).cloned().unwrap_or_default(),
            callee_key.clone(),
            n.to_string(),
            callers.len().to_string(),
            callers.iter().join(";"),
        ];
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> SourceFile {
        SourceFile::parse("/tmp/cg.c", src).expect("parse")
    }

    #[test]
    fn edges_resolve_local_definitions() {
        let sf = parse(
            r#"
static int helper(int x) { return x + 1; }
int outer(int x) { return helper(close(x)); }
"#,
        );
        let edges = collect_callgraph_for_tu(&sf);
        assert_eq!(edges.len(), 2);

        let helper_edge = edges
            .iter()
            .find(|e| e.callee == "helper")
            .expect("helper edge");
        assert!(helper_edge.callee_key.contains("helper@"));
        assert!(!helper_edge.callee_key.ends_with("@<unknown>"));
        assert!(helper_edge.caller_key.contains("outer@"));

        let close_edge = edges
            .iter()
            .find(|e| e.callee == "close")
            .expect("close edge");
        assert_eq!(close_edge.callee_key, "close@<unknown>");
    }

    #[test]
    fn one_edge_per_callsite() {
        let sf = parse("void w(int fd) { close(fd); close(fd); }");
        let edges = collect_callgraph_for_tu(&sf);
        assert_eq!(edges.len(), 2);
        assert_ne!(edges[0].loc, edges[1].loc);
    }

    #[test]
    fn global_dedup_by_callsite_and_keys() {
        let sf = parse("void w(int fd) { close(fd); }");
        let mut edges = collect_callgraph_for_tu(&sf);
        edges.extend(collect_callgraph_for_tu(&sf));
        assert_eq!(edges.len(), 2);
        assert_eq!(dedup_edges(&edges).len(), 1);
    }

    #[test]
    fn writes_both_tables() {
        let sf = parse(
            r#"
void a(int fd) { close(fd); }
void b(int fd) { close(fd); }
"#,
        );
        let edges = collect_callgraph_for_tu(&sf);
        let dir = tempfile::tempdir().expect("tempdir");
        write_callgraph(dir.path(), &edges).expect("write");

        let counts =
            std::fs::read_to_string(dir.path().join("call_counts.csv")).expect("read counts");
        let line = counts
            .lines()
            .find(|l| l.starts_with("close"))
            .expect("close row");
        assert!(line.contains(",2,2,"));

        let edges_csv =
            std::fs::read_to_string(dir.path().join("callgraph_edges.csv")).expect("read edges");
        assert!(edges_csv.starts_with("caller,caller_key,callee,callee_key,callsite"));
        assert_eq!(edges_csv.lines().count(), 3);
    }
}
