//! Wrapper detection logic (accurate/relaxed).

use itertools::Itertools;
use std::collections::{BTreeSet, HashSet};
use tree_sitter::Node;

use crate::analysis::{
    CallResolver, analyze_stmt, call_hits_target_via_n_hops, call_hits_target_via_one_hop,
    collect_target_calls, has_early_guard_return, inner_target_from_one_hop, is_any_helper_call,
    is_atomic_pair, resolve_syscall_indirection,
};
use crate::ast::{NodeKind, classify, fn_body, hit_loc, named_children};
use crate::catalog::ApiCatalog;
use crate::provenance::check_arguments_provenance;

/// Policy for targets listed under the catalog's thin-alias category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinAliasPolicy {
    /// Require a direct call; reject when reached only via a helper.
    #[default]
    Default,
    /// Same as `Default`, spelled explicitly.
    DirectOnly,
    /// Permit exactly one helper hop; reject deeper chains.
    Allow1Hop,
}

/// Verdict of one wrapper decision over a function definition.
#[derive(Debug, Clone, Default)]
pub struct WrapperAnalysis {
    pub keep: bool,
    pub per_path_single: bool,
    pub total_hits: usize,
    pub reason: String,
    pub hit_locs: Vec<String>,
    pub api_called: Option<String>,
    pub derived_from_params: bool,
    pub derivation_trace: Vec<String>,
    pub pair_used: bool,
    pub via_helper_hop: bool,
    pub ignored_helpers: Vec<String>,
}

impl WrapperAnalysis {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }
}

/// Call evidence gathered from a function body in document order.
#[derive(Debug, Default)]
struct CallEvidence {
    apis: Vec<String>,
    hit_locs: Vec<String>,
    ignored_helpers: BTreeSet<String>,
    via_helper_hop: bool,
    via_hop_depth_ge2: bool,
}

fn walk_calls(
    res: &CallResolver,
    node: Node,
    catalog: &ApiCatalog,
    ev: &mut CallEvidence,
) {
    let targets = &catalog.target_names;
    for child in named_children(node) {
        if classify(child) == NodeKind::Call {
            if is_any_helper_call(res, child, &catalog.helpers) {
                let name = res.callee_name(child).unwrap_or("<anon>");
                ev.ignored_helpers.insert(name.to_string());
            } else if let Some(nm) = res.callee_name(child).filter(|nm| targets.contains(*nm)) {
                ev.apis.push(nm.to_string());
                ev.hit_locs.push(hit_loc(child));
            } else if let Some(mapped) =
                resolve_syscall_indirection(res, child).filter(|nm| targets.contains(nm))
            {
                ev.apis.push(mapped);
                ev.hit_locs.push(hit_loc(child));
            } else if call_hits_target_via_one_hop(res, child, targets) {
                ev.via_helper_hop = true;
                if let Some(inner) = inner_target_from_one_hop(res, child, targets) {
                    ev.apis.push(inner);
                }
                ev.hit_locs.push(hit_loc(child));
            } else if call_hits_target_via_n_hops(res, child, targets, 2, &mut HashSet::new()) {
                ev.via_helper_hop = true;
                ev.via_hop_depth_ge2 = true;
                if let Some(inner) = inner_target_from_one_hop(res, child, targets) {
                    ev.apis.push(inner);
                }
                ev.hit_locs.push(hit_loc(child));
            }
        }
        walk_calls(res, child, catalog, ev);
    }
}

fn format_counts(counts: &BTreeSet<u8>) -> String {
    format!("[{}]", counts.iter().join(", "))
}

/// Low-false-positive decision: single target call per path, with narrowly
/// scoped exceptions for early guards and atomic pairs.
pub fn analyze_wrapper_strict_plus(
    res: &CallResolver,
    def: Node,
    catalog: &ApiCatalog,
    thin_policy: ThinAliasPolicy,
) -> WrapperAnalysis {
    let targets = &catalog.target_names;
    let helpers = &catalog.helpers;

    let Some(body) = fn_body(def) else {
        return WrapperAnalysis::rejected("no-body");
    };

    let pr = analyze_stmt(res, body, targets, helpers, 2);
    if pr.unknown {
        return WrapperAnalysis::rejected("unknown-control-flow");
    }

    let max_pos = pr.counts.iter().max().copied().unwrap_or(0);
    let guard_ok = pr.counts.contains(&0) && has_early_guard_return(res, def, helpers);
    if pr.counts.contains(&0) && !guard_ok {
        return WrapperAnalysis::rejected(format!("path-counts={}", format_counts(&pr.counts)));
    }

    let mut ev = CallEvidence::default();
    walk_calls(res, body, catalog, &mut ev);
    let ignored_helpers: Vec<String> = ev.ignored_helpers.iter().cloned().collect();

    let total_hits = ev.hit_locs.len();
    if total_hits == 0 {
        return WrapperAnalysis {
            reason: "no-calls".to_string(),
            via_helper_hop: ev.via_helper_hop,
            ignored_helpers,
            ..WrapperAnalysis::default()
        };
    }

    if let Some(first_api) = ev.apis.first() {
        if catalog.thin_aliases.contains(first_api) {
            let reject = match thin_policy {
                ThinAliasPolicy::Default | ThinAliasPolicy::DirectOnly => ev
                    .via_helper_hop
                    .then_some("reject: thin-alias-via-helper"),
                ThinAliasPolicy::Allow1Hop => ev
                    .via_hop_depth_ge2
                    .then_some("reject: thin-alias-hop-depth>=2"),
            };
            if let Some(reason) = reject {
                return WrapperAnalysis {
                    total_hits,
                    reason: reason.to_string(),
                    hit_locs: ev.hit_locs,
                    api_called: Some(first_api.clone()),
                    via_helper_hop: ev.via_helper_hop,
                    ignored_helpers,
                    ..WrapperAnalysis::default()
                };
            }
        }
    }

    let mut pair_used = false;
    if max_pos >= 2 {
        if total_hits == 2 && is_atomic_pair(&ev.apis) {
            pair_used = true;
        } else {
            return WrapperAnalysis {
                total_hits,
                reason: "reject: multi-call-per-path".to_string(),
                hit_locs: ev.hit_locs,
                api_called: ev.apis.first().cloned(),
                via_helper_hop: ev.via_helper_hop,
                ignored_helpers,
                ..WrapperAnalysis::default()
            };
        }
    }

    let counted_sites: Vec<Node> = collect_target_calls(res, def, targets)
        .into_iter()
        .map(|(c, _)| c)
        .collect();
    let (derived_ok, derivation_trace) =
        check_arguments_provenance(res, def, &counted_sites, helpers);

    let mut reason = "ok".to_string();
    if guard_ok {
        reason.push_str("+ok-guard");
    }
    if ev.via_helper_hop {
        reason.push_str("+via-hop");
    }
    if pair_used {
        reason.push_str("+atomic-pair");
    }

    WrapperAnalysis {
        keep: true,
        per_path_single: true,
        total_hits,
        reason,
        api_called: ev.apis.first().cloned(),
        hit_locs: ev.hit_locs,
        derived_from_params: derived_ok,
        derivation_trace,
        pair_used,
        via_helper_hop: ev.via_helper_hop,
        ignored_helpers,
    }
}

/// Higher-recall decision: any function with a target call on some path is
/// kept; guard, pair, thin-alias, and provenance checks are skipped.
pub fn analyze_wrapper_relaxed(
    res: &CallResolver,
    def: Node,
    catalog: &ApiCatalog,
) -> WrapperAnalysis {
    let targets = &catalog.target_names;

    let Some(body) = fn_body(def) else {
        return WrapperAnalysis::rejected("no-body");
    };

    let pr = analyze_stmt(res, body, targets, &catalog.helpers, 2);
    if !pr.counts.iter().any(|&c| c > 0) {
        return WrapperAnalysis::rejected("no-calls");
    }

    let mut apis = Vec::new();
    let mut hit_locs = Vec::new();
    for (call, loc) in collect_target_calls(res, def, targets) {
        if let Some(nm) = crate::analysis::resolve_target_name_for_call(res, call, targets) {
            apis.push(nm);
            hit_locs.push(loc);
        }
    }
    if apis.is_empty() {
        return WrapperAnalysis::rejected("no-calls");
    }

    let per_path_single = pr.counts.iter().all(|&c| c <= 1);
    WrapperAnalysis {
        keep: true,
        per_path_single,
        total_hits: hit_locs.len(),
        reason: "ok".to_string(),
        api_called: apis.first().cloned(),
        hit_locs,
        derived_from_params: true,
        derivation_trace: Vec::new(),
        ..WrapperAnalysis::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceFile;
    use crate::catalog::ApiCatalog;

    fn catalog(targets: &[&str]) -> ApiCatalog {
        let mut cat = ApiCatalog::default();
        cat.target_names = targets.iter().map(|s| s.to_string()).collect();
        cat
    }

    fn strict(src: &str, cat: &ApiCatalog) -> WrapperAnalysis {
        let sf = SourceFile::parse("/tmp/t.c", src).expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        let def = *sf.functions().last().expect("function");
        analyze_wrapper_strict_plus(&res, def, cat, ThinAliasPolicy::Default)
    }

    fn relaxed(src: &str, cat: &ApiCatalog) -> WrapperAnalysis {
        let sf = SourceFile::parse("/tmp/t.c", src).expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        let def = *sf.functions().last().expect("function");
        analyze_wrapper_relaxed(&res, def, cat)
    }

    #[test]
    fn accepts_direct_forwarder() {
        let cat = catalog(&["close"]);
        let a = strict("int w(int fd) { return close(fd); }", &cat);
        assert!(a.keep);
        assert_eq!(a.api_called.as_deref(), Some("close"));
        assert_eq!(a.reason, "ok");
        assert!(a.per_path_single);
        assert!(!a.via_helper_hop);
        assert_eq!(a.total_hits, 1);
    }

    #[test]
    fn accepts_guarded_forwarder_with_guard_suffix() {
        let cat = catalog(&["close"]);
        let a = strict(
            "int w(int fd) { if (fd < 0) return -1; return close(fd); }",
            &cat,
        );
        assert!(a.keep);
        assert!(a.reason.contains("ok-guard"));
    }

    #[test]
    fn rejects_zero_path_without_guard() {
        let cat = catalog(&["close"]);
        let a = strict(
            "int w(int fd) { if (fd > 0) close(fd); bookkeeping(); }",
            &cat,
        );
        assert!(!a.keep);
        assert_eq!(a.reason, "path-counts=[0, 1]");
    }

    #[test]
    fn rejects_loop_as_multi_call() {
        let cat = catalog(&["close"]);
        let a = strict(
            "int w(int fd) { for (int i = 0; i < 10; i++) close(fd); return 0; }",
            &cat,
        );
        assert!(!a.keep);
        assert_eq!(a.reason, "reject: multi-call-per-path");

        let r = relaxed(
            "int w(int fd) { for (int i = 0; i < 10; i++) close(fd); return 0; }",
            &cat,
        );
        assert!(r.keep);
        assert!(!r.per_path_single);
    }

    #[test]
    fn accepts_atomic_pair() {
        let cat = catalog(&["pthread_mutex_lock", "pthread_mutex_unlock"]);
        let a = strict(
            r#"
void w(int fd) {
    pthread_mutex_lock(&m);
    pthread_mutex_unlock(&m);
}
"#,
            &cat,
        );
        assert!(a.keep);
        assert!(a.pair_used);
        assert_eq!(a.total_hits, 2);
        assert!(a.reason.contains("atomic-pair"));
    }

    #[test]
    fn rejects_unpaired_double_call() {
        let cat = catalog(&["close"]);
        let a = strict(
            "void w(int a, int b) { close(a); close(b); }",
            &cat,
        );
        assert!(!a.keep);
        assert_eq!(a.reason, "reject: multi-call-per-path");
    }

    #[test]
    fn benign_helper_is_recorded_not_counted() {
        let mut cat = catalog(&["close"]);
        cat.helpers.benign.insert("log".to_string());
        let a = strict(
            "int w(int fd) { int r = close(fd); log(r); return r; }",
            &cat,
        );
        assert!(a.keep);
        assert!(a.per_path_single);
        assert_eq!(a.ignored_helpers, vec!["log".to_string()]);
    }

    #[test]
    fn syscall_indirection_names_the_target() {
        let cat = catalog(&["openat"]);
        let a = strict(
            r#"int w(int a) { return syscall(SYS_openat, a, "x", 0); }"#,
            &cat,
        );
        assert!(a.keep);
        assert_eq!(a.api_called.as_deref(), Some("openat"));
    }

    #[test]
    fn hop_forwarder_sets_via_helper_hop() {
        let cat = catalog(&["close"]);
        let a = strict(
            r#"
static void do_close(int fd) { close(fd); }
int w(int fd) { do_close(fd); return 0; }
"#,
            &cat,
        );
        assert!(a.keep);
        assert!(a.via_helper_hop);
        assert!(a.reason.contains("via-hop"));
        assert_eq!(a.api_called.as_deref(), Some("close"));
    }

    #[test]
    fn thin_alias_rejects_hop_under_default_policy() {
        let mut cat = catalog(&["close"]);
        cat.thin_aliases.insert("close".to_string());
        let src = r#"
static void do_close(int fd) { close(fd); }
int w(int fd) { do_close(fd); return 0; }
"#;
        let a = strict(src, &cat);
        assert!(!a.keep);
        assert_eq!(a.reason, "reject: thin-alias-via-helper");

        // One hop is fine under the permissive policy.
        let sf = SourceFile::parse("/tmp/t.c", src).expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        let def = *sf.functions().last().expect("function");
        let a = analyze_wrapper_strict_plus(&res, def, &cat, ThinAliasPolicy::Allow1Hop);
        assert!(a.keep);
    }

    #[test]
    fn no_body_is_rejected() {
        let cat = catalog(&["close"]);
        let sf = SourceFile::parse("/tmp/t.c", "int w(int fd);").expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        let decl = crate::ast::named_children(sf.root())[0];
        let a = analyze_wrapper_strict_plus(&res, decl, &cat, ThinAliasPolicy::Default);
        assert!(!a.keep);
        assert_eq!(a.reason, "no-body");
    }
}
