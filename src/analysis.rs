//! Path analysis and target call detection.
//!
//! The per-path counter computes, for a statement, the set of possible
//! target-call counts along some execution path, saturated at 2. Early
//! returns terminate their path, so a guarded wrapper contributes both a
//! zero-count path and a one-count path.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::OnceLock;
use tree_sitter::Node;

use crate::ast::{
    self, NodeKind, call_args, call_name, classify, fn_body, named_children, unwrap_stmt,
};
use crate::catalog::{HelperConfig, HelperKind};

/// Per-path counts saturate at this value; 2 means "two or more".
pub const SATURATION_CAP: u8 = 2;

/// Helper bodies with more than this many non-declaration top-level
/// statements are never explored during hop resolution.
const SMALL_FN_MAX_STMTS: usize = 6;

/// Result of the per-path counter for one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResult {
    /// Possible target-call counts over paths through the statement.
    pub counts: BTreeSet<u8>,
    /// True when a loop body saturated; the counts are then a floor.
    pub unknown: bool,
}

/// Per-translation-unit context for resolving callees.
pub struct CallResolver<'a, 't> {
    pub source: &'a str,
    pub index: &'a BTreeMap<String, Node<'t>>,
}

impl<'a, 't> CallResolver<'a, 't> {
    pub fn new(source: &'a str, index: &'a BTreeMap<String, Node<'t>>) -> Self {
        Self { source, index }
    }

    pub fn callee_name(&self, call: Node) -> Option<&'a str> {
        call_name(self.source, call)
    }

    pub fn callee_definition(&self, call: Node) -> Option<Node<'t>> {
        ast::callee_definition(self.index, self.source, call)
    }
}

/// True when the call's name matches the given helper family.
pub fn is_helper_call(
    res: &CallResolver,
    call: Node,
    helpers: &HelperConfig,
    kind: HelperKind,
) -> bool {
    let name = res.callee_name(call).unwrap_or("");
    helpers.any_match(name, kind)
}

/// True when the call's name matches either helper family.
pub fn is_any_helper_call(res: &CallResolver, call: Node, helpers: &HelperConfig) -> bool {
    is_helper_call(res, call, helpers, HelperKind::Benign)
        || is_helper_call(res, call, helpers, HelperKind::Helpers)
}

/// Direct child calls of a function body, with statement wrappers peeled.
fn body_child_calls<'t>(body: Node<'t>) -> Vec<Node<'t>> {
    named_children(body)
        .into_iter()
        .map(unwrap_stmt)
        .filter(|n| classify(*n) == NodeKind::Call)
        .collect()
}

/// Conservative one-hop check: the call resolves to a function whose body
/// directly calls a target.
pub fn call_hits_target_via_one_hop(
    res: &CallResolver,
    call: Node,
    targets: &BTreeSet<String>,
) -> bool {
    let Some(callee) = res.callee_definition(call) else {
        return false;
    };
    let Some(body) = fn_body(callee) else {
        return false;
    };
    body_child_calls(body)
        .into_iter()
        .any(|c| res.callee_name(c).is_some_and(|nm| targets.contains(nm)))
}

fn is_small_function(def: Node) -> bool {
    let Some(body) = fn_body(def) else {
        return false;
    };
    let stmts = named_children(body)
        .into_iter()
        .filter(|c| classify(*c) != NodeKind::Declaration)
        .count();
    stmts <= SMALL_FN_MAX_STMTS
}

/// Bounded DFS over small helper bodies to find a target within
/// `max_hops` hops. `seen` breaks callee cycles.
pub fn call_hits_target_via_n_hops(
    res: &CallResolver,
    call: Node,
    targets: &BTreeSet<String>,
    max_hops: usize,
    seen: &mut HashSet<usize>,
) -> bool {
    if max_hops < 1 {
        return false;
    }
    let Some(callee) = res.callee_definition(call) else {
        return false;
    };
    if !is_small_function(callee) {
        return false;
    }
    if !seen.insert(callee.id()) {
        return false;
    }
    let Some(body) = fn_body(callee) else {
        return false;
    };
    for child_call in body_child_calls(body) {
        if res
            .callee_name(child_call)
            .is_some_and(|nm| targets.contains(nm))
        {
            return true;
        }
        if call_hits_target_via_n_hops(res, child_call, targets, max_hops - 1, seen) {
            return true;
        }
    }
    false
}

/// Best-effort: first direct target name in the callee's body.
pub fn inner_target_from_one_hop(
    res: &CallResolver,
    call: Node,
    targets: &BTreeSet<String>,
) -> Option<String> {
    let callee = res.callee_definition(call)?;
    let body = fn_body(callee)?;
    body_child_calls(body)
        .into_iter()
        .filter_map(|c| res.callee_name(c))
        .find(|nm| targets.contains(*nm))
        .map(str::to_string)
}

fn syscall_selector_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:SYS|__NR)_(\w+)").expect("static regex"))
}

/// If `call` is `syscall(SYS_* ...)` or `syscall(__NR_* ...)`, return the
/// implied base name.
pub fn resolve_syscall_indirection(res: &CallResolver, call: Node) -> Option<String> {
    if res.callee_name(call) != Some("syscall") {
        return None;
    }
    let args = call_args(call);
    let selector = args.first()?;
    let text = ast::node_text(res.source, *selector);
    syscall_selector_regex()
        .captures(text)
        .map(|c| c[1].to_string())
}

/// Resolve a catalog target name for this call, trying direct names,
/// syscall indirection, and helper hops in that order.
pub fn resolve_target_name_for_call(
    res: &CallResolver,
    call: Node,
    targets: &BTreeSet<String>,
) -> Option<String> {
    if let Some(nm) = res.callee_name(call) {
        if targets.contains(nm) {
            return Some(nm.to_string());
        }
    }
    if let Some(mapped) = resolve_syscall_indirection(res, call) {
        if targets.contains(&mapped) {
            return Some(mapped);
        }
    }
    if call_hits_target_via_one_hop(res, call, targets)
        || call_hits_target_via_n_hops(res, call, targets, 2, &mut HashSet::new())
    {
        if let Some(inner) = inner_target_from_one_hop(res, call, targets) {
            return Some(inner);
        }
    }
    None
}

/// Collect target call sites (direct, syscall-indirect, or hop-resolved)
/// in the function body, in document order, with `line:col` locations.
pub fn collect_target_calls<'t>(
    res: &CallResolver<'_, 't>,
    def: Node<'t>,
    targets: &BTreeSet<String>,
) -> Vec<(Node<'t>, String)> {
    let mut out = Vec::new();
    let Some(body) = fn_body(def) else {
        return out;
    };
    collect_calls_rec(res, body, targets, &mut out);
    out
}

fn collect_calls_rec<'t>(
    res: &CallResolver<'_, 't>,
    node: Node<'t>,
    targets: &BTreeSet<String>,
    out: &mut Vec<(Node<'t>, String)>,
) {
    if classify(node) == NodeKind::Call && resolve_target_name_for_call(res, node, targets).is_some()
    {
        out.push((node, ast::hit_loc(node)));
    }
    for child in named_children(node) {
        collect_calls_rec(res, child, targets, out);
    }
}

// Whitelist of atomic pairs: acquire/release or allocate/free shapes where
// two calls on one path are legitimate. Matched unordered.
const ATOMIC_PAIRS: &[(&str, &str)] = &[
    ("open", "close"),
    ("fopen", "fclose"),
    ("socket", "close"),
    ("malloc", "free"),
    ("calloc", "free"),
    ("pthread_mutex_lock", "pthread_mutex_unlock"),
    ("pthread_rwlock_rdlock", "pthread_rwlock_unlock"),
];

/// True when `api_names` is exactly one of the recognized pairs.
pub fn is_atomic_pair(api_names: &[String]) -> bool {
    if api_names.len() != 2 {
        return false;
    }
    let (a, b) = (api_names[0].as_str(), api_names[1].as_str());
    ATOMIC_PAIRS
        .iter()
        .any(|(x, y)| (a == *x && b == *y) || (a == *y && b == *x))
}

/// True when the function starts with a guard that immediately returns:
/// after an optional prefix of helper call statements, the first statement
/// is an if whose then- or else-branch returns immediately.
pub fn has_early_guard_return(res: &CallResolver, def: Node, helpers: &HelperConfig) -> bool {
    let Some(body) = fn_body(def) else {
        return false;
    };
    let stmts: Vec<Node> = named_children(body)
        .into_iter()
        .filter(|c| classify(*c) != NodeKind::Declaration)
        .collect();

    let mut i = 0;
    while i < stmts.len() {
        let s = unwrap_stmt(stmts[i]);
        if classify(s) == NodeKind::Call && is_any_helper_call(res, s, helpers) {
            i += 1;
            continue;
        }
        break;
    }

    let Some(&s) = stmts.get(i) else {
        return false;
    };
    if classify(s) != NodeKind::If {
        return false;
    }

    branch_has_immediate_return(s.child_by_field_name("consequence"))
        || branch_has_immediate_return(else_branch(s))
}

fn else_branch<'t>(if_stmt: Node<'t>) -> Option<Node<'t>> {
    let alt = if_stmt.child_by_field_name("alternative")?;
    if alt.kind() == "else_clause" {
        named_children(alt).into_iter().next()
    } else {
        Some(alt)
    }
}

fn branch_has_immediate_return(branch: Option<Node>) -> bool {
    let Some(node) = branch else {
        return false;
    };
    match classify(node) {
        NodeKind::Return => true,
        NodeKind::Compound => {
            let inner: Vec<Node> = named_children(node)
                .into_iter()
                .filter(|c| classify(*c) != NodeKind::Declaration)
                .collect();
            inner
                .first()
                .is_some_and(|first| classify(unwrap_stmt(*first)) == NodeKind::Return)
        }
        _ => false,
    }
}

// ============================================================================
// Per-path counter
// ============================================================================

/// Intermediate flow: counts on paths that continue past the statement and
/// counts on paths that returned inside it.
#[derive(Debug, Clone)]
struct Flow {
    cont: BTreeSet<u8>,
    term: BTreeSet<u8>,
    unknown: bool,
}

impl Flow {
    fn cont_of(counts: impl IntoIterator<Item = u8>) -> Self {
        Self {
            cont: counts.into_iter().collect(),
            term: BTreeSet::new(),
            unknown: false,
        }
    }

    fn zero() -> Self {
        Self::cont_of([0])
    }
}

fn add_sat(a: &BTreeSet<u8>, b: &BTreeSet<u8>) -> BTreeSet<u8> {
    let mut out = BTreeSet::new();
    for x in a {
        for y in b {
            out.insert((x + y).min(SATURATION_CAP));
        }
    }
    out
}

/// Contribution of a single call expression: benign helpers count zero,
/// direct targets and syscall indirections count one, and an opaque callee
/// counts one when its body reaches a target within `max_hops`.
fn count_call(
    res: &CallResolver,
    call: Node,
    targets: &BTreeSet<String>,
    helpers: &HelperConfig,
    max_hops: usize,
) -> u8 {
    if is_helper_call(res, call, helpers, HelperKind::Benign) {
        return 0;
    }
    if let Some(nm) = res.callee_name(call) {
        if targets.contains(nm) {
            return 1;
        }
    }
    if resolve_syscall_indirection(res, call).is_some_and(|nm| targets.contains(&nm)) {
        return 1;
    }
    if call_hits_target_via_one_hop(res, call, targets)
        || call_hits_target_via_n_hops(res, call, targets, max_hops, &mut HashSet::new())
    {
        return 1;
    }
    0
}

fn flow(
    res: &CallResolver,
    node: Node,
    targets: &BTreeSet<String>,
    helpers: &HelperConfig,
    max_hops: usize,
) -> Flow {
    let sub = |n: Node| flow(res, n, targets, helpers, max_hops);
    match classify(node) {
        NodeKind::Comment => Flow::zero(),
        NodeKind::Call => Flow::cont_of([count_call(res, node, targets, helpers, max_hops)]),
        NodeKind::Return => {
            let mut f = match named_children(node).first() {
                Some(expr) => sub(*expr),
                None => Flow::zero(),
            };
            f.term = std::mem::take(&mut f.cont);
            f
        }
        NodeKind::Compound => {
            let mut cont: BTreeSet<u8> = [0].into();
            let mut term = BTreeSet::new();
            let mut unknown = false;
            for child in named_children(node) {
                let r = sub(child);
                unknown |= r.unknown;
                // Once every path has returned, `cont` is empty and later
                // statements cannot add counts; they still surface unknown.
                term.extend(add_sat(&cont, &r.term));
                cont = add_sat(&cont, &r.cont);
            }
            Flow {
                cont,
                term,
                unknown,
            }
        }
        NodeKind::If => {
            let then = node
                .child_by_field_name("consequence")
                .map(sub)
                .unwrap_or_else(Flow::zero);
            let alt = else_branch(node).map(sub).unwrap_or_else(Flow::zero);
            Flow {
                cont: then.cont.union(&alt.cont).copied().collect(),
                term: then.term.union(&alt.term).copied().collect(),
                unknown: then.unknown || alt.unknown,
            }
        }
        NodeKind::Ternary => {
            let then = node
                .child_by_field_name("consequence")
                .map(sub)
                .unwrap_or_else(Flow::zero);
            let alt = node
                .child_by_field_name("alternative")
                .map(sub)
                .unwrap_or_else(Flow::zero);
            Flow {
                cont: then.cont.union(&alt.cont).copied().collect(),
                term: then.term.union(&alt.term).copied().collect(),
                unknown: then.unknown || alt.unknown,
            }
        }
        NodeKind::Switch => {
            let cases: Vec<Node> = node
                .child_by_field_name("body")
                .map(named_children)
                .unwrap_or_default()
                .into_iter()
                .filter(|c| classify(*c) == NodeKind::Case)
                .collect();
            if cases.is_empty() {
                return Flow::zero();
            }
            let mut cont = BTreeSet::new();
            let mut term = BTreeSet::new();
            let mut unknown = false;
            for case in cases {
                let r = case_flow(res, case, targets, helpers, max_hops);
                cont.extend(r.cont);
                term.extend(r.term);
                unknown |= r.unknown;
            }
            Flow {
                cont,
                term,
                unknown,
            }
        }
        NodeKind::Case => case_flow(res, node, targets, helpers, max_hops),
        NodeKind::For | NodeKind::While | NodeKind::DoWhile => {
            let body = node
                .child_by_field_name("body")
                .or_else(|| named_children(node).into_iter().last());
            let b = body.map(sub).unwrap_or_else(Flow::zero);
            let saturated = b.cont.iter().any(|&c| c >= SATURATION_CAP);
            if saturated {
                return Flow {
                    cont: [SATURATION_CAP].into(),
                    term: b.term,
                    unknown: true,
                };
            }
            // One iteration keeps the body counts; repetition saturates any
            // positive count.
            let mut cont = b.cont.clone();
            for &c in &b.cont {
                if c >= 1 {
                    cont.insert(SATURATION_CAP);
                }
            }
            Flow {
                cont,
                term: b.term,
                unknown: b.unknown,
            }
        }
        // Everything else is transparent: recurse with empty effect.
        _ => {
            let children = named_children(node);
            if children.is_empty() {
                return Flow::zero();
            }
            let mut cont = BTreeSet::new();
            let mut term = BTreeSet::new();
            let mut unknown = false;
            for child in children {
                let r = sub(child);
                cont.extend(r.cont);
                term.extend(r.term);
                unknown |= r.unknown;
            }
            if cont.is_empty() && term.is_empty() {
                cont.insert(0);
            }
            Flow {
                cont,
                term,
                unknown,
            }
        }
    }
}

fn case_flow(
    res: &CallResolver,
    case: Node,
    targets: &BTreeSet<String>,
    helpers: &HelperConfig,
    max_hops: usize,
) -> Flow {
    let value = case.child_by_field_name("value");
    let mut cont: BTreeSet<u8> = [0].into();
    let mut term = BTreeSet::new();
    let mut unknown = false;
    for child in named_children(case) {
        if value.is_some_and(|v| v.id() == child.id()) {
            continue;
        }
        let r = flow(res, child, targets, helpers, max_hops);
        unknown |= r.unknown;
        term.extend(add_sat(&cont, &r.term));
        cont = add_sat(&cont, &r.cont);
    }
    Flow {
        cont,
        term,
        unknown,
    }
}

/// Compute the set of possible target-call counts over paths through
/// `stmt`, saturated at [`SATURATION_CAP`].
pub fn analyze_stmt(
    res: &CallResolver,
    stmt: Node,
    targets: &BTreeSet<String>,
    helpers: &HelperConfig,
    max_hops: usize,
) -> PathResult {
    let f = flow(res, stmt, targets, helpers, max_hops);
    let mut counts: BTreeSet<u8> = f.cont.union(&f.term).copied().collect();
    if counts.is_empty() {
        counts.insert(0);
    }
    PathResult {
        counts,
        unknown: f.unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceFile;

    fn targets(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn analyze_first_fn(src: &str, tgts: &[&str]) -> PathResult {
        let sf = SourceFile::parse("/tmp/t.c", src).expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        let def = sf.functions()[0];
        let body = fn_body(def).expect("body");
        analyze_stmt(&res, body, &targets(tgts), &HelperConfig::default(), 2)
    }

    #[test]
    fn single_call_counts_one() {
        let pr = analyze_first_fn("int w(int fd) { return close(fd); }", &["close"]);
        assert_eq!(pr.counts, [1].into());
        assert!(!pr.unknown);
    }

    #[test]
    fn guarded_call_counts_zero_and_one() {
        let pr = analyze_first_fn(
            "int w(int fd) { if (fd < 0) return -1; return close(fd); }",
            &["close"],
        );
        assert_eq!(pr.counts, [0, 1].into());
        assert!(!pr.unknown);
    }

    #[test]
    fn sequence_saturates_at_two() {
        let pr = analyze_first_fn(
            "int w(int fd) { close(fd); close(fd); close(fd); return 0; }",
            &["close"],
        );
        assert_eq!(pr.counts, [2].into());
    }

    #[test]
    fn loop_with_one_call_saturates_without_unknown() {
        let pr = analyze_first_fn(
            "int w(int fd) { for (int i = 0; i < 10; i++) close(fd); return 0; }",
            &["close"],
        );
        assert_eq!(pr.counts, [1, 2].into());
        assert!(!pr.unknown);
    }

    #[test]
    fn loop_with_saturated_body_is_unknown() {
        let pr = analyze_first_fn(
            "int w(int fd) { while (fd) { close(fd); close(fd); } return 0; }",
            &["close"],
        );
        assert_eq!(pr.counts, [2].into());
        assert!(pr.unknown);
    }

    #[test]
    fn switch_unions_case_bodies() {
        let pr = analyze_first_fn(
            r#"
int w(int fd, int op) {
    switch (op) {
    case 0:
        return close(fd);
    default:
        return -1;
    }
}
"#,
            &["close"],
        );
        assert_eq!(pr.counts, [0, 1].into());
        assert!(!pr.unknown);
    }

    #[test]
    fn benign_helper_counts_zero() {
        let sf = SourceFile::parse(
            "/tmp/t.c",
            "int w(int fd) { log_it(fd); return close(fd); }",
        )
        .expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        let mut helpers = HelperConfig::default();
        helpers.benign.insert("log_it".to_string());
        let body = fn_body(sf.functions()[0]).expect("body");
        let pr = analyze_stmt(&res, body, &targets(&["close"]), &helpers, 2);
        assert_eq!(pr.counts, [1].into());
    }

    #[test]
    fn syscall_indirection_resolves_name() {
        let sf = SourceFile::parse(
            "/tmp/t.c",
            r#"int w(int a) { return syscall(SYS_openat, a, "x", 0); }"#,
        )
        .expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        let body = fn_body(sf.functions()[0]).expect("body");
        let calls = collect_target_calls(&res, sf.functions()[0], &targets(&["openat"]));
        assert_eq!(calls.len(), 1);
        let name = resolve_target_name_for_call(&res, calls[0].0, &targets(&["openat"]));
        assert_eq!(name.as_deref(), Some("openat"));
        let pr = analyze_stmt(&res, body, &targets(&["openat"]), &HelperConfig::default(), 2);
        assert_eq!(pr.counts, [1].into());
    }

    #[test]
    fn one_hop_through_small_forwarder() {
        let src = r#"
static void do_close(int fd) { close(fd); }
int w(int fd) { do_close(fd); return 0; }
"#;
        let sf = SourceFile::parse("/tmp/t.c", src).expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        let w = sf.def_index()["w"];
        let body = fn_body(w).expect("body");
        let pr = analyze_stmt(&res, body, &targets(&["close"]), &HelperConfig::default(), 2);
        assert_eq!(pr.counts, [1].into());

        let calls = collect_target_calls(&res, w, &targets(&["close"]));
        assert_eq!(calls.len(), 1);
        let inner = inner_target_from_one_hop(&res, calls[0].0, &targets(&["close"]));
        assert_eq!(inner.as_deref(), Some("close"));
    }

    #[test]
    fn hop_resolution_breaks_cycles() {
        let src = r#"
void a(int x) { b(x); }
void b(int x) { a(x); }
int w(int x) { a(x); return 0; }
"#;
        let sf = SourceFile::parse("/tmp/t.c", src).expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        let w = sf.def_index()["w"];
        let calls = collect_target_calls(&res, w, &targets(&["close"]));
        assert!(calls.is_empty());
    }

    #[test]
    fn early_guard_recognized_with_helper_prefix() {
        let src = r#"
int w(int fd) {
    trace(fd);
    if (fd < 0) return -1;
    return close(fd);
}
"#;
        let sf = SourceFile::parse("/tmp/t.c", src).expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        let mut helpers = HelperConfig::default();
        helpers.helpers.insert("trace".to_string());
        assert!(has_early_guard_return(
            &res,
            sf.functions()[0],
            &helpers
        ));

        // A non-helper call before the guard defeats recognition.
        let empty = HelperConfig::default();
        assert!(!has_early_guard_return(&res, sf.functions()[0], &empty));
    }

    #[test]
    fn early_guard_with_braced_branch() {
        let src = "int w(int fd) { if (fd < 0) { return -1; } return close(fd); }";
        let sf = SourceFile::parse("/tmp/t.c", src).expect("parse");
        let index = sf.def_index();
        let res = CallResolver::new(&sf.text, &index);
        assert!(has_early_guard_return(
            &res,
            sf.functions()[0],
            &HelperConfig::default()
        ));
    }

    #[test]
    fn atomic_pairs_match_unordered() {
        let pair = |a: &str, b: &str| vec![a.to_string(), b.to_string()];
        assert!(is_atomic_pair(&pair("open", "close")));
        assert!(is_atomic_pair(&pair("close", "open")));
        assert!(is_atomic_pair(&pair(
            "pthread_mutex_lock",
            "pthread_mutex_unlock"
        )));
        assert!(!is_atomic_pair(&pair("open", "free")));
        assert!(!is_atomic_pair(&["close".to_string()]));
    }

    #[test]
    fn counts_are_always_saturated_subsets() {
        let pr = analyze_first_fn(
            r#"
int w(int fd) {
    if (fd) { close(fd); close(fd); close(fd); }
    while (fd) { close(fd); }
    return close(fd);
}
"#,
            &["close"],
        );
        assert!(!pr.counts.is_empty());
        assert!(pr.counts.iter().all(|&c| c <= SATURATION_CAP));
    }
}
