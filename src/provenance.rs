//! Argument/return provenance and pass-through classification.
//!
//! The taint half is a single-pass intra-procedural data flow from
//! parameters through locals to call arguments and return expressions.
//! The pass-through half is stricter and purely syntactic: it asks whether
//! a wrapper hands its parameters to the target call unchanged and returns
//! the call result directly.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use tree_sitter::Node;

use crate::analysis::CallResolver;
use crate::ast::{
    NodeKind, ScopeMap, call_args, classify, fn_body, fn_returns_void, named_children, node_text,
};
use crate::catalog::HelperConfig;

/// Taint mapping from variable keys to the reasons they are tainted.
#[derive(Debug, Default)]
pub struct TaintState {
    taint: BTreeMap<String, Vec<String>>,
    pub ret_tainted: bool,
    pub ret_trace: Vec<String>,
}

impl TaintState {
    pub fn mark(&mut self, key: String, why: String) {
        self.taint.entry(key).or_default().push(why);
    }

    pub fn is_tainted(&self, key: &str) -> bool {
        self.taint.contains_key(key)
    }

    pub fn trace(&self, key: &str) -> Vec<String> {
        self.taint.get(key).cloned().unwrap_or_default()
    }
}

fn ident_key(res: &CallResolver, scope: &ScopeMap, node: Node) -> Option<String> {
    let name = node_text(res.source, node);
    scope.resolve_key(name, node.start_byte())
}

/// Track assignments from parameters through locals. Calls are opaque:
/// their results are treated as clean.
pub fn taint_stmt(
    res: &CallResolver,
    scope: &ScopeMap,
    stmt: Node,
    state: &mut TaintState,
    helpers: &HelperConfig,
) {
    match classify(stmt) {
        NodeKind::Declaration => {
            let mut cursor = stmt.walk();
            let declarators: Vec<Node> = stmt
                .children_by_field_name("declarator", &mut cursor)
                .collect();
            for d in declarators {
                if d.kind() != "init_declarator" {
                    continue;
                }
                let (Some(lhs), Some(value)) = (
                    d.child_by_field_name("declarator"),
                    d.child_by_field_name("value"),
                ) else {
                    continue;
                };
                let Some(ident) = innermost_identifier(lhs) else {
                    continue;
                };
                let key = format!(
                    "{}@{}",
                    node_text(res.source, ident),
                    ident.start_byte()
                );
                let (tainted, trace) = taint_expr(res, scope, value, state, helpers);
                if tainted {
                    for reason in trace {
                        state.mark(key.clone(), reason);
                    }
                }
            }
        }
        NodeKind::Assign => {
            let (Some(lhs), Some(rhs)) = (
                stmt.child_by_field_name("left"),
                stmt.child_by_field_name("right"),
            ) else {
                return;
            };
            if classify(lhs) != NodeKind::Ident {
                return;
            }
            let Some(key) = ident_key(res, scope, lhs) else {
                return;
            };
            let (tainted, trace) = taint_expr(res, scope, rhs, state, helpers);
            if tainted {
                for reason in trace {
                    state.mark(key.clone(), reason);
                }
            }
        }
        NodeKind::Return => {
            for child in named_children(stmt) {
                let (tainted, trace) = taint_expr(res, scope, child, state, helpers);
                if tainted {
                    state.ret_tainted = true;
                    state.ret_trace.extend(trace);
                }
            }
        }
        _ => {
            for child in named_children(stmt) {
                taint_stmt(res, scope, child, state, helpers);
            }
        }
    }
}

fn innermost_identifier(node: Node) -> Option<Node> {
    if classify(node) == NodeKind::Ident {
        return Some(node);
    }
    named_children(node)
        .into_iter()
        .find_map(innermost_identifier)
}

/// Whether an expression is data-derived from tainted state, with its trace.
pub fn taint_expr(
    res: &CallResolver,
    scope: &ScopeMap,
    expr: Node,
    state: &TaintState,
    helpers: &HelperConfig,
) -> (bool, Vec<String>) {
    match classify(expr) {
        NodeKind::Ident => {
            if let Some(key) = ident_key(res, scope, expr) {
                if state.is_tainted(&key) {
                    return (true, state.trace(&key));
                }
            }
            (false, Vec::new())
        }
        NodeKind::Unary
        | NodeKind::PointerOp
        | NodeKind::Cast
        | NodeKind::Member
        | NodeKind::Subscript
        | NodeKind::Binary => {
            for child in named_children(expr) {
                let (t, tr) = taint_expr(res, scope, child, state, helpers);
                if t {
                    return (true, tr);
                }
            }
            (false, Vec::new())
        }
        // No inter-procedural propagation; call results are clean.
        NodeKind::Call => (false, Vec::new()),
        _ => {
            for child in named_children(expr) {
                let (t, tr) = taint_expr(res, scope, child, state, helpers);
                if t {
                    return (true, tr);
                }
            }
            (false, Vec::new())
        }
    }
}

/// Run the taint pass over `def` and check that every argument of every
/// counted call is derived from the function's parameters.
pub fn check_arguments_provenance(
    res: &CallResolver,
    def: Node,
    calls: &[Node],
    helpers: &HelperConfig,
) -> (bool, Vec<String>) {
    let scope = ScopeMap::build(res.source, def);
    let mut state = TaintState::default();
    for key in scope.param_keys() {
        let name = key.split('@').next().unwrap_or("").to_string();
        state.mark(key, format!("{name} is param"));
    }

    let Some(body) = fn_body(def) else {
        return (false, vec!["no-body".to_string()]);
    };
    taint_stmt(res, &scope, body, &mut state, helpers);

    let mut ok = true;
    let mut trace_out = Vec::new();
    for call in calls {
        for (i, arg) in call_args(*call).into_iter().enumerate() {
            let (t, tr) = taint_expr(res, &scope, arg, &state, helpers);
            ok &= t;
            let mut line = format!("arg{i}:{}", if t { "tainted" } else { "clean" });
            if !tr.is_empty() {
                line.push_str(&format!(" [{}]", tr.join(" ; ")));
            }
            trace_out.push(line);
        }
    }
    (ok, trace_out)
}

// ============================================================================
// Pass-through classification
// ============================================================================

/// Descend through parentheses and C-style casts.
pub fn strip_noop(node: Node) -> Node {
    let mut cur = node;
    loop {
        match classify(cur) {
            NodeKind::Paren => match named_children(cur).into_iter().next() {
                Some(inner) => cur = inner,
                None => return cur,
            },
            NodeKind::Cast => match cur.child_by_field_name("value") {
                Some(inner) => cur = inner,
                None => return cur,
            },
            _ => return cur,
        }
    }
}

/// Returns the parameter key iff the stripped expression is a direct
/// parameter reference, or a dereference of a member chain rooted at a
/// parameter with nothing else in between.
pub fn is_direct_param_ref(res: &CallResolver, scope: &ScopeMap, node: Node) -> Option<String> {
    let e = strip_noop(node);
    match classify(e) {
        NodeKind::Ident => param_key_of(res, scope, e),
        NodeKind::PointerOp => {
            let op = e.child_by_field_name("operator")?;
            if node_text(res.source, op) != "*" {
                return None;
            }
            let mut cur = strip_noop(e.child_by_field_name("argument").or_else(|| {
                named_children(e).into_iter().next()
            })?);
            loop {
                match classify(cur) {
                    NodeKind::Member => {
                        cur = strip_noop(cur.child_by_field_name("argument")?);
                    }
                    NodeKind::Ident => return param_key_of(res, scope, cur),
                    _ => return None,
                }
            }
        }
        _ => None,
    }
}

fn param_key_of(res: &CallResolver, scope: &ScopeMap, ident: Node) -> Option<String> {
    let name = node_text(res.source, ident);
    let decl = scope.resolve(name, ident.start_byte())?;
    decl.is_param.then(|| decl.key())
}

/// Classify how directly the wrapper's parameters reach the matching calls
/// (`arg_pass`) and whether call results are returned directly
/// (`ret_pass`).
pub fn compute_arg_ret_pass(
    res: &CallResolver,
    def: Node,
    matching_calls: &[Node],
) -> (String, String) {
    let scope = ScopeMap::build(res.source, def);
    let arg_pass = classify_arg_pass(res, &scope, matching_calls);
    let ret_pass = classify_ret_pass(res, &scope, def, matching_calls);
    (arg_pass, ret_pass)
}

fn classify_arg_pass(res: &CallResolver, scope: &ScopeMap, matching_calls: &[Node]) -> String {
    let params: BTreeSet<String> = scope.param_keys().into_iter().collect();
    let mut full_match = false;
    let mut used: BTreeSet<String> = BTreeSet::new();

    for call in matching_calls {
        let args = call_args(*call);
        let keys: Vec<Option<String>> = args
            .iter()
            .map(|a| is_direct_param_ref(res, scope, *a))
            .collect();
        let direct: BTreeSet<String> = keys.iter().flatten().cloned().collect();
        if keys.iter().all(Option::is_some) && direct.len() == args.len() && direct == params {
            full_match = true;
        }
        used.extend(direct);
    }

    if full_match && !matching_calls.is_empty() {
        "yes - all".to_string()
    } else if !used.is_empty() {
        format!("yes - {}", used.len())
    } else {
        "no".to_string()
    }
}

fn classify_ret_pass(
    res: &CallResolver,
    scope: &ScopeMap,
    def: Node,
    matching_calls: &[Node],
) -> String {
    let Some(body) = fn_body(def) else {
        return "no".to_string();
    };
    if fn_returns_void(res.source, def) {
        return "no".to_string();
    }

    let sites: HashSet<usize> = matching_calls.iter().map(Node::id).collect();
    let mut totals = RetCounts::default();
    let mut held: BTreeSet<String> = BTreeSet::new();
    walk_returns(res, scope, body, &sites, &mut held, &mut totals);

    if totals.total == 0 {
        "no".to_string()
    } else if totals.direct == totals.total {
        "yes - all".to_string()
    } else if totals.direct > 0 {
        format!("yes - {}", totals.direct)
    } else {
        "no".to_string()
    }
}

#[derive(Default)]
struct RetCounts {
    total: usize,
    direct: usize,
}

// Document-order scan. `held` tracks locals whose latest value is the
// result of a matching call; a later non-matching assignment clears them.
fn walk_returns(
    res: &CallResolver,
    scope: &ScopeMap,
    node: Node,
    sites: &HashSet<usize>,
    held: &mut BTreeSet<String>,
    counts: &mut RetCounts,
) {
    match classify(node) {
        NodeKind::Declaration => {
            let mut cursor = node.walk();
            let declarators: Vec<Node> = node
                .children_by_field_name("declarator", &mut cursor)
                .collect();
            for d in declarators {
                if d.kind() != "init_declarator" {
                    continue;
                }
                let (Some(lhs), Some(value)) = (
                    d.child_by_field_name("declarator"),
                    d.child_by_field_name("value"),
                ) else {
                    continue;
                };
                let Some(ident) = innermost_identifier(lhs) else {
                    continue;
                };
                let key = format!("{}@{}", node_text(res.source, ident), ident.start_byte());
                track_value(value, sites, key, held);
            }
        }
        NodeKind::Assign => {
            let (Some(lhs), Some(rhs)) = (
                node.child_by_field_name("left"),
                node.child_by_field_name("right"),
            ) else {
                return;
            };
            if classify(lhs) != NodeKind::Ident {
                return;
            }
            if let Some(key) = ident_key(res, scope, lhs) {
                track_value(rhs, sites, key, held);
            }
        }
        NodeKind::Return => {
            let Some(expr) = named_children(node).into_iter().next() else {
                return;
            };
            counts.total += 1;
            let stripped = strip_noop(expr);
            match classify(stripped) {
                NodeKind::Binary | NodeKind::Unary | NodeKind::PointerOp | NodeKind::Ternary => {}
                NodeKind::Call if sites.contains(&stripped.id()) => counts.direct += 1,
                NodeKind::Ident => {
                    if let Some(key) = ident_key(res, scope, stripped) {
                        if held.contains(&key) {
                            counts.direct += 1;
                        }
                    }
                }
                _ => {}
            }
        }
        _ => {
            for child in named_children(node) {
                walk_returns(res, scope, child, sites, held, counts);
            }
        }
    }
}

fn track_value(value: Node, sites: &HashSet<usize>, key: String, held: &mut BTreeSet<String>) {
    let stripped = strip_noop(value);
    if classify(stripped) == NodeKind::Call && sites.contains(&stripped.id()) {
        held.insert(key);
    } else {
        held.remove(&key);
    }
}
