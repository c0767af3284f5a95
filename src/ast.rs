//! AST frontend adapter over the tree-sitter C grammar.
//!
//! Everything downstream works against the closed [`NodeKind`] set and the
//! owned-string helpers here; tree-sitter nodes never outlive their
//! [`SourceFile`]. Callee resolution is per translation unit: a call resolves
//! to a function definition only when one is visible in the same file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser, Tree};

use crate::error::{Error, Result};

/// Closed set of node kinds the analyzer recognizes. Every other grammar
/// kind is transparent: walks recurse into children with empty effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    FunctionDef,
    Compound,
    If,
    Switch,
    Case,
    Ternary,
    For,
    While,
    DoWhile,
    Return,
    Call,
    Declaration,
    ExprStmt,
    Assign,
    Binary,
    Unary,
    PointerOp,
    Member,
    Subscript,
    Ident,
    Paren,
    Cast,
    Comma,
    Comment,
    Other,
}

/// Map a tree-sitter node onto the closed kind set.
pub fn classify(node: Node) -> NodeKind {
    match node.kind() {
        "function_definition" => NodeKind::FunctionDef,
        "compound_statement" => NodeKind::Compound,
        "if_statement" => NodeKind::If,
        "switch_statement" => NodeKind::Switch,
        "case_statement" => NodeKind::Case,
        "conditional_expression" => NodeKind::Ternary,
        "for_statement" => NodeKind::For,
        "while_statement" => NodeKind::While,
        "do_statement" => NodeKind::DoWhile,
        "return_statement" => NodeKind::Return,
        "call_expression" => NodeKind::Call,
        "declaration" => NodeKind::Declaration,
        "expression_statement" => NodeKind::ExprStmt,
        "assignment_expression" => NodeKind::Assign,
        "binary_expression" => NodeKind::Binary,
        "unary_expression" => NodeKind::Unary,
        "pointer_expression" => NodeKind::PointerOp,
        "field_expression" => NodeKind::Member,
        "subscript_expression" => NodeKind::Subscript,
        "identifier" => NodeKind::Ident,
        "parenthesized_expression" => NodeKind::Paren,
        "cast_expression" => NodeKind::Cast,
        "comma_expression" => NodeKind::Comma,
        "comment" => NodeKind::Comment,
        _ => NodeKind::Other,
    }
}

/// One parsed translation unit: source text plus its tree.
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    tree: Tree,
}

impl SourceFile {
    /// Parse in-memory C source.
    pub fn parse(path: impl Into<PathBuf>, text: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let text = text.into();
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_c::LANGUAGE.into())
            .map_err(|e| Error::parse(&path, format!("failed to load C grammar: {e}")))?;
        let tree = parser
            .parse(&text, None)
            .ok_or_else(|| Error::parse(&path, "tree-sitter returned no tree"))?;
        Ok(Self { path, text, tree })
    }

    /// Read and parse a file from disk.
    pub fn parse_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::parse(path, format!("failed to read: {e}")))?;
        Self::parse(path, text)
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// True when nothing in the file parsed: the analyzer treats this as a
    /// failed translation unit (partial trees with error nodes are usable).
    pub fn is_empty_parse(&self) -> bool {
        let root = self.root();
        root.has_error() && !self.functions().iter().any(|f| fn_body(*f).is_some())
    }

    /// All function definitions in document order.
    pub fn functions(&self) -> Vec<Node<'_>> {
        let mut out = Vec::new();
        collect_functions(self.root(), &mut out);
        out
    }

    /// Index from function name to its definition node. First definition
    /// wins when a name somehow repeats.
    pub fn def_index(&self) -> BTreeMap<String, Node<'_>> {
        let mut index = BTreeMap::new();
        for def in self.functions() {
            if let Some(name) = fn_name(&self.text, def) {
                index.entry(name.to_string()).or_insert(def);
            }
        }
        index
    }
}

fn collect_functions<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    if classify(node) == NodeKind::FunctionDef {
        out.push(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_functions(child, out);
    }
}

/// Source text of a node; empty on misaligned offsets.
pub fn node_text<'a>(source: &'a str, node: Node) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Named children with comments filtered out.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|ch| classify(*ch) != NodeKind::Comment)
        .collect()
}

/// See through expression-statement wrappers so a bare call statement
/// presents as a call.
pub fn unwrap_stmt(node: Node) -> Node {
    let mut cur = node;
    while classify(cur) == NodeKind::ExprStmt {
        match named_children(cur).first() {
            Some(inner) => cur = *inner,
            None => break,
        }
    }
    cur
}

fn declarator_identifier(node: Node) -> Option<Node> {
    match node.kind() {
        "identifier" => Some(node),
        "pointer_declarator" | "array_declarator" | "function_declarator"
        | "parenthesized_declarator" | "init_declarator" => {
            declarator_identifier(node.child_by_field_name("declarator")?)
        }
        _ => None,
    }
}

fn function_declarator(def: Node) -> Option<Node> {
    let mut node = def.child_by_field_name("declarator")?;
    loop {
        match node.kind() {
            "function_declarator" => return Some(node),
            "pointer_declarator" | "parenthesized_declarator" => {
                node = node.child_by_field_name("declarator")?;
            }
            _ => return None,
        }
    }
}

/// Name of a function definition.
pub fn fn_name<'a>(source: &'a str, def: Node) -> Option<&'a str> {
    let decl = function_declarator(def)?;
    let ident = declarator_identifier(decl.child_by_field_name("declarator")?)?;
    let name = node_text(source, ident);
    (!name.is_empty()).then_some(name)
}

/// Readable caller name for a function definition.
pub fn caller_name(source: &str, def: Node) -> String {
    fn_name(source, def).unwrap_or("<anon>").to_string()
}

/// Body compound statement of a function definition.
pub fn fn_body(def: Node) -> Option<Node> {
    let body = def.child_by_field_name("body")?;
    (classify(body) == NodeKind::Compound).then_some(body)
}

/// Parameter identifier nodes of a function definition, in order.
/// Unnamed (abstract) parameters and `void` are skipped.
pub fn fn_param_idents(def: Node) -> Vec<Node> {
    let Some(decl) = function_declarator(def) else {
        return Vec::new();
    };
    let Some(params) = decl.child_by_field_name("parameters") else {
        return Vec::new();
    };
    named_children(params)
        .into_iter()
        .filter(|p| p.kind() == "parameter_declaration")
        .filter_map(|p| declarator_identifier(p.child_by_field_name("declarator")?))
        .collect()
}

/// True when the function's return type spells `void` (and is not a
/// pointer to void).
pub fn fn_returns_void(source: &str, def: Node) -> bool {
    let Some(ty) = def.child_by_field_name("type") else {
        return false;
    };
    if node_text(source, ty).trim() != "void" {
        return false;
    }
    def.child_by_field_name("declarator")
        .map(|d| d.kind() != "pointer_declarator")
        .unwrap_or(false)
}

/// Resolved callee name of a call expression, when it has one.
pub fn call_name<'a>(source: &'a str, call: Node) -> Option<&'a str> {
    let mut callee = call.child_by_field_name("function")?;
    loop {
        match classify(callee) {
            NodeKind::Ident => {
                let name = node_text(source, callee);
                return (!name.is_empty()).then_some(name);
            }
            NodeKind::Paren | NodeKind::PointerOp => {
                callee = named_children(callee).into_iter().next()?;
            }
            NodeKind::Member => {
                let field = callee.child_by_field_name("field")?;
                let name = node_text(source, field);
                return (!name.is_empty()).then_some(name);
            }
            _ => return None,
        }
    }
}

/// Argument expression nodes of a call.
pub fn call_args(call: Node) -> Vec<Node> {
    call.child_by_field_name("arguments")
        .map(named_children)
        .unwrap_or_default()
}

/// Definition node for a call's callee, when visible in this translation
/// unit.
pub fn callee_definition<'t>(
    index: &BTreeMap<String, Node<'t>>,
    source: &str,
    call: Node,
) -> Option<Node<'t>> {
    index.get(call_name(source, call)?).copied()
}

/// 1-based line and column of a node's start.
pub fn line_col(node: Node) -> (usize, usize) {
    let p = node.start_position();
    (p.row + 1, p.column + 1)
}

/// `line:col` hit location for a call site.
pub fn hit_loc(node: Node) -> String {
    let (line, col) = line_col(node);
    format!("{line}:{col}")
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Absolute `file:line:col` for a call site.
pub fn callsite_loc(path: &Path, node: Node) -> String {
    let (line, col) = line_col(node);
    format!("{}:{line}:{col}", absolute(path).display())
}

/// Stable key for a function definition: `name@absolute-path:line`.
pub fn function_key(source: &str, path: &Path, def: Node) -> String {
    let name = caller_name(source, def);
    let (line, _) = line_col(def);
    format!("{name}@{}:{line}", absolute(path).display())
}

// ============================================================================
// Lexical declaration resolution
// ============================================================================

/// One visible declaration inside a function: a parameter or a local.
#[derive(Debug, Clone)]
pub struct DeclInfo {
    pub name: String,
    pub ident_byte: usize,
    pub is_param: bool,
    scope_start: usize,
    scope_end: usize,
}

impl DeclInfo {
    /// Stable key shared by the declaration and every reference to it.
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.ident_byte)
    }
}

/// Per-function map from identifier uses to their declarations, resolved
/// lexically (innermost enclosing block, declaration before use).
#[derive(Debug, Default)]
pub struct ScopeMap {
    decls: Vec<DeclInfo>,
}

impl ScopeMap {
    pub fn build(source: &str, def: Node) -> Self {
        let mut decls = Vec::new();
        let Some(body) = fn_body(def) else {
            return Self { decls };
        };
        for ident in fn_param_idents(def) {
            decls.push(DeclInfo {
                name: node_text(source, ident).to_string(),
                ident_byte: ident.start_byte(),
                is_param: true,
                scope_start: body.start_byte(),
                scope_end: body.end_byte(),
            });
        }
        collect_local_decls(source, body, body.end_byte(), &mut decls);
        Self { decls }
    }

    /// Resolve a reference by name and position to the innermost visible
    /// declaration.
    pub fn resolve(&self, name: &str, at_byte: usize) -> Option<&DeclInfo> {
        self.decls
            .iter()
            .filter(|d| d.name == name && d.scope_start <= at_byte && at_byte <= d.scope_end)
            .max_by_key(|d| d.scope_start)
    }

    /// Resolve a reference straight to its stable key.
    pub fn resolve_key(&self, name: &str, at_byte: usize) -> Option<String> {
        self.resolve(name, at_byte).map(DeclInfo::key)
    }

    /// Keys of the function's parameters, in declaration order.
    pub fn param_keys(&self) -> Vec<String> {
        self.decls
            .iter()
            .filter(|d| d.is_param)
            .map(DeclInfo::key)
            .collect()
    }
}

fn collect_local_decls(source: &str, node: Node, block_end: usize, out: &mut Vec<DeclInfo>) {
    match classify(node) {
        NodeKind::Compound | NodeKind::For => {
            let end = node.end_byte();
            for child in named_children(node) {
                collect_local_decls(source, child, end, out);
            }
        }
        NodeKind::Declaration => {
            let mut cursor = node.walk();
            let declarators: Vec<Node> = node
                .children_by_field_name("declarator", &mut cursor)
                .collect();
            for d in declarators {
                if let Some(ident) = declarator_identifier(d) {
                    out.push(DeclInfo {
                        name: node_text(source, ident).to_string(),
                        ident_byte: ident.start_byte(),
                        is_param: false,
                        scope_start: node.end_byte(),
                        scope_end: block_end,
                    });
                }
            }
        }
        _ => {
            for child in named_children(node) {
                collect_local_decls(source, child, block_end, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> SourceFile {
        SourceFile::parse("/tmp/test.c", src).expect("parse should succeed")
    }

    #[test]
    fn finds_function_definitions_and_names() {
        let sf = parse(
            r#"
static int helper(int x) { return x; }
int *alloc_it(void) { return 0; }
"#,
        );
        let defs = sf.functions();
        assert_eq!(defs.len(), 2);
        assert_eq!(fn_name(&sf.text, defs[0]), Some("helper"));
        assert_eq!(fn_name(&sf.text, defs[1]), Some("alloc_it"));

        let index = sf.def_index();
        assert!(index.contains_key("helper"));
        assert!(index.contains_key("alloc_it"));
    }

    #[test]
    fn call_names_see_through_parens_and_derefs() {
        let sf = parse(
            r#"
int w(int fd, int (*fp)(int)) {
    close(fd);
    (*fp)(fd);
    return 0;
}
"#,
        );
        let def = sf.functions()[0];
        let body = fn_body(def).expect("body");
        let stmts = named_children(body);

        let direct = unwrap_stmt(stmts[0]);
        assert_eq!(classify(direct), NodeKind::Call);
        assert_eq!(call_name(&sf.text, direct), Some("close"));
        assert_eq!(call_args(direct).len(), 1);

        let through_ptr = unwrap_stmt(stmts[1]);
        assert_eq!(classify(through_ptr), NodeKind::Call);
        assert_eq!(call_name(&sf.text, through_ptr), Some("fp"));
    }

    #[test]
    fn void_return_detection() {
        let sf = parse(
            r#"
void a(int x) {}
void *b(int x) { return 0; }
int c(int x) { return x; }
"#,
        );
        let defs = sf.functions();
        assert!(fn_returns_void(&sf.text, defs[0]));
        assert!(!fn_returns_void(&sf.text, defs[1]));
        assert!(!fn_returns_void(&sf.text, defs[2]));
    }

    #[test]
    fn params_collected_in_order() {
        let sf = parse("int f(int a, char *b, int c[4]) { return a; }");
        let def = sf.functions()[0];
        let names: Vec<&str> = fn_param_idents(def)
            .into_iter()
            .map(|n| node_text(&sf.text, n))
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn scope_map_resolves_params_and_shadowing() {
        let src = r#"
int f(int x) {
    int y = x;
    {
        int x = 2;
        y = x;
    }
    return x;
}
"#;
        let sf = parse(src);
        let def = sf.functions()[0];
        let scope = ScopeMap::build(&sf.text, def);
        assert_eq!(scope.param_keys().len(), 1);

        // `return x` refers to the parameter, not the shadowing local.
        let ret_x = src.rfind("return x").expect("return stmt") + 7;
        let d = scope.resolve("x", ret_x).expect("resolves");
        assert!(d.is_param);

        // `y = x` inside the block refers to the local.
        let inner = src.find("y = x;").map(|i| i + 4).expect("inner ref");
        let d = scope.resolve("x", inner).expect("resolves");
        assert!(!d.is_param);
    }

    #[test]
    fn hit_loc_is_one_based() {
        let sf = parse("int w(int fd) { return close(fd); }");
        let def = sf.functions()[0];
        let body = fn_body(def).expect("body");
        let ret = named_children(body)[0];
        let call = named_children(ret)[0];
        assert_eq!(classify(call), NodeKind::Call);
        assert_eq!(hit_loc(call), "1:24");
    }
}
