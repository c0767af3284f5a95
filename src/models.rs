//! Data models for wrapper detection.

use serde::Serialize;

/// One kept function: wrapper verdict, call evidence, and graph degree.
/// Owned data only; nothing here borrows from a parsed translation unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Row {
    pub file: String,
    pub function: String,
    pub api_called: String,
    pub category: String,
    pub total_target_calls: usize,
    pub hit_locs: Vec<String>,
    pub per_path_single: bool,
    pub derived_from_params: bool,
    pub derivation_trace: Vec<String>,
    pub reason: String,
    pub function_loc: Option<String>,
    pub pair_used: bool,
    pub via_helper_hop: bool,
    pub ignored_helpers: Vec<String>,
    pub family: String,
    pub fan_in: usize,
    pub fan_out: usize,
    pub function_key: Option<String>,
    pub is_thin_alias: bool,
    pub callees: Vec<String>,
    pub arg_pass: String,
    pub ret_pass: String,
}

/// One call edge: caller and callee with their stable keys and the
/// absolute `file:line:col` call site.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Edge {
    pub caller_key: String,
    pub callee_key: String,
    pub caller: String,
    pub callee: String,
    pub loc: String,
}
