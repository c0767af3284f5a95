//! Wrapper-function finder for C codebases.
//!
//! Parses every translation unit of a compilation database through a
//! tree-sitter C frontend and decides, per function definition, whether it
//! is a thin wrapper around a cataloged API: path-sensitive target-call
//! counting, bounded helper-hop resolution, parameter-provenance taint,
//! and syntactic pass-through classification, followed by cross-unit
//! call-graph aggregation. A secondary fuzzy stage scores candidate names
//! lexically against the catalog.

#![allow(clippy::field_reassign_with_default)] // Pattern used for clarity in test setup
#![allow(clippy::manual_contains)] // Used in hot paths where iter().any() is clearer

pub mod analysis;
pub mod ast;
pub mod callgraph;
pub mod catalog;
pub mod cli;
pub mod compile_db;
pub mod detection;
pub mod error;
pub mod fuzzy;
pub mod models;
pub mod output;
pub mod provenance;
pub mod runner;
pub mod telemetry;

pub use crate::catalog::{ApiCatalog, HelperConfig};
pub use crate::detection::{ThinAliasPolicy, WrapperAnalysis};
pub use crate::models::{Edge, Row};
