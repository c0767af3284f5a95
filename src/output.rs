//! Output helpers for finder results.

use itertools::Itertools;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::Result;
use crate::models::Row;

/// `-` (or nothing) means stdout.
pub fn is_stdout(path: &str) -> bool {
    path.is_empty() || path == "-"
}

/// Ensure the right directory exists for the given output path.
pub fn prepare_output_location(path: &Path, prefer_dir: bool) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let looks_like_file = path.extension().is_some();
    if looks_like_file && !prefer_dir {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        return Ok(path.to_path_buf());
    }
    std::fs::create_dir_all(path)?;
    Ok(path.to_path_buf())
}

fn loc_cleaner() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s,;]+").expect("static regex"))
}

/// Encode hit locations into a delimiter-safe `|`-joined string.
pub fn serialize_hit_locs(hit_locs: &[String]) -> String {
    hit_locs
        .iter()
        .map(|s| loc_cleaner().replace_all(s.trim(), "_").into_owned())
        .join("|")
}

fn bool_cell(v: bool) -> &'static str {
    if v { "TRUE" } else { "FALSE" }
}

fn writer_for(out: &str) -> Result<Box<dyn Write>> {
    if is_stdout(out) {
        Ok(Box::new(std::io::stdout()))
    } else {
        Ok(Box::new(std::fs::File::create(out)?))
    }
}

/// Write rows as CSV: a minimal column set by default, the full set when
/// `all_columns` is requested.
pub fn write_rows_csv(rows: &[Row], out: &str, all_columns: bool) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer_for(out)?);
    if all_columns {
        w.write_record([
            "file",
            "function",
            "function_key",
            "api_called",
            "category",
            "total_target_calls",
            "hit_locs",
            "per_path_single",
            "derived_from_params",
            "derivation_trace",
            "arg_pass",
            "ret_pass",
            "reason",
            "function_loc",
            "pair_used",
            "via_helper_hop",
            "ignored_helpers",
            "fan_in",
            "fan_out",
            "family",
            "is_thin_alias",
            "callee",
        ])?;
        for r in rows {
            let record: Vec<String> = vec![
                r.file.clone(),
                r.function.clone(),
                r.function_key.clone().unwrap_or_default(),
                r.api_called.clone(),
                r.category.clone(),
                r.total_target_calls.to_string(),
                serialize_hit_locs(&r.hit_locs),
                bool_cell(r.per_path_single).to_string(),
                bool_cell(r.derived_from_params).to_string(),
                r.derivation_trace.iter().join(";"),
                r.arg_pass.clone(),
                r.ret_pass.clone(),
                if r.reason.is_empty() { "-".to_string() } else { r.reason.clone() },
                r.function_loc.clone().unwrap_or_else(|| "-".to_string()),
                bool_cell(r.pair_used).to_string(),
                bool_cell(r.via_helper_hop).to_string(),
                r.ignored_helpers.iter().join(";"),
                r.fan_in.to_string(),
                r.fan_out.to_string(),
                r.family.clone(),
                bool_cell(r.is_thin_alias).to_string(),
                r.callees.iter().join(" - "),
            ];
            w.write_record(&record)?;
        }
    } else {
        w.write_record([
            "file",
            "function",
            "api_called",
            "category",
            "fan_in",
            "fan_out",
            "callee",
            "hit_locs",
            "arg_pass",
            "ret_pass",
            "reason",
        ])?;
        for r in rows {
            let record: Vec<String> = vec![
                r.file.clone(),
                r.function.clone(),
                r.api_called.clone(),
                r.category.clone(),
                r.fan_in.to_string(),
                r.fan_out.to_string(),
                r.callees.iter().join(" - "),
                serialize_hit_locs(&r.hit_locs),
                r.arg_pass.clone(),
                r.ret_pass.clone(),
                if r.reason.is_empty() { "-".to_string() } else { r.reason.clone() },
            ];
            w.write_record(&record)?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Write all rows as one pretty-printed JSON document.
pub fn write_rows_json(rows: &[Row], out: &str) -> Result<()> {
    let mut w = writer_for(out)?;
    serde_json::to_writer_pretty(&mut w, rows)?;
    writeln!(w)?;
    Ok(())
}

/// Write rows as line-delimited JSON records.
pub fn write_rows_jsonl(rows: &[Row], out: &str) -> Result<()> {
    let mut w = writer_for(out)?;
    for r in rows {
        serde_json::to_writer(&mut w, r)?;
        writeln!(w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row {
            file: "/src/a.c".to_string(),
            function: "w".to_string(),
            api_called: "close".to_string(),
            category: "libc".to_string(),
            total_target_calls: 1,
            hit_locs: vec!["3:12".to_string(), "bad loc, here".to_string()],
            per_path_single: true,
            reason: "ok".to_string(),
            arg_pass: "yes - all".to_string(),
            ret_pass: "yes - all".to_string(),
            callees: vec!["close".to_string(), "log".to_string()],
            ..Row::default()
        }
    }

    #[test]
    fn hit_locs_are_delimiter_safe() {
        let s = serialize_hit_locs(&[
            "3:12".to_string(),
            "a b".to_string(),
            "x,y;z".to_string(),
        ]);
        assert_eq!(s, "3:12|a_b|x_y_z");
    }

    #[test]
    fn minimal_csv_has_expected_header_and_cells() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("rows.csv");
        write_rows_csv(&[sample_row()], &out.to_string_lossy(), false).expect("write");
        let text = std::fs::read_to_string(&out).expect("read");
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("file,function,api_called,category,fan_in,fan_out,callee,hit_locs,arg_pass,ret_pass,reason")
        );
        let row = lines.next().expect("row");
        assert!(row.contains("close - log"));
        assert!(row.contains("3:12|bad_loc_here"));
    }

    #[test]
    fn all_columns_csv_includes_flags() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("rows.csv");
        write_rows_csv(&[sample_row()], &out.to_string_lossy(), true).expect("write");
        let text = std::fs::read_to_string(&out).expect("read");
        assert!(text.lines().next().expect("header").contains("via_helper_hop"));
        assert!(text.contains("TRUE"));
        assert!(text.contains("FALSE"));
    }

    #[test]
    fn jsonl_emits_one_record_per_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("rows.jsonl");
        write_rows_jsonl(&[sample_row(), sample_row()], &out.to_string_lossy())
            .expect("write");
        let text = std::fs::read_to_string(&out).expect("read");
        assert_eq!(text.lines().count(), 2);
        let first: serde_json::Value =
            serde_json::from_str(text.lines().next().expect("line")).expect("json");
        assert_eq!(first["api_called"], "close");
    }

    #[test]
    fn prepare_creates_parent_for_file_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("deep/nested/rows.csv");
        prepare_output_location(&out, false).expect("prepare");
        assert!(out.parent().expect("parent").is_dir());
        assert!(!out.exists());
    }
}
