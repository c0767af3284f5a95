//! CSV I/O for fuzzy scoring.

use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fuzzy::canon::build_canon_sets;
use crate::fuzzy::scoring::{MatchScore, top_k_scores, wrapper_score};

/// Detected input-column indices. Headers are matched after normalization
/// (BOM stripped, lowercased, `-`/space folded to `_`).
#[derive(Debug, Default)]
struct Columns {
    function: Option<usize>,
    file: Option<usize>,
    fan_in: Option<usize>,
    fan_out: Option<usize>,
    callee: Option<usize>,
    api_called: Option<usize>,
    category: Option<usize>,
    reason: Option<usize>,
    arg_pass: Option<usize>,
    ret_pass: Option<usize>,
}

fn norm_header(h: &str) -> String {
    let h = h.trim_start_matches('\u{feff}').trim().to_lowercase();
    let h = h.replace(['-', ' '], "_");
    Regex::new("_+")
        .expect("static regex")
        .replace_all(&h, "_")
        .into_owned()
}

fn detect_cols(header: &[String]) -> Columns {
    let lower: Vec<String> = header.iter().map(|h| norm_header(h)).collect();
    let find_one = |options: &[&str]| -> Option<usize> {
        lower.iter().position(|h| options.contains(&h.as_str()))
    };

    let function_loc = find_one(&["function_loc", "functionloc", "function_location"]);
    Columns {
        function: find_one(&["function", "func", "symbol"]),
        file: find_one(&[
            "file",
            "filepath",
            "path",
            "filename",
            "source",
            "source_file",
            "location",
        ])
        .or(function_loc),
        fan_in: find_one(&["fan_in", "fanin"]),
        fan_out: find_one(&["fan_out", "fanout"]),
        callee: find_one(&["callee"]),
        api_called: find_one(&["api_called", "api", "target", "called_api"]),
        category: find_one(&["category", "cat", "group"]),
        reason: find_one(&["reason"]),
        arg_pass: find_one(&["arg_pass", "argpass", "arg_passed", "args_pass"]),
        ret_pass: find_one(&["ret_pass", "retpass", "return_pass", "ret_passed"]),
    }
}

/// Derive the scored-output path next to the input unless overridden.
pub fn output_path(inp: &Path, out_path: Option<&Path>, out_dir: Option<&Path>) -> PathBuf {
    if let Some(p) = out_path {
        return p.to_path_buf();
    }
    let stem = inp
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "wrappers".to_string());
    let name = format!("{stem}._fuzzy_scored.csv");
    match out_dir {
        Some(d) => d.join(name),
        None => inp
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
            .join(name),
    }
}

fn cell(record: &csv::StringRecord, idx: Option<usize>) -> String {
    idx.and_then(|i| record.get(i))
        .unwrap_or("")
        .to_string()
}

fn int_cell(record: &csv::StringRecord, idx: Option<usize>) -> i64 {
    cell(record, idx).trim().parse().unwrap_or(0)
}

/// Score every row of a finder CSV and write the ranked output.
pub fn process_csv(
    inp_path: &Path,
    top_k: usize,
    catalog_path: Option<&Path>,
    out_path: Option<&Path>,
    out_dir: Option<&Path>,
) -> Result<PathBuf> {
    let canon_sets = build_canon_sets(catalog_path)?;
    let out = output_path(inp_path, out_path, out_dir);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(inp_path)?;
    let mut records = rdr.records();

    let header: Vec<String> = match records.next() {
        Some(rec) => rec?.iter().map(str::to_string).collect(),
        None => return Err(Error::other("empty CSV (no header)")),
    };
    let cols = detect_cols(&header);
    if cols.function.is_none() {
        return Err(Error::other("could not detect 'function' column"));
    }

    struct Scored {
        rank: f64,
        fan_in: i64,
        wscore: f64,
        values: Vec<String>,
    }

    let mut out_rows: Vec<Scored> = Vec::new();
    for rec in records {
        let rec = rec?;
        let function = cell(&rec, cols.function);
        let mut location = cell(&rec, cols.file).trim().to_string();
        if location.is_empty()
            || ["none", "null", "n/a", "na", "-"].contains(&location.to_lowercase().as_str())
        {
            location = "<unknown>".to_string();
        }
        let callee = cell(&rec, cols.callee);
        let api_called = cell(&rec, cols.api_called);
        let category = cell(&rec, cols.category);
        let reason = cell(&rec, cols.reason);
        let arg_pass = cell(&rec, cols.arg_pass);
        let ret_pass = cell(&rec, cols.ret_pass);
        let fan_in = int_cell(&rec, cols.fan_in);
        let fan_out = int_cell(&rec, cols.fan_out);

        let scores = top_k_scores(&function, &canon_sets, top_k);
        let best = scores.into_iter().next().unwrap_or_else(MatchScore::default);

        let wscore = wrapper_score(
            &function,
            &api_called,
            &callee,
            fan_out,
            &best.key,
            best.combined,
            &category,
            &reason,
            &arg_pass,
            &ret_pass,
        );

        let values = vec![
            format!("{}%", (wscore * 100.0).round() as i64),
            function,
            api_called,
            best.key,
            category,
            fan_in.to_string(),
            callee,
            arg_pass,
            ret_pass,
            location,
        ];
        let rank = (fan_in.max(1) as f64) * (1.0 + wscore);
        out_rows.push(Scored {
            rank,
            fan_in,
            wscore,
            values,
        });
    }

    out_rows.sort_by(|a, b| {
        b.rank
            .total_cmp(&a.rank)
            .then_with(|| b.fan_in.cmp(&a.fan_in))
            .then_with(|| b.wscore.total_cmp(&a.wscore))
            .then_with(|| a.values[1].cmp(&b.values[1]))
    });

    let mut w = csv::Writer::from_path(&out)?;
    w.write_record([
        "likelihood_score",
        "function",
        "api_called",
        "fuzzy_match",
        "category",
        "fan_in",
        "callee",
        "arg_pass",
        "ret_pass",
        "location",
    ])?;
    for row in &out_rows {
        w.write_record(&row.values)?;
    }
    w.flush()?;

    tracing::info!("processed {}", inp_path.display());
    tracing::info!("wrote     {}", out.display());
    Ok(out)
}
