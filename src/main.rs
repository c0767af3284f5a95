use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use wrapfinder::cli::{Args, Command, FinderArgs, FuzzyArgs, PipelineArgs};
use wrapfinder::error::Error;
use wrapfinder::fuzzy::io::process_csv;
use wrapfinder::runner::{FinderConfig, OutputFormat, run_finder};

fn main() -> ExitCode {
    let args = Args::parse();

    let verbose = match &args.command {
        Some(Command::Finder(f)) => f.verbose,
        Some(Command::Pipeline(p)) => p.finder.verbose,
        Some(Command::Fuzzy(_)) => false,
        None => args.finder.verbose,
    };
    wrapfinder::telemetry::init_tracing(verbose);

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            if let Some(Error::Usage(_)) = err.downcast_ref::<Error>() {
                eprintln!("error: {err}");
                ExitCode::from(2)
            } else {
                eprintln!("{err:#}");
                ExitCode::from(1)
            }
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    match args.command {
        Some(Command::Finder(f)) => finder_command(f),
        Some(Command::Fuzzy(z)) => fuzzy_command(z),
        Some(Command::Pipeline(p)) => pipeline_command(p),
        None => finder_command(args.finder),
    }
}

fn finder_config(f: &FinderArgs) -> anyhow::Result<FinderConfig> {
    let Some(compile_commands) = f.compile_commands.clone() else {
        return Err(Error::usage("--compile-commands is required").into());
    };
    Ok(FinderConfig {
        compile_commands,
        catalog_path: f.catalog.clone(),
        mode: f.mode.into(),
        output: f.output.into(),
        out: f.out.clone(),
        out_dir: f.out_dir.clone(),
        only_libc: f.only_libc,
        only_syscalls: f.only_syscalls,
        callgraph_out: f.callgraph_out.clone(),
        callgraph_only: f.callgraph_only,
        path_maps: f.path_map.clone(),
        all_columns: f.all_columns,
        project_roots: f.project_root.clone(),
        project_only: f.project_only,
        thin_alias_policy: f.treat_thin_alias.into(),
        jobs: f.jobs.max(1),
    })
}

fn finder_command(f: FinderArgs) -> anyhow::Result<ExitCode> {
    let cfg = finder_config(&f)?;
    run_finder(&cfg)?;
    Ok(ExitCode::SUCCESS)
}

fn fuzzy_command(z: FuzzyArgs) -> anyhow::Result<ExitCode> {
    if !z.input_csv.is_file() {
        return Err(Error::usage(format!("not a file: {}", z.input_csv.display())).into());
    }
    process_csv(
        &z.input_csv,
        z.top_k,
        z.catalog.as_deref(),
        z.out.as_deref(),
        z.out_dir.as_deref(),
    )?;
    Ok(ExitCode::SUCCESS)
}

fn pipeline_command(p: PipelineArgs) -> anyhow::Result<ExitCode> {
    let mut cfg = finder_config(&p.finder)?;

    if p.fuzzy {
        if cfg.output != OutputFormat::Csv {
            return Err(Error::usage("--fuzzy requires finder --output csv").into());
        }
        let out_given = !wrapfinder::output::is_stdout(&cfg.out) || cfg.out_dir.is_some();
        if !out_given {
            let tmp = tempfile::Builder::new()
                .prefix("wrapfinder_finder_")
                .suffix(".csv")
                .tempfile()?;
            let (_, path) = tmp
                .keep()
                .map_err(|e| Error::other(format!("failed to keep temp file: {e}")))?;
            cfg.out = path.to_string_lossy().into_owned();
        }
    }

    let out_path = run_finder(&cfg)?;

    if !p.fuzzy {
        return Ok(ExitCode::SUCCESS);
    }

    let Some(out_path) = out_path else {
        return Err(Error::usage(
            "--fuzzy requires finder output to be a file (not stdout); use --out or omit it",
        )
        .into());
    };

    let scored: PathBuf = process_csv(
        &out_path,
        p.fuzzy_top_k.unwrap_or(3),
        cfg.catalog_path.as_deref(),
        p.fuzzy_out.as_deref(),
        p.fuzzy_out_dir.as_deref(),
    )?;
    tracing::debug!("pipeline scored output: {}", scored.display());
    Ok(ExitCode::SUCCESS)
}
