use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::detection::ThinAliasPolicy;
use crate::runner::{Mode, OutputFormat};

/// Wrapfinder CLI options.
#[derive(Debug, Parser)]
#[command(
    name = "wrapfinder",
    version,
    about = "Find libc/syscall wrapper functions in C codebases",
    args_conflicts_with_subcommands = true,
    subcommand_precedence_over_arg = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub finder: FinderArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run wrapper detection over a compilation database.
    Finder(FinderArgs),

    /// Score a finder CSV lexically against the catalog.
    Fuzzy(FuzzyArgs),

    /// Run the finder, then optional fuzzy scoring on its output.
    Pipeline(PipelineArgs),
}

#[derive(Debug, Clone, ClapArgs)]
pub struct FinderArgs {
    /// Path to compile_commands.json (or equivalent).
    #[arg(long, value_name = "FILE")]
    pub compile_commands: Option<PathBuf>,

    /// Path to the API catalog (TOML).
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Restrict the target set to libc functions only.
    #[arg(long)]
    pub only_libc: bool,

    /// Restrict the target set to system calls only.
    #[arg(long)]
    pub only_syscalls: bool,

    /// Detection mode: 'relaxed' (broader, higher recall), 'accurate'
    /// (low-FP), or 'all' (keep every function; non-callers get
    /// api_called="other" and dependent columns "N/A").
    #[arg(long, value_enum, default_value_t = ModeArg::All)]
    pub mode: ModeArg,

    /// Row output format.
    #[arg(long, value_enum, default_value_t = OutputFormatArg::Csv)]
    pub output: OutputFormatArg,

    /// Output file path, or '-' for stdout.
    #[arg(long, default_value = "-")]
    pub out: String,

    /// Directory to place the output file (overrides --out).
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Number of worker threads (1 = sequential).
    #[arg(short = 'j', long = "jobs", default_value_t = 1)]
    pub jobs: usize,

    /// Enable verbose logging.
    #[arg(long)]
    pub verbose: bool,

    /// Directory to write call graph tables (callgraph_edges.csv,
    /// call_counts.csv).
    #[arg(long, value_name = "DIR")]
    pub callgraph_out: Option<PathBuf>,

    /// Only build and write the call graph tables; wrapper-detection
    /// flags are rejected.
    #[arg(
        long,
        requires = "callgraph_out",
        conflicts_with_all = [
            "catalog",
            "only_libc",
            "only_syscalls",
            "mode",
            "output",
            "out",
            "out_dir",
        ]
    )]
    pub callgraph_only: bool,

    /// Rewrite compile-command source paths generated in a different
    /// checkout. Format: OLD_PREFIX=NEW_PREFIX. Can be repeated.
    #[arg(long = "path-map", value_name = "OLD=NEW")]
    pub path_map: Vec<String>,

    /// Output every available CSV column instead of the minimal set.
    #[arg(long)]
    pub all_columns: bool,

    /// Project root directory; functions defined outside are excluded.
    /// Can be repeated.
    #[arg(long = "project-root", value_name = "DIR")]
    pub project_root: Vec<PathBuf>,

    /// Exclude functions outside the project roots; without
    /// --project-root a conservative system-include filter applies.
    #[arg(long)]
    pub project_only: bool,

    /// Accurate-mode policy for thin-alias APIs: default/direct-only
    /// require a direct call; allow-1-hop permits one helper hop.
    #[arg(long, value_enum, default_value_t = ThinAliasArg::Default)]
    pub treat_thin_alias: ThinAliasArg,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct FuzzyArgs {
    /// CSV produced by the wrapper finder.
    #[arg(value_name = "INPUT_CSV")]
    pub input_csv: PathBuf,

    /// Path to the API catalog (TOML).
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Output CSV path.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Output directory for the scored CSV.
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Top-k fuzzy matches to consider.
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct PipelineArgs {
    #[command(flatten)]
    pub finder: FinderArgs,

    /// Run fuzzy scoring on the finder's CSV output.
    #[arg(long)]
    pub fuzzy: bool,

    /// Output path for the scored CSV.
    #[arg(long, requires = "fuzzy")]
    pub fuzzy_out: Option<PathBuf>,

    /// Output directory for the scored CSV.
    #[arg(long, requires = "fuzzy", value_name = "DIR")]
    pub fuzzy_out_dir: Option<PathBuf>,

    /// Top-k fuzzy matches to consider.
    #[arg(long, requires = "fuzzy")]
    pub fuzzy_top_k: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    #[value(alias = "perpath_relaxed")]
    Relaxed,
    #[value(alias = "single", alias = "perpath", alias = "perpath_strict_plus")]
    Accurate,
    All,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Relaxed => Mode::Relaxed,
            ModeArg::Accurate => Mode::Accurate,
            ModeArg::All => Mode::All,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormatArg {
    Csv,
    Json,
    Jsonl,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(f: OutputFormatArg) -> Self {
        match f {
            OutputFormatArg::Csv => OutputFormat::Csv,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Jsonl => OutputFormat::Jsonl,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ThinAliasArg {
    Default,
    DirectOnly,
    #[value(name = "allow-1-hop")]
    Allow1Hop,
}

impl From<ThinAliasArg> for ThinAliasPolicy {
    fn from(p: ThinAliasArg) -> Self {
        match p {
            ThinAliasArg::Default => ThinAliasPolicy::Default,
            ThinAliasArg::DirectOnly => ThinAliasPolicy::DirectOnly,
            ThinAliasArg::Allow1Hop => ThinAliasPolicy::Allow1Hop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_defaults_to_finder() {
        let args = Args::parse_from([
            "wrapfinder",
            "--compile-commands",
            "cc.json",
            "--catalog",
            "apis.toml",
        ]);
        assert!(args.command.is_none());
        assert_eq!(
            args.finder.compile_commands.as_deref(),
            Some(std::path::Path::new("cc.json"))
        );
    }

    #[test]
    fn legacy_mode_aliases_resolve() {
        let args = Args::parse_from([
            "wrapfinder",
            "--compile-commands",
            "cc.json",
            "--mode",
            "perpath_strict_plus",
        ]);
        assert!(matches!(args.finder.mode, ModeArg::Accurate));
    }

    #[test]
    fn callgraph_only_conflicts_with_catalog() {
        let res = Args::try_parse_from([
            "wrapfinder",
            "--compile-commands",
            "cc.json",
            "--callgraph-only",
            "--callgraph-out",
            "cg/",
            "--catalog",
            "apis.toml",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn callgraph_only_requires_out_dir() {
        let res = Args::try_parse_from([
            "wrapfinder",
            "--compile-commands",
            "cc.json",
            "--callgraph-only",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn thin_alias_policy_value_names() {
        let args = Args::parse_from([
            "wrapfinder",
            "--compile-commands",
            "cc.json",
            "--treat-thin-alias",
            "allow-1-hop",
        ]);
        assert!(matches!(args.finder.treat_thin_alias, ThinAliasArg::Allow1Hop));
    }

    #[test]
    fn pipeline_accepts_fuzzy_flags() {
        let args = Args::parse_from([
            "wrapfinder",
            "pipeline",
            "--compile-commands",
            "cc.json",
            "--catalog",
            "apis.toml",
            "--out",
            "w.csv",
            "--fuzzy",
            "--fuzzy-top-k",
            "5",
        ]);
        match args.command {
            Some(Command::Pipeline(p)) => {
                assert!(p.fuzzy);
                assert_eq!(p.fuzzy_top_k, Some(5));
            }
            other => panic!("expected pipeline, got {other:?}"),
        }
    }
}
