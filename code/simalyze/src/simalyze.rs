/// `simalyze` -- Analyze the state logs of a cluster simulation run
///
/// Run with --help for brief help.
///
/// A single path argument without a command runs `analyze` on it.
///
/// Quirks
///
/// The positional argument of `analyze`, `busy` and `pools` can be a directory of logs or a JSON
/// run configuration that names such a directory.  With a bare directory every setting has its
/// default value, notably the stop time, which is then taken from the core logs: the latest last
/// timestamp of any of them.  If the simulator wrote its final records at different times for
/// different cores, the result depends on that choice, and --stop-time should be given.
///
/// `analyze` computes everything before it writes anything, so a run that fails leaves no partial
/// results behind.  Results from an earlier successful run are left as they were.
mod analyze;
mod busy;
mod compare;
mod format;
mod input;
mod logging;
mod pools;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    analyze_args: AnalyzeArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Analyze a simulation run: print a report and write results next to the logs
    Analyze(AnalyzeArgs),

    /// Print the number of busy cores at every change
    Busy(BusyArgs),

    /// Print the job slot utilization of every node
    Pools(PoolsArgs),

    /// Compare the core utilization of analyzed runs with each other and with reference values
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    compute_args: ComputeArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct BusyArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    compute_args: ComputeArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct PoolsArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// A JSON comparison configuration file
    config: Option<PathBuf>,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// A directory of simulator logs, or a JSON run configuration file
    path: Option<PathBuf>,

    /// The end of the observation window in simulation seconds [default: from the configuration,
    /// or the last timestamp in the core logs]
    #[arg(long)]
    stop_time: Option<f64>,
}

#[derive(Args, Debug, Default)]
pub struct ComputeArgs {
    /// Normalize the core logs on at most this many threads [default: one per cpu]
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct PrintArgs {
    /// Select fields and format for the output [default: see --fmt=help]
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Print debug diagnostics to stderr
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() {
    match simalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn simalyze() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Analyze(cli.analyze_args));

    if let Commands::Version = command {
        // Syntax:
        //  - components of the version string are space-separated but there are spaces nowhere else
        //  - the keyword "simalyze" is always the first component
        //  - every component is keyword(value)
        //  - "version" carries a semver
        //  - "features" carries a comma-separated list of enabled features
        cfg_if::cfg_if! {
            if #[cfg(feature = "parallel")] {
                println!("simalyze version(0.1.0) features(parallel)");
            } else {
                println!("simalyze version(0.1.0) features()");
            }
        }
        return Ok(());
    }

    if match command {
        Commands::Busy(ref args) => format::maybe_help(&args.print_args.fmt, &busy::fmt_help),
        Commands::Pools(ref args) => format::maybe_help(&args.print_args.fmt, &pools::fmt_help),
        Commands::Compare(ref args) => {
            format::maybe_help(&args.print_args.fmt, &compare::fmt_help)
        }
        Commands::Analyze(_) | Commands::Version => false,
    } {
        return Ok(());
    }

    let meta_args = match command {
        Commands::Analyze(ref args) => &args.meta_args,
        Commands::Busy(ref args) => &args.meta_args,
        Commands::Pools(ref args) => &args.meta_args,
        Commands::Compare(ref args) => &args.meta_args,
        Commands::Version => bail!("Unexpected command"),
    };
    logging::init(meta_args.verbose);

    match command {
        Commands::Analyze(ref args) => {
            let path =
                required_path(&args.source_args.path, "[analyze] <directory-or-config.json>")?;
            let run = input::load_run(path, args.source_args.stop_time)?;
            analyze::analyze_and_write(&mut io::stdout(), &run, &args.compute_args)
        }
        Commands::Busy(ref args) => {
            let path = required_path(&args.source_args.path, "busy <directory-or-config.json>")?;
            let run = input::load_run(path, args.source_args.stop_time)?;
            busy::print_busy(&mut io::stdout(), &run, &args.compute_args, &args.print_args)
        }
        Commands::Pools(ref args) => {
            let path = required_path(&args.source_args.path, "pools <directory-or-config.json>")?;
            let run = input::load_run(path, args.source_args.stop_time)?;
            pools::print_pools(&mut io::stdout(), &run, &args.print_args)
        }
        Commands::Compare(ref args) => {
            let path = required_path(&args.config, "compare <config.json>")?;
            compare::compare_and_write(&mut io::stdout(), path, &args.print_args)
        }
        Commands::Version => bail!("Unexpected command"),
    }
}

fn required_path<'a>(path: &'a Option<PathBuf>, usage: &str) -> Result<&'a Path> {
    match path {
        Some(p) => Ok(p.as_path()),
        None => bail!("Missing argument\nUsage: simalyze {usage}"),
    }
}
