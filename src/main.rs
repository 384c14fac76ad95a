use clap::{Args, Parser, Subcommand, ValueEnum};
use cuboid::config::SearchConfig;
use cuboid::pipeline::SearchSummary;
use cuboid::progress::ProgressSink;
use cuboid::{CuboidError, RecordLayout, Search};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cuboid")]
#[command(about = "External sort-merge search for perfect cuboids", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate run files for the configured range
    Generate {
        #[command(flatten)]
        search: SearchArgs,
        /// Remove existing run files first
        #[arg(long)]
        fresh: bool,
        /// Write the built-in test data set instead of enumerating
        #[arg(long)]
        fixture: bool,
    },
    /// Generate (unless run files exist) and analyze
    Check {
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long)]
        fresh: bool,
        #[arg(long)]
        fixture: bool,
        /// Also print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Analyze existing run files
    Analyze {
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long)]
        json: bool,
    },
    /// Write every group of the merged runs as text
    Dump {
        #[command(flatten)]
        search: SearchArgs,
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Merge all run files into a single run file
    Merge {
        #[command(flatten)]
        search: SearchArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LayoutArg {
    Pair,
    Quadruple,
}

impl From<LayoutArg> for RecordLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Pair => RecordLayout::Pair,
            LayoutArg::Quadruple => RecordLayout::Quadruple,
        }
    }
}

/// Overrides on top of the defaults and the optional JSON config file.
#[derive(Args)]
struct SearchArgs {
    /// JSON config file
    #[arg(long, env = "CUBOID_CONFIG")]
    config: Option<PathBuf>,
    /// G lower bound (exclusive)
    #[arg(long, env = "CUBOID_LOW")]
    low: Option<u64>,
    /// G upper bound (inclusive)
    #[arg(long, env = "CUBOID_HIGH")]
    high: Option<u64>,
    #[arg(long, env = "CUBOID_THREADS")]
    threads: Option<usize>,
    /// Records buffered before a run file is written
    #[arg(long, env = "CUBOID_RUN_SIZE")]
    run_size: Option<usize>,
    #[arg(long, env = "CUBOID_MIN_ODD")]
    min_odd: Option<u64>,
    #[arg(long, env = "CUBOID_MIN_EVEN")]
    min_even: Option<u64>,
    #[arg(long, env = "CUBOID_MIN_GROUP_SIZE")]
    min_group_size: Option<usize>,
    #[arg(long, env = "CUBOID_WORKDIR")]
    workdir: Option<PathBuf>,
    #[arg(long, value_enum, env = "CUBOID_LAYOUT")]
    layout: Option<LayoutArg>,
}

impl SearchArgs {
    fn into_config(self) -> Result<SearchConfig, CuboidError> {
        let mut config = match &self.config {
            Some(path) => SearchConfig::from_json_file(path)?,
            None => SearchConfig::default(),
        };
        if let Some(low) = self.low {
            config.low = low;
        }
        if let Some(high) = self.high {
            config.high = high;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(run_size) = self.run_size {
            config.run_size = run_size;
        }
        if let Some(min_odd) = self.min_odd {
            config.min_odd = min_odd;
        }
        if let Some(min_even) = self.min_even {
            config.min_even = min_even;
        }
        if let Some(min_group_size) = self.min_group_size {
            config.min_group_size = min_group_size;
        }
        if let Some(workdir) = self.workdir {
            config.workdir = workdir;
        }
        if let Some(layout) = self.layout {
            config.layout = layout.into();
        }
        config.validate()?;
        Ok(config)
    }
}

fn open_search(args: SearchArgs) -> Result<(Search, Arc<ProgressSink>), CuboidError> {
    let config = args.into_config()?;
    fs::create_dir_all(&config.workdir)?;
    let progress = Arc::new(ProgressSink::file(&config.summary_path())?);
    progress.line(format!("[cuboid] {}", serde_json::to_string(&config)?));
    let search = Search::new(config)?.with_progress(Arc::clone(&progress));
    Ok((search, progress))
}

fn report(summary: &SearchSummary, progress: &ProgressSink, json: bool) -> Result<(), CuboidError> {
    for line in summary.lines() {
        progress.line(line);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), CuboidError> {
    match cli.command {
        Commands::Generate {
            search,
            fresh,
            fixture,
        } => {
            let (search, progress) = open_search(search)?;
            let started = Instant::now();
            if fresh {
                search.remove_runs()?;
            }
            let generation = search.generate(fixture)?;
            report(&search.summary(Some(generation), None, started), &progress, false)
        }
        Commands::Check {
            search,
            fresh,
            fixture,
            json,
        } => {
            let (search, progress) = open_search(search)?;
            if fresh {
                search.remove_runs()?;
            }
            let summary = search.check(fixture)?;
            report(&summary, &progress, json)
        }
        Commands::Analyze { search, json } => {
            let (search, progress) = open_search(search)?;
            let started = Instant::now();
            let analysis = search.analyze()?;
            report(&search.summary(None, Some(analysis), started), &progress, json)
        }
        Commands::Dump { search, output } => {
            let (search, _progress) = open_search(search)?;
            match output {
                Some(path) => {
                    let mut out = BufWriter::new(File::create(&path)?);
                    search.dump(&mut out)?;
                }
                None => {
                    let stdout = io::stdout();
                    let mut out = BufWriter::new(stdout.lock());
                    search.dump(&mut out)?;
                    out.flush()?;
                }
            }
            Ok(())
        }
        Commands::Merge { search } => {
            let (search, _progress) = open_search(search)?;
            search.merge()?;
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[cuboid] {}", e);
            ExitCode::FAILURE
        }
    }
}
