//! unai CLI - Illustrator object dumper

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use peak_alloc::PeakAlloc;

use unai::extract::{AllocationGauge, PARALLELISM_ENV, PROFILE_ENV};
use unai::parser::{BUFFER_SIZE_ENV, VALIDATION_ENV};
use unai::{
    workspace_base, AiParser, Document, ExtractOptions, Extractor, ParseOptions, Phase,
    ValidationMode, Workspace,
};

#[global_allocator]
static PEAK_ALLOC: PeakAlloc = PeakAlloc;

/// Exit status when no input file is given.
const USAGE_EXIT: i32 = 127;

#[derive(Parser)]
#[command(name = "unai")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Dump Illustrator PDF objects to source.json and sidecar files", long_about = None)]
struct Cli {
    /// Input Illustrator files, processed in order
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Parent directory of the working directories (system temp dir if not specified)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Bitmap worker threads
    #[arg(short, long, env = PARALLELISM_ENV)]
    jobs: Option<usize>,

    /// Maximum private data line length in bytes
    #[arg(long, env = BUFFER_SIZE_ENV, value_name = "BYTES")]
    buffer_size: Option<usize>,

    /// Validation mode
    #[arg(long, value_enum, env = VALIDATION_ENV, default_value = "strict")]
    mode: Mode,

    /// Do not dump the Illustrator private data
    #[arg(long)]
    no_private_data: bool,

    /// Live-memory growth in MiB that triggers a reclaim
    #[arg(long, value_name = "MIB", default_value_t = 256)]
    reclaim_mb: u64,

    /// Write the checkpoint timeline of each dump as JSON
    #[arg(long, env = PROFILE_ENV, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Hide the progress spinner
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Fail on validation errors
    Strict,
    /// Log validation errors and continue
    #[value(alias = "lenient")]
    Relaxed,
}

impl From<Mode> for ValidationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Strict => ValidationMode::Strict,
            Mode::Relaxed => ValidationMode::Relaxed,
        }
    }
}

impl Cli {
    fn parse_options(&self) -> ParseOptions {
        let mut options = ParseOptions::new()
            .with_validation_mode(self.mode.into())
            .with_private_data(!self.no_private_data);
        if let Some(bytes) = self.buffer_size {
            options = options.with_buffer_size(bytes);
        }
        options
    }

    fn extract_options(&self) -> ExtractOptions {
        let mut options =
            ExtractOptions::new().with_reclaim_threshold(self.reclaim_mb.saturating_mul(1024 * 1024));
        if let Some(jobs) = self.jobs {
            options = options.with_parallelism(jobs);
        }
        if let Some(path) = &self.profile {
            options = options.with_profile(path);
        }
        options
    }
}

fn main() {
    env_logger::init();
    process::exit(exit_status(&Cli::parse()));
}

fn exit_status(cli: &Cli) -> i32 {
    if cli.files.is_empty() {
        eprintln!("{}", "Usage: unai <FILE>...".yellow());
        eprintln!("       unai --help for more information");
        return USAGE_EXIT;
    }
    run(cli)
}

/// Dump every file; stop at the first failure and return its exit status.
fn run(cli: &Cli) -> i32 {
    let gauge: Arc<dyn AllocationGauge> = Arc::new(|| PEAK_ALLOC.current_usage() as u64);

    for file in &cli.files {
        println!("parsing {} ...", file.display());
        let pb = spinner(cli.quiet);
        let progress = pb.clone();
        let parser = AiParser::new(cli.parse_options())
            .with_gauge(Arc::clone(&gauge))
            .on_progress(move |phase| progress.set_message(phase.to_string()));

        let mut doc = match parser.parse_file(file) {
            Ok(doc) => doc,
            Err(e) => {
                pb.finish_and_clear();
                return fail(&e);
            }
        };
        if let Some(report) = doc.parse_stats().report() {
            pb.println(report.to_string());
        }

        let result = dump(cli, file, &mut doc, Arc::clone(&gauge), &pb);
        pb.finish_and_clear();
        match result {
            Ok(summary) => println!("{summary}"),
            Err(e) => return fail(&e),
        }
    }
    0
}

fn dump(
    cli: &Cli,
    file: &Path,
    doc: &mut Document,
    gauge: Arc<dyn AllocationGauge>,
    pb: &ProgressBar,
) -> unai::Result<String> {
    let workspace = Workspace::create(cli.output.as_deref(), &workspace_base(file))
        .map_err(|e| e.in_phase(Phase::ExtractingBitmaps))?;
    debug!("working directory {}", workspace.root().display());

    let progress = pb.clone();
    let extractor = Extractor::new(cli.extract_options())
        .with_gauge(gauge)
        .on_progress(move |phase| progress.set_message(phase.to_string()));

    let mut run = extractor.begin(doc, &workspace)?;
    let result = run.execute();
    let report = run.stats().report();
    let (bitmaps, fonts, streams) = run.written();
    run.close(result.is_ok());
    result?;

    let mut summary = format!(
        "{} {}\n  {} {} bitmaps, {} fonts, {} streams",
        "wrote".green(),
        workspace.manifest_path().display(),
        "└─".dimmed(),
        bitmaps,
        fonts,
        streams
    );
    if let Some(report) = report {
        summary.push_str(&format!("\n{report}"));
    }
    Ok(summary)
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn fail(err: &unai::Error) -> i32 {
    eprintln!("{}: {}", "Error".red().bold(), err);
    err.exit_code()
}
